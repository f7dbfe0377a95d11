//! Per-operator academy selection with typed change notifications.

use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 32;

/// Academy being impersonated by a platform operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Impersonation {
    pub academy_id: Uuid,
    pub academy_name: Option<String>,
    /// Selection to restore when impersonation ends
    pub previous_academy_id: Option<Uuid>,
}

/// Snapshot of an operator's selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub academy_id: Option<Uuid>,
    pub impersonation: Option<Impersonation>,
}

impl Selection {
    /// Academy that scopes the operator's actions (impersonated one first)
    pub fn effective_academy(&self) -> Option<Uuid> {
        self.impersonation
            .as_ref()
            .map(|i| i.academy_id)
            .or(self.academy_id)
    }
}

/// Notification sent to subscribers on every change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionChange {
    AcademySelected {
        academy_id: Option<Uuid>,
    },
    ImpersonationStarted {
        academy_id: Uuid,
        academy_name: Option<String>,
    },
    ImpersonationEnded {
        restored_academy_id: Option<Uuid>,
    },
}

impl SelectionChange {
    /// Event name used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            SelectionChange::AcademySelected { .. } => "academy_selected",
            SelectionChange::ImpersonationStarted { .. } => "impersonation_started",
            SelectionChange::ImpersonationEnded { .. } => "impersonation_ended",
        }
    }
}

/// Selection state for one operator
#[derive(Debug)]
pub struct SelectionStore {
    state: RwLock<Selection>,
    changes: broadcast::Sender<SelectionChange>,
}

impl SelectionStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(Selection::default()),
            changes,
        }
    }

    pub fn snapshot(&self) -> Selection {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn effective_academy(&self) -> Option<Uuid> {
        self.snapshot().effective_academy()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SelectionChange> {
        self.changes.subscribe()
    }

    /// Select an academy (or clear the selection)
    pub fn select_academy(&self, academy_id: Option<Uuid>) -> Selection {
        self.update(|s| {
            if s.academy_id == academy_id {
                return vec![];
            }
            s.academy_id = academy_id;
            vec![SelectionChange::AcademySelected { academy_id }]
        })
    }

    /// Start impersonating an academy, remembering the current selection
    pub fn start_impersonation(&self, academy_id: Uuid, academy_name: Option<String>) -> Selection {
        self.update(|s| {
            let previous_academy_id = match &s.impersonation {
                Some(existing) => existing.previous_academy_id,
                None => s.academy_id,
            };
            s.impersonation = Some(Impersonation {
                academy_id,
                academy_name: academy_name.clone(),
                previous_academy_id,
            });
            s.academy_id = Some(academy_id);
            vec![
                SelectionChange::ImpersonationStarted {
                    academy_id,
                    academy_name,
                },
                SelectionChange::AcademySelected {
                    academy_id: Some(academy_id),
                },
            ]
        })
    }

    /// Stop impersonating and restore the previous selection
    pub fn end_impersonation(&self) -> Selection {
        self.update(|s| {
            let Some(impersonation) = s.impersonation.take() else {
                return vec![];
            };
            let restored = impersonation.previous_academy_id;
            s.academy_id = restored;
            vec![
                SelectionChange::ImpersonationEnded {
                    restored_academy_id: restored,
                },
                SelectionChange::AcademySelected {
                    academy_id: restored,
                },
            ]
        })
    }

    fn update<F>(&self, apply: F) -> Selection
    where
        F: FnOnce(&mut Selection) -> Vec<SelectionChange>,
    {
        let (snapshot, changes) = {
            let mut guard = match self.state.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let changes = apply(&mut guard);
            (guard.clone(), changes)
        };

        for change in changes {
            // No subscribers is not an error
            let _ = self.changes.send(change);
        }

        snapshot
    }
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_academy_notifies() {
        let store = SelectionStore::new();
        let mut rx = store.subscribe();
        let academy = Uuid::new_v4();

        let snapshot = store.select_academy(Some(academy));

        assert_eq!(snapshot.academy_id, Some(academy));
        assert_eq!(
            rx.try_recv().unwrap(),
            SelectionChange::AcademySelected {
                academy_id: Some(academy)
            }
        );
    }

    #[test]
    fn test_reselecting_same_academy_is_silent() {
        let store = SelectionStore::new();
        let academy = Uuid::new_v4();
        store.select_academy(Some(academy));

        let mut rx = store.subscribe();
        store.select_academy(Some(academy));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_impersonation_round_trip_restores_previous() {
        let store = SelectionStore::new();
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.select_academy(Some(own));

        let during = store.start_impersonation(other, Some("Club Norte".to_string()));
        assert_eq!(during.effective_academy(), Some(other));
        assert_eq!(
            during.impersonation.as_ref().unwrap().previous_academy_id,
            Some(own)
        );

        let after = store.end_impersonation();
        assert_eq!(after.academy_id, Some(own));
        assert!(after.impersonation.is_none());
    }

    #[test]
    fn test_nested_impersonation_keeps_original_previous() {
        let store = SelectionStore::new();
        let own = Uuid::new_v4();
        store.select_academy(Some(own));
        store.start_impersonation(Uuid::new_v4(), None);
        store.start_impersonation(Uuid::new_v4(), None);

        let after = store.end_impersonation();
        assert_eq!(after.academy_id, Some(own));
    }

    #[test]
    fn test_impersonation_events_in_order() {
        let store = SelectionStore::new();
        let mut rx = store.subscribe();
        let academy = Uuid::new_v4();

        store.start_impersonation(academy, None);
        store.end_impersonation();

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|c| c.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "impersonation_started",
                "academy_selected",
                "impersonation_ended",
                "academy_selected"
            ]
        );
    }

    #[test]
    fn test_end_without_impersonation_is_noop() {
        let store = SelectionStore::new();
        let mut rx = store.subscribe();

        let snapshot = store.end_impersonation();

        assert_eq!(snapshot, Selection::default());
        assert!(rx.try_recv().is_err());
    }
}
