//! Attendance sheet state and plan consumption rules.
//!
//! Pure logic - the service loads rows, runs these rules and writes the
//! outcome in one transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::services::AttendanceError;

/// Lifecycle of an attendance sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetState {
    Unopened,
    Loaded,
    Editing,
    Saved,
    /// Save was refused; marks are kept and still editable
    Failed,
}

/// One booked student on the sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub student_id: Uuid,
    pub student_name: String,
    pub present: bool,
}

/// Attendance sheet for one class session
#[derive(Debug, Clone)]
pub struct AttendanceSheet {
    pub class_id: Uuid,
    state: SheetState,
    entries: Vec<RosterEntry>,
    recorded_before: bool,
    last_error: Option<String>,
}

impl AttendanceSheet {
    pub fn new(class_id: Uuid) -> Self {
        Self {
            class_id,
            state: SheetState::Unopened,
            entries: vec![],
            recorded_before: false,
            last_error: None,
        }
    }

    pub fn state(&self) -> SheetState {
        self.state
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// True when attendance rows existed before this sheet was opened
    pub fn recorded_before(&self) -> bool {
        self.recorded_before
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Replace the roster with freshly loaded rows
    pub fn load(&mut self, entries: Vec<RosterEntry>, recorded_before: bool) {
        self.entries = entries;
        self.recorded_before = recorded_before;
        self.last_error = None;
        self.state = SheetState::Loaded;
    }

    /// Mark one student present or absent
    pub fn toggle(&mut self, student_id: Uuid, present: bool) -> Result<(), AttendanceError> {
        if self.state == SheetState::Unopened {
            return Err(AttendanceError::SheetNotLoaded);
        }

        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.student_id == student_id)
            .ok_or(AttendanceError::NotBooked(student_id))?;
        entry.present = present;
        self.state = SheetState::Editing;
        Ok(())
    }

    /// Ensure the sheet can be saved
    pub fn check_saveable(&self) -> Result<(), AttendanceError> {
        match self.state {
            SheetState::Unopened => Err(AttendanceError::SheetNotLoaded),
            _ => Ok(()),
        }
    }

    pub fn mark_saved(&mut self) {
        self.recorded_before = true;
        self.last_error = None;
        self.state = SheetState::Saved;
    }

    pub fn mark_failed(&mut self, message: String) {
        self.last_error = Some(message);
        self.state = SheetState::Failed;
    }

    pub fn present(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.iter().filter(|e| e.present)
    }

    pub fn absent_ids(&self) -> Vec<Uuid> {
        self.entries
            .iter()
            .filter(|e| !e.present)
            .map(|e| e.student_id)
            .collect()
    }
}

/// A student plan with its consumption so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanBalance {
    pub student_plan_id: Uuid,
    pub student_id: Uuid,
    pub remaining_classes: i32,
    pub used: i64,
    pub purchased_at: DateTime<Utc>,
}

impl PlanBalance {
    pub fn has_capacity(&self) -> bool {
        self.used < i64::from(self.remaining_classes)
    }
}

/// Why a present student cannot consume a class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanShortfall {
    /// No plan with remaining classes
    NoPlan,
    /// Every plan is fully consumed
    Exhausted,
}

/// Pick the plan a present student consumes for this class.
///
/// `plans` must hold the student's plans with remaining classes, oldest
/// purchase first. A usage already recorded for the class is reused.
pub fn choose_plan(
    plans: &[PlanBalance],
    existing_usage: Option<Uuid>,
) -> Result<Uuid, PlanShortfall> {
    if let Some(plan_id) = existing_usage {
        return Ok(plan_id);
    }

    if plans.is_empty() {
        return Err(PlanShortfall::NoPlan);
    }

    plans
        .iter()
        .find(|p| p.has_capacity())
        .map(|p| p.student_plan_id)
        .ok_or(PlanShortfall::Exhausted)
}

/// Group plan balances by student, keeping purchase order
pub fn group_by_student(plans: Vec<PlanBalance>) -> HashMap<Uuid, Vec<PlanBalance>> {
    let mut grouped: HashMap<Uuid, Vec<PlanBalance>> = HashMap::new();
    for plan in plans {
        grouped.entry(plan.student_id).or_default().push(plan);
    }
    for list in grouped.values_mut() {
        list.sort_by_key(|p| p.purchased_at);
    }
    grouped
}
