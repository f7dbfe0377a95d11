//! In-memory caching using moka
//!
//! Holds per-operator selection stores plus billing lookups that are read on
//! every report but change rarely. Billing entries are invalidated by the
//! writes that change them.

use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::billing::models::{AcademyRate, SalesAgentAssignment};
use crate::selection::SelectionStore;

/// Application cache
#[derive(Clone)]
pub struct AppCache {
    /// Operator selection stores (user id -> store)
    pub selections: Cache<Uuid, Arc<SelectionStore>>,
    /// Current billing rate per academy
    pub academy_rates: Cache<Uuid, Arc<AcademyRate>>,
    /// Sales agent assignments per academy
    pub assignments: Cache<Uuid, Arc<Vec<SalesAgentAssignment>>>,
}

impl AppCache {
    /// Create a new cache instance with configured TTLs
    pub fn new() -> Self {
        Self {
            // Selections live as long as the operator keeps working
            selections: Cache::builder()
                .max_capacity(10_000)
                .time_to_idle(Duration::from_secs(12 * 60 * 60))
                .build(),

            // Rates: 1000 academies, 30 min TTL
            academy_rates: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(Duration::from_secs(30 * 60))
                .build(),

            // Assignments: 1000 academies, 15 min TTL
            assignments: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(Duration::from_secs(15 * 60))
                .build(),
        }
    }

    /// Selection store for an operator, created on first use
    pub async fn selection_for(&self, user_id: Uuid) -> Arc<SelectionStore> {
        self.selections
            .get_with(user_id, async { Arc::new(SelectionStore::new()) })
            .await
    }

    /// Get cache statistics for monitoring
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            selections_size: self.selections.entry_count(),
            academy_rates_size: self.academy_rates.entry_count(),
            assignments_size: self.assignments.entry_count(),
        }
    }

    /// Drop billing lookups for one academy
    pub async fn invalidate_academy(&self, academy_id: Uuid) {
        self.academy_rates.invalidate(&academy_id).await;
        self.assignments.invalidate(&academy_id).await;
        info!("Billing cache invalidated for academy: {}", academy_id);
    }

    /// Invalidate all billing caches (selections are kept)
    pub fn invalidate_billing(&self) {
        self.academy_rates.invalidate_all();
        self.assignments.invalidate_all();
        info!("Billing caches invalidated");
    }
}

impl Default for AppCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics for monitoring endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub selections_size: u64,
    pub academy_rates_size: u64,
    pub assignments_size: u64,
}
