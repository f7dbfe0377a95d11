//! Database models for scheduling.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::calculators::ClassType;

/// ClassSession from class_sessions
#[derive(Debug, Clone, FromRow)]
pub struct ClassSession {
    pub id: Uuid,
    pub academy_id: Uuid,
    pub date: DateTime<Utc>,
    #[sqlx(rename = "type")]
    pub class_type: String,
    pub capacity: i32,
    pub coach_id: Uuid,
    pub court_id: Uuid,
    pub price_cents: i64,
    pub currency: String,
    pub notes: Option<String>,
}

impl ClassSession {
    /// True once the session start has been reached
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.date <= now
    }
}

/// Values written when creating or editing a session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub academy_id: Uuid,
    pub date: DateTime<Utc>,
    pub class_type: ClassType,
    pub capacity: i32,
    pub coach_id: Uuid,
    pub court_id: Uuid,
    pub price_cents: i64,
    pub currency: String,
    pub notes: Option<String>,
}
