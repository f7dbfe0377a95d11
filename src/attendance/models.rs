//! Database rows for attendance.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::calculators::{PlanBalance, RosterEntry};

/// Booked student merged with stored attendance
#[derive(Debug, Clone, FromRow)]
pub struct RosterRow {
    pub student_id: Uuid,
    pub student_name: String,
    pub present: bool,
    /// An attendance row exists for this student
    pub recorded: bool,
}

impl From<RosterRow> for RosterEntry {
    fn from(row: RosterRow) -> Self {
        RosterEntry {
            student_id: row.student_id,
            student_name: row.student_name,
            present: row.present,
        }
    }
}

/// Student plan row held under lock while its usages are counted
#[derive(Debug, Clone, FromRow)]
pub struct LockedPlanRow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub remaining_classes: i32,
    pub purchased_at: DateTime<Utc>,
}

impl LockedPlanRow {
    pub fn with_usage(self, used: i64) -> PlanBalance {
        PlanBalance {
            student_plan_id: self.id,
            student_id: self.student_id,
            remaining_classes: self.remaining_classes,
            used,
            purchased_at: self.purchased_at,
        }
    }
}

/// Plan consumption to persist for a present student
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord {
    pub student_id: Uuid,
    pub student_plan_id: Uuid,
}
