//! Response DTOs for scheduling endpoints.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::calculators::{format_slot, local_hour};
use super::models::ClassSession;

/// Response for court availability
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub free_slots: Vec<String>,
    /// Selection after reconciling with the free slots
    pub selected: Option<String>,
}

/// A class session as returned to clients
#[derive(Debug, Serialize)]
pub struct ClassSessionResponse {
    pub id: Uuid,
    pub academy_id: Uuid,
    pub date: DateTime<Utc>,
    pub local_time: String,
    #[serde(rename = "type")]
    pub class_type: String,
    pub capacity: i32,
    pub coach_id: Uuid,
    pub court_id: Uuid,
    pub price_cents: i64,
    pub currency: String,
    pub notes: Option<String>,
    pub student_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ClassSessionResponse {
    pub fn new(
        session: ClassSession,
        student_ids: Vec<Uuid>,
        warnings: Vec<String>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            local_time: format_slot(local_hour(session.date, offset)),
            id: session.id,
            academy_id: session.academy_id,
            date: session.date,
            class_type: session.class_type,
            capacity: session.capacity,
            coach_id: session.coach_id,
            court_id: session.court_id,
            price_cents: session.price_cents,
            currency: session.currency,
            notes: session.notes,
            student_ids,
            warnings,
        }
    }
}

/// Response for a session edit
#[derive(Debug, Serialize)]
pub struct ClassSessionEditResponse {
    pub session: ClassSessionResponse,
    pub added_students: Vec<Uuid>,
    pub removed_students: Vec<Uuid>,
}

/// Response for a cancelled session
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub id: Uuid,
    pub returned_credits: u64,
}

/// Response for a weekly series
#[derive(Debug, Serialize)]
pub struct ClassSeriesResponse {
    pub sessions: Vec<ClassSessionResponse>,
    /// Dates passed over because the court was taken
    pub skipped_busy_court: u32,
    /// Dates passed over because a student already had a session
    pub skipped_busy_students: u32,
    /// The search horizon ran out before every session was placed
    pub incomplete: bool,
}

/// Response for a student taken off a session
#[derive(Debug, Serialize)]
pub struct StudentRemovalResponse {
    pub class_id: Uuid,
    pub student_id: Uuid,
    pub returned_credits: u64,
    pub remaining_students: usize,
    /// The session had no other students and was deleted
    pub class_deleted: bool,
}
