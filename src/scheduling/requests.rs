//! Request DTOs for scheduling endpoints.

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

/// Query for court availability
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    /// Session being edited; its own slot counts as free
    #[serde(default)]
    pub exclude_class_id: Option<Uuid>,
    /// Slot currently selected in the form
    #[serde(default)]
    pub selected: Option<String>,
}

/// Request to create or edit a class session.
///
/// Form fields are optional so that missing values produce a readable
/// validation message instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassSessionRequest {
    #[serde(default)]
    pub court_id: Option<Uuid>,
    #[serde(default)]
    pub coach_id: Option<Uuid>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// "HH:00"
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub student_ids: Vec<Uuid>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Weekday and hour of a recurring session
#[derive(Debug, Clone, Deserialize)]
pub struct WeeklySlot {
    /// 0 = Sunday through 6 = Saturday
    pub weekday: u32,
    #[serde(default)]
    pub time: Option<String>,
}

/// Request to create a weekly series of sessions.
///
/// The first session lands on `date` at the hour set for its weekday;
/// `time` is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassSeriesRequest {
    #[serde(flatten)]
    pub session: ClassSessionRequest,
    #[serde(default)]
    pub weekdays: Vec<WeeklySlot>,
}
