//! Request DTOs for attendance endpoints.

use serde::Deserialize;
use uuid::Uuid;

/// A present/absent toggle for one booked student
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AttendanceMark {
    pub student_id: Uuid,
    pub present: bool,
}

/// Save request; students without a mark keep their loaded value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveAttendanceRequest {
    #[serde(default)]
    pub marks: Vec<AttendanceMark>,
}
