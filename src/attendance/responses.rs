//! Response DTOs for attendance endpoints.

use serde::Serialize;
use uuid::Uuid;

use super::calculators::{AttendanceSheet, RosterEntry, SheetState};

/// Attendance sheet as shown to the operator
#[derive(Debug, Serialize)]
pub struct AttendanceSheetResponse {
    pub class_id: Uuid,
    pub state: SheetState,
    pub recorded_before: bool,
    pub students: Vec<RosterEntry>,
    pub present_count: usize,
}

impl From<AttendanceSheet> for AttendanceSheetResponse {
    fn from(sheet: AttendanceSheet) -> Self {
        Self {
            class_id: sheet.class_id,
            state: sheet.state(),
            recorded_before: sheet.recorded_before(),
            present_count: sheet.present().count(),
            students: sheet.entries().to_vec(),
        }
    }
}
