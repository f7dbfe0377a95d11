//! Attendance service functions with database access.

use std::collections::HashMap;

use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::audit::{self, AuditEntry};
use crate::error::AppError;
use crate::scheduling::models::ClassSession;
use crate::scheduling::queries as sessions;

use super::calculators::{choose_plan, group_by_student, AttendanceSheet, PlanBalance, PlanShortfall};
use super::models::{RosterRow, UsageRecord};
use super::queries;
use super::requests::AttendanceMark;

/// Attendance error types
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("Clase no encontrada.")]
    ClassNotFound,

    #[error("La asistencia todavía no fue cargada.")]
    SheetNotLoaded,

    #[error("El alumno {0} no está inscripto en esta clase.")]
    NotBooked(Uuid),

    #[error("{0} no tiene clases disponibles en su plan.")]
    NoPlan(String),

    #[error("{0} ya utilizó todas las clases de su plan.")]
    PlanExhausted(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<AttendanceError> for AppError {
    fn from(err: AttendanceError) -> Self {
        match err {
            AttendanceError::Database(e) => AppError::Database(e),
            AttendanceError::ClassNotFound => AppError::NotFound(err.to_string()),
            AttendanceError::NoPlan(_) | AttendanceError::PlanExhausted(_) => {
                AppError::Rejected(err.to_string())
            }
            other => AppError::Validation(other.to_string()),
        }
    }
}

fn open_sheet(class_id: Uuid, rows: Vec<RosterRow>) -> AttendanceSheet {
    let recorded_before = rows.iter().any(|r| r.recorded);
    let mut sheet = AttendanceSheet::new(class_id);
    sheet.load(rows.into_iter().map(Into::into).collect(), recorded_before);
    sheet
}

/// Session of the operator's academy; others read as missing
async fn academy_session(
    conn: &mut PgConnection,
    academy_id: Uuid,
    class_id: Uuid,
) -> Result<ClassSession, AttendanceError> {
    sessions::get_class_session(conn, class_id)
        .await?
        .filter(|s| s.academy_id == academy_id)
        .ok_or(AttendanceError::ClassNotFound)
}

/// Load the roster of a session, absent by default
pub async fn load_attendance(
    pool: &PgPool,
    academy_id: Uuid,
    class_id: Uuid,
) -> Result<AttendanceSheet, AttendanceError> {
    let mut conn = pool.acquire().await?;
    academy_session(&mut *conn, academy_id, class_id).await?;
    drop(conn);

    let rows = queries::list_roster(pool, class_id).await?;
    Ok(open_sheet(class_id, rows))
}

/// Apply marks and save the attendance snapshot with its plan consumption.
///
/// All-or-nothing: a student without a usable plan aborts the save and no
/// row is written.
pub async fn save_attendance(
    pool: &PgPool,
    academy_id: Uuid,
    class_id: Uuid,
    marks: &[AttendanceMark],
    user_id: Option<Uuid>,
) -> Result<AttendanceSheet, AttendanceError> {
    let mut tx = pool.begin().await?;

    academy_session(&mut *tx, academy_id, class_id).await?;

    let rows = queries::list_roster_tx(&mut *tx, class_id).await?;
    let mut sheet = open_sheet(class_id, rows);
    for mark in marks {
        sheet.toggle(mark.student_id, mark.present)?;
    }
    sheet.check_saveable()?;

    let present_ids: Vec<Uuid> = sheet.present().map(|e| e.student_id).collect();
    let balances =
        group_by_student(queries::lock_plan_balances(&mut *tx, &present_ids).await?);
    let existing = queries::class_usages(&mut *tx, class_id).await?;

    let usages = match plan_usages(&sheet, &balances, &existing) {
        Ok(usages) => usages,
        Err(e) => {
            sheet.mark_failed(e.to_string());
            tracing::info!(
                class_id = %class_id,
                state = ?sheet.state(),
                "Attendance save refused: {}",
                e
            );
            return Err(e);
        }
    };

    let snapshot: Vec<(Uuid, bool)> = sheet
        .entries()
        .iter()
        .map(|e| (e.student_id, e.present))
        .collect();
    let absent_ids = sheet.absent_ids();

    queries::replace_attendance(&mut *tx, class_id, &snapshot).await?;
    queries::upsert_usages(&mut *tx, class_id, &usages).await?;
    let returned = queries::delete_usages(&mut *tx, class_id, &absent_ids).await?;

    tx.commit().await?;
    sheet.mark_saved();

    tracing::info!(
        class_id = %class_id,
        present = present_ids.len(),
        absent = absent_ids.len(),
        returned_credits = returned,
        "Attendance saved"
    );

    let consumed: Vec<_> = usages
        .iter()
        .map(|u| json!({"student_id": u.student_id, "student_plan_id": u.student_plan_id}))
        .collect();
    audit::record(
        pool,
        AuditEntry::new("attendance_update", "class_session", class_id)
            .payload(json!({
                "present": present_ids,
                "absent": absent_ids,
                "usages": consumed,
            }))
            .by(user_id),
    )
    .await;

    Ok(sheet)
}

/// Plan consumed by every present student, or the first shortfall
fn plan_usages(
    sheet: &AttendanceSheet,
    balances: &HashMap<Uuid, Vec<PlanBalance>>,
    existing: &HashMap<Uuid, Uuid>,
) -> Result<Vec<UsageRecord>, AttendanceError> {
    sheet
        .present()
        .map(|entry| {
            let plans = balances
                .get(&entry.student_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            choose_plan(plans, existing.get(&entry.student_id).copied())
                .map(|student_plan_id| UsageRecord {
                    student_id: entry.student_id,
                    student_plan_id,
                })
                .map_err(|shortfall| match shortfall {
                    PlanShortfall::NoPlan => AttendanceError::NoPlan(entry.student_name.clone()),
                    PlanShortfall::Exhausted => {
                        AttendanceError::PlanExhausted(entry.student_name.clone())
                    }
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::calculators::RosterEntry;
    use chrono::Utc;

    fn sheet_with(entries: Vec<RosterEntry>) -> AttendanceSheet {
        let mut sheet = AttendanceSheet::new(Uuid::new_v4());
        sheet.load(entries, false);
        sheet
    }

    fn student(name: &str, present: bool) -> RosterEntry {
        RosterEntry {
            student_id: Uuid::new_v4(),
            student_name: name.to_string(),
            present,
        }
    }

    #[test]
    fn test_plan_usages_reports_first_shortfall_by_name() {
        let ana = student("Ana", true);
        let balances = HashMap::from([(
            ana.student_id,
            vec![PlanBalance {
                student_plan_id: Uuid::new_v4(),
                student_id: ana.student_id,
                remaining_classes: 3,
                used: 3,
                purchased_at: Utc::now(),
            }],
        )]);
        let sheet = sheet_with(vec![ana]);

        let err = plan_usages(&sheet, &balances, &HashMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "Ana ya utilizó todas las clases de su plan.");
    }

    #[test]
    fn test_plan_usages_without_plan() {
        let sheet = sheet_with(vec![student("Luis", true)]);
        let err = plan_usages(&sheet, &HashMap::new(), &HashMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "Luis no tiene clases disponibles en su plan.");
        assert!(matches!(AppError::from(err), AppError::Rejected(_)));
    }

    #[test]
    fn test_plan_usages_ignores_absent_students() {
        let sheet = sheet_with(vec![student("Luis", false)]);
        let usages = plan_usages(&sheet, &HashMap::new(), &HashMap::new()).unwrap();
        assert!(usages.is_empty());
    }

    #[test]
    fn test_plan_usages_keeps_existing_usage() {
        let ana = student("Ana", true);
        let plan_id = Uuid::new_v4();
        let existing = HashMap::from([(ana.student_id, plan_id)]);
        let sheet = sheet_with(vec![ana.clone()]);

        let usages = plan_usages(&sheet, &HashMap::new(), &existing).unwrap();
        assert_eq!(
            usages,
            vec![UsageRecord {
                student_id: ana.student_id,
                student_plan_id: plan_id
            }]
        );
    }
}
