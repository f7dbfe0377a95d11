//! Scheduling service functions with database access.
//!
//! Every write runs in one transaction. The (court_id, date) unique index is
//! the authoritative collision signal; the pre-insert lookup only produces the
//! same error earlier.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::attendance::calculators::group_by_student;
use crate::attendance::queries as plan_balances;
use crate::audit::{self, AuditEntry};
use crate::db::is_unique_violation;
use crate::error::AppError;

use super::calculators::{
    booking_allowance, compose_start, derive_class_shape, diff_participants, format_slot,
    free_slots, has_duplicates, local_date, local_day_bounds, occurrence_roster, parse_slot,
    reconcile_selection, series_candidates, series_length, BookingRefusal, ClassShape,
    WeeklyPattern,
};
use super::models::{ClassSession, SessionRecord};
use super::queries::{self, COURT_SLOT_INDEX};
use super::requests::{AvailabilityQuery, ClassSeriesRequest, ClassSessionRequest};
use super::responses::AvailabilityResponse;

/// Scheduling error types
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Completa cancha, fecha, hora y profesor.")]
    MissingFields,

    #[error("Horario inválido. Seleccioná una hora entre 06:00 y 22:00.")]
    InvalidSlot,

    #[error("Selecciona al menos 1 alumno (máximo 4). Recibidos: {0}.")]
    InvalidParticipantCount(usize),

    #[error("Un alumno no puede figurar dos veces en la misma clase.")]
    DuplicateParticipant,

    #[error("El precio de la clase no puede ser negativo.")]
    NegativePrice,

    #[error("No podés crear una clase en una fecha y hora que ya pasaron.")]
    InPast,

    #[error("Ese horario ya fue ocupado recientemente. Elegí otra hora.")]
    SlotTaken,

    #[error("{}", busy_students_message(.0))]
    StudentsBusy(Vec<String>),

    #[error("No se puede cancelar una clase que ya comenzó.")]
    AlreadyStarted,

    #[error("Clase no encontrada.")]
    ClassNotFound,

    #[error("Cancha no encontrada.")]
    CourtNotFound,

    #[error("El alumno no está inscripto en esta clase.")]
    StudentNotBooked,

    #[error("La cancha no pertenece a la academia seleccionada.")]
    UnknownCourt,

    #[error("El profesor no pertenece a la academia seleccionada.")]
    UnknownCoach,

    #[error("Algunos alumnos no pertenecen a la academia seleccionada.")]
    UnknownStudents,

    #[error("El alumno {0} no tiene un plan con clases disponibles.")]
    NoPlan(String),

    #[error("El alumno {0} ya no tiene clases disponibles en su plan.")]
    PlanUsedUp(String),

    #[error("El alumno {student} ya tiene {booked} clases futuras reservadas, que es el máximo permitido por su plan.")]
    FutureBookingLimit { student: String, booked: i64 },

    #[error("Seleccioná al menos un día de la semana para las clases recurrentes.")]
    MissingWeekdays,

    #[error("Seleccioná una hora para cada día de la semana marcado.")]
    MissingWeekdayTime,

    #[error("Cada día de la semana (0 = domingo a 6 = sábado) puede figurar una sola vez.")]
    InvalidWeekday,

    #[error("La fecha seleccionada debe tener una hora asignada en la recurrencia.")]
    StartOffPattern,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::Database(e) => AppError::Database(e),
            SchedulingError::SlotTaken => AppError::Conflict(err.to_string()),
            SchedulingError::ClassNotFound
            | SchedulingError::CourtNotFound
            | SchedulingError::StudentNotBooked => AppError::NotFound(err.to_string()),
            SchedulingError::AlreadyStarted
            | SchedulingError::NoPlan(_)
            | SchedulingError::PlanUsedUp(_)
            | SchedulingError::FutureBookingLimit { .. } => AppError::Rejected(err.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

fn busy_students_message(names: &[String]) -> String {
    match names {
        [one] => format!("El alumno {} ya tiene una clase en ese horario.", one),
        _ => format!(
            "Los siguientes alumnos ya tienen una clase en ese horario: {}.",
            names.join(", ")
        ),
    }
}

/// A validated create/edit request
#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub court_id: Uuid,
    pub coach_id: Uuid,
    pub start: DateTime<Utc>,
    pub student_ids: Vec<Uuid>,
    pub shape: ClassShape,
    pub price_cents: i64,
    pub currency: String,
    pub notes: Option<String>,
}

impl SessionDraft {
    fn record(&self, academy_id: Uuid) -> SessionRecord {
        SessionRecord {
            academy_id,
            date: self.start,
            class_type: self.shape.class_type,
            capacity: self.shape.capacity,
            coach_id: self.coach_id,
            court_id: self.court_id,
            price_cents: self.price_cents,
            currency: self.currency.clone(),
            notes: self.notes.clone(),
        }
    }

    /// Same court, coach and price at another start, for a subset of students
    fn occurrence(&self, start: DateTime<Utc>, student_ids: Vec<Uuid>) -> Option<SessionDraft> {
        let shape = derive_class_shape(student_ids.len())?;
        Some(SessionDraft {
            start,
            student_ids,
            shape,
            ..self.clone()
        })
    }
}

/// A validated weekly series: its first session and the weekly hours
#[derive(Debug, Clone)]
pub struct SeriesDraft {
    pub first: SessionDraft,
    pub pattern: WeeklyPattern,
}

/// Result of a create or edit
#[derive(Debug, Clone)]
pub struct ScheduledSession {
    pub session: ClassSession,
    pub student_ids: Vec<Uuid>,
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
    pub warnings: Vec<String>,
}

/// Sessions created for a weekly series
#[derive(Debug, Clone)]
pub struct ClassSeries {
    pub sessions: Vec<ScheduledSession>,
    pub skipped_busy_court: u32,
    pub skipped_busy_students: u32,
    pub incomplete: bool,
}

/// Outcome of taking one student off a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudentRemoval {
    pub returned_credits: u64,
    pub remaining_students: usize,
    pub class_deleted: bool,
}

/// Whether booking a session checks the students' plans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanRule {
    Enforce,
    Skip,
}

/// Validate form input before any database access.
///
/// Capacity and type are derived from the participant list, never taken
/// from the client.
pub fn validate_session_request(
    req: &ClassSessionRequest,
    offset: FixedOffset,
    default_currency: &str,
) -> Result<SessionDraft, SchedulingError> {
    let (Some(court_id), Some(coach_id), Some(date), Some(time)) =
        (req.court_id, req.coach_id, req.date, req.time.as_deref())
    else {
        return Err(SchedulingError::MissingFields);
    };
    if time.trim().is_empty() {
        return Err(SchedulingError::MissingFields);
    }

    let hour = parse_slot(time).ok_or(SchedulingError::InvalidSlot)?;
    let start = compose_start(date, hour, offset).ok_or(SchedulingError::InvalidSlot)?;

    let shape = derive_class_shape(req.student_ids.len())
        .ok_or(SchedulingError::InvalidParticipantCount(req.student_ids.len()))?;
    if has_duplicates(&req.student_ids) {
        return Err(SchedulingError::DuplicateParticipant);
    }

    let price_cents = req.price_cents.unwrap_or(0);
    if price_cents < 0 {
        return Err(SchedulingError::NegativePrice);
    }

    let currency = req
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(default_currency)
        .to_string();

    let notes = req
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(SessionDraft {
        court_id,
        coach_id,
        start,
        student_ids: req.student_ids.clone(),
        shape,
        price_cents,
        currency,
        notes,
    })
}

/// Validate a weekly series request.
///
/// The first session's hour comes from the weekday of `date`.
pub fn validate_series_request(
    req: &ClassSeriesRequest,
    offset: FixedOffset,
    default_currency: &str,
) -> Result<SeriesDraft, SchedulingError> {
    if req.weekdays.is_empty() {
        return Err(SchedulingError::MissingWeekdays);
    }

    let mut pattern = WeeklyPattern::default();
    for slot in &req.weekdays {
        let time = slot
            .time
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(SchedulingError::MissingWeekdayTime)?;
        let hour = parse_slot(time).ok_or(SchedulingError::InvalidSlot)?;
        if !pattern.set(slot.weekday, hour) {
            return Err(SchedulingError::InvalidWeekday);
        }
    }

    let date = req.session.date.ok_or(SchedulingError::MissingFields)?;
    let hour = pattern
        .hour_on(date.weekday())
        .ok_or(SchedulingError::StartOffPattern)?;

    let first = ClassSessionRequest {
        time: Some(format_slot(hour)),
        ..req.session.clone()
    };

    Ok(SeriesDraft {
        first: validate_session_request(&first, offset, default_currency)?,
        pattern,
    })
}

/// Reject sessions that would start at or before `now`
pub fn ensure_future(start: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), SchedulingError> {
    if start <= now {
        return Err(SchedulingError::InPast);
    }
    Ok(())
}

/// Free hourly slots for a court on a local date.
///
/// Nothing is reserved: the slot is re-checked when the session is written.
pub async fn court_availability(
    pool: &PgPool,
    offset: FixedOffset,
    court_id: Uuid,
    query: &AvailabilityQuery,
) -> Result<AvailabilityResponse, SchedulingError> {
    let mut conn = pool.acquire().await?;
    queries::get_court_academy(&mut *conn, court_id)
        .await?
        .ok_or(SchedulingError::CourtNotFound)?;
    drop(conn);

    let (from, to) = local_day_bounds(query.date, offset);
    let occupied =
        queries::list_court_session_starts(pool, court_id, from, to, query.exclude_class_id)
            .await?;

    let free = free_slots(&occupied, offset);
    let selected = reconcile_selection(query.selected.as_deref(), &free);

    Ok(AvailabilityResponse {
        court_id,
        date: query.date,
        free_slots: free,
        selected,
    })
}

/// Create a session and its bookings.
///
/// Every student needs a plan with classes left, and fewer future bookings
/// than that plan's size.
pub async fn create_class_session(
    pool: &PgPool,
    academy_id: Uuid,
    draft: SessionDraft,
    now: DateTime<Utc>,
    user_id: Option<Uuid>,
) -> Result<ScheduledSession, SchedulingError> {
    let (scheduled, _) =
        book_session(pool, academy_id, draft, now, user_id, PlanRule::Enforce).await?;
    Ok(scheduled)
}

/// Create the first session of a series, then one per matching weekday
/// until the students' plan balances are covered.
///
/// Follow-up dates whose court or students are taken are skipped and
/// counted. The search stops after `SERIES_SEARCH_DAYS` days.
pub async fn create_class_series(
    pool: &PgPool,
    academy_id: Uuid,
    series: SeriesDraft,
    offset: FixedOffset,
    now: DateTime<Utc>,
    user_id: Option<Uuid>,
) -> Result<ClassSeries, SchedulingError> {
    let SeriesDraft { first, pattern } = series;
    let first_day = local_date(first.start, offset);

    let (opening, allowance) =
        book_session(pool, academy_id, first.clone(), now, user_id, PlanRule::Enforce).await?;
    let target = series_length(&allowance);

    let mut created = ClassSeries {
        sessions: vec![opening],
        skipped_busy_court: 0,
        skipped_busy_students: 0,
        incomplete: false,
    };

    for (day, hour) in series_candidates(first_day, &pattern) {
        if created.sessions.len() >= target {
            break;
        }
        let roster = occurrence_roster(&first.student_ids, &allowance, created.sessions.len());
        let Some(start) = compose_start(day, hour, offset) else {
            continue;
        };
        let Some(draft) = first.occurrence(start, roster) else {
            break;
        };

        match book_session(pool, academy_id, draft, now, user_id, PlanRule::Skip).await {
            Ok((scheduled, _)) => created.sessions.push(scheduled),
            Err(SchedulingError::SlotTaken) => created.skipped_busy_court += 1,
            Err(SchedulingError::StudentsBusy(_)) => created.skipped_busy_students += 1,
            Err(e) => return Err(e),
        }
    }

    created.incomplete = created.sessions.len() < target;

    tracing::info!(
        court_id = %first.court_id,
        created = created.sessions.len(),
        planned = target,
        skipped_busy_court = created.skipped_busy_court,
        skipped_busy_students = created.skipped_busy_students,
        "Class series created"
    );

    Ok(created)
}

/// Write one session with its bookings.
///
/// Returns the classes each student can still book when plans are enforced.
async fn book_session(
    pool: &PgPool,
    academy_id: Uuid,
    draft: SessionDraft,
    now: DateTime<Utc>,
    user_id: Option<Uuid>,
    plans: PlanRule,
) -> Result<(ScheduledSession, HashMap<Uuid, i64>), SchedulingError> {
    ensure_future(draft.start, now)?;

    let mut tx = pool.begin().await?;

    let coach_name = ensure_references(&mut *tx, academy_id, &draft).await?;

    if queries::find_court_session_at(&mut *tx, draft.court_id, draft.start, None)
        .await?
        .is_some()
    {
        return Err(SchedulingError::SlotTaken);
    }

    let allowance = match plans {
        PlanRule::Enforce => booking_allowances(&mut *tx, &draft.student_ids, now).await?,
        PlanRule::Skip => HashMap::new(),
    };

    ensure_students_free(&mut *tx, &draft, None).await?;

    let warnings = coach_warnings(&mut *tx, &draft, &coach_name, None).await?;

    let session = queries::insert_class_session(&mut *tx, &draft.record(academy_id))
        .await
        .map_err(map_slot_violation)?;
    queries::insert_bookings(&mut *tx, session.id, &draft.student_ids).await?;

    tx.commit().await?;

    tracing::info!(
        class_id = %session.id,
        court_id = %session.court_id,
        date = %session.date,
        capacity = session.capacity,
        "Class session created"
    );

    audit::record(
        pool,
        AuditEntry::new("create", "class_session", session.id)
            .payload(json!({
                "date": session.date,
                "court_id": session.court_id,
                "coach_id": session.coach_id,
                "type": session.class_type,
                "capacity": session.capacity,
                "price_cents": session.price_cents,
                "currency": session.currency,
                "student_ids": draft.student_ids,
            }))
            .by(user_id),
    )
    .await;

    let scheduled = ScheduledSession {
        session,
        added: draft.student_ids.clone(),
        student_ids: draft.student_ids,
        removed: vec![],
        warnings,
    };
    Ok((scheduled, allowance))
}

/// Edit a session: re-check the slot, reconcile bookings, re-derive shape
pub async fn update_class_session(
    pool: &PgPool,
    academy_id: Uuid,
    class_id: Uuid,
    draft: SessionDraft,
    user_id: Option<Uuid>,
) -> Result<ScheduledSession, SchedulingError> {
    let mut tx = pool.begin().await?;

    academy_session(&mut *tx, academy_id, class_id).await?;

    let coach_name = ensure_references(&mut *tx, academy_id, &draft).await?;

    if queries::find_court_session_at(&mut *tx, draft.court_id, draft.start, Some(class_id))
        .await?
        .is_some()
    {
        return Err(SchedulingError::SlotTaken);
    }

    ensure_students_free(&mut *tx, &draft, Some(class_id)).await?;

    let warnings = coach_warnings(&mut *tx, &draft, &coach_name, Some(class_id)).await?;

    let previous = queries::list_booked_students(&mut *tx, class_id).await?;
    let diff = diff_participants(&previous, &draft.student_ids);

    let session = queries::update_class_session(&mut *tx, class_id, &draft.record(academy_id))
        .await
        .map_err(map_slot_violation)?;
    let returned = queries::remove_participants(&mut *tx, class_id, &diff.removed).await?;
    queries::insert_bookings(&mut *tx, class_id, &diff.added).await?;

    tx.commit().await?;

    tracing::info!(
        class_id = %class_id,
        added = diff.added.len(),
        removed = diff.removed.len(),
        returned_credits = returned,
        "Class session updated"
    );

    audit::record(
        pool,
        AuditEntry::new("update", "class_session", class_id)
            .payload(json!({
                "date": session.date,
                "court_id": session.court_id,
                "coach_id": session.coach_id,
                "type": session.class_type,
                "capacity": session.capacity,
                "add_students": diff.added,
                "remove_students": diff.removed,
            }))
            .by(user_id),
    )
    .await;

    Ok(ScheduledSession {
        session,
        student_ids: draft.student_ids,
        added: diff.added,
        removed: diff.removed,
        warnings,
    })
}

/// Cancel a future session, returning its consumed plan credits.
///
/// Returns the number of plan usages removed.
pub async fn cancel_class_session(
    pool: &PgPool,
    academy_id: Uuid,
    class_id: Uuid,
    now: DateTime<Utc>,
    user_id: Option<Uuid>,
) -> Result<u64, SchedulingError> {
    let mut tx = pool.begin().await?;

    let session = academy_session(&mut *tx, academy_id, class_id).await?;

    if session.has_started(now) {
        return Err(SchedulingError::AlreadyStarted);
    }

    let returned = queries::delete_class_plan_usages(&mut *tx, class_id).await?;
    queries::delete_class_session(&mut *tx, class_id).await?;

    tx.commit().await?;

    tracing::info!(class_id = %class_id, returned_credits = returned, "Class session cancelled");

    audit::record(
        pool,
        AuditEntry::new("delete", "class_session", class_id)
            .payload(json!({
                "date": session.date,
                "court_id": session.court_id,
                "coach_id": session.coach_id,
                "capacity": session.capacity,
                "price_cents": session.price_cents,
                "currency": session.currency,
            }))
            .by(user_id),
    )
    .await;

    Ok(returned)
}

/// Take one student off a session.
///
/// Their booking, attendance and plan usage go; the session keeps its
/// shape in line with the students left, and is deleted when none remain.
pub async fn remove_student_from_class(
    pool: &PgPool,
    academy_id: Uuid,
    class_id: Uuid,
    student_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<StudentRemoval, SchedulingError> {
    let mut tx = pool.begin().await?;

    let session = academy_session(&mut *tx, academy_id, class_id).await?;

    let booked = queries::list_booked_students(&mut *tx, class_id).await?;
    if !booked.contains(&student_id) {
        return Err(SchedulingError::StudentNotBooked);
    }

    let returned_credits = queries::remove_participants(&mut *tx, class_id, &[student_id]).await?;
    let remaining_students = booked.len() - 1;
    let class_deleted = remaining_students == 0;

    if class_deleted {
        queries::delete_class_session(&mut *tx, class_id).await?;
    } else if let Some(shape) = derive_class_shape(remaining_students) {
        queries::update_class_shape(&mut *tx, class_id, shape).await?;
    }

    tx.commit().await?;

    tracing::info!(
        class_id = %class_id,
        student_id = %student_id,
        remaining_students,
        class_deleted,
        "Student removed from class session"
    );

    audit::record(
        pool,
        AuditEntry::new("remove_student", "class_session", class_id)
            .payload(json!({
                "date": session.date,
                "student_id": student_id,
                "returned_credits": returned_credits,
                "remaining_students": remaining_students,
                "class_deleted": class_deleted,
            }))
            .by(user_id),
    )
    .await;

    Ok(StudentRemoval {
        returned_credits,
        remaining_students,
        class_deleted,
    })
}

/// Session of the operator's academy; others read as missing
async fn academy_session(
    conn: &mut PgConnection,
    academy_id: Uuid,
    class_id: Uuid,
) -> Result<ClassSession, SchedulingError> {
    queries::get_class_session(conn, class_id)
        .await?
        .filter(|s| s.academy_id == academy_id)
        .ok_or(SchedulingError::ClassNotFound)
}

/// Check that court, coach and students belong to the academy.
///
/// Returns the coach's name.
async fn ensure_references(
    conn: &mut PgConnection,
    academy_id: Uuid,
    draft: &SessionDraft,
) -> Result<String, SchedulingError> {
    match queries::get_court_academy(conn, draft.court_id).await? {
        Some(owner) if owner == academy_id => {}
        _ => return Err(SchedulingError::UnknownCourt),
    }

    let coach_name = queries::get_coach_name(conn, draft.coach_id, academy_id)
        .await?
        .ok_or(SchedulingError::UnknownCoach)?;

    let known = queries::count_academy_students(conn, academy_id, &draft.student_ids).await?;
    if known != draft.student_ids.len() as i64 {
        return Err(SchedulingError::UnknownStudents);
    }

    Ok(coach_name)
}

/// Classes each student can still book, or the first refusal.
///
/// Locks the students' plans for the rest of the transaction.
async fn booking_allowances(
    conn: &mut PgConnection,
    student_ids: &[Uuid],
    now: DateTime<Utc>,
) -> Result<HashMap<Uuid, i64>, SchedulingError> {
    let plans =
        group_by_student(plan_balances::lock_plan_balances(&mut *conn, student_ids).await?);
    let future = queries::count_future_bookings(&mut *conn, student_ids, now).await?;
    let names = queries::student_names(&mut *conn, student_ids).await?;

    let mut allowance = HashMap::with_capacity(student_ids.len());
    for id in student_ids {
        let held = plans.get(id).map(Vec::as_slice).unwrap_or(&[]);
        let booked = future.get(id).copied().unwrap_or(0);
        let name = || names.get(id).cloned().unwrap_or_else(|| id.to_string());

        let left = booking_allowance(held, booked).map_err(|refusal| match refusal {
            BookingRefusal::NoPlan => SchedulingError::NoPlan(name()),
            BookingRefusal::UsedUp => SchedulingError::PlanUsedUp(name()),
            BookingRefusal::FutureLimit(booked) => SchedulingError::FutureBookingLimit {
                student: name(),
                booked,
            },
        })?;
        allowance.insert(*id, left);
    }

    Ok(allowance)
}

/// A student cannot attend two sessions starting at the same instant
async fn ensure_students_free(
    conn: &mut PgConnection,
    draft: &SessionDraft,
    exclude_class_id: Option<Uuid>,
) -> Result<(), SchedulingError> {
    let busy =
        queries::find_busy_students(conn, &draft.student_ids, draft.start, exclude_class_id)
            .await?;
    if busy.is_empty() {
        Ok(())
    } else {
        Err(SchedulingError::StudentsBusy(busy))
    }
}

/// A coach double-booking is allowed but reported
async fn coach_warnings(
    conn: &mut PgConnection,
    draft: &SessionDraft,
    coach_name: &str,
    exclude_class_id: Option<Uuid>,
) -> Result<Vec<String>, SchedulingError> {
    let clash =
        queries::find_coach_session_at(conn, draft.coach_id, draft.start, exclude_class_id).await?;

    Ok(match clash {
        Some(other) => {
            tracing::warn!(coach_id = %draft.coach_id, other_class = %other, "Coach double-booked");
            vec![format!("{} ya tiene una clase en ese horario.", coach_name)]
        }
        None => vec![],
    })
}

fn map_slot_violation(err: sqlx::Error) -> SchedulingError {
    if is_unique_violation(&err, COURT_SLOT_INDEX) {
        SchedulingError::SlotTaken
    } else {
        SchedulingError::Database(err)
    }
}
