//! Scheduling route handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::selection::{require_academy, Operator};
use crate::AppState;

use super::requests::{AvailabilityQuery, ClassSeriesRequest, ClassSessionRequest};
use super::responses::{
    AvailabilityResponse, CancelResponse, ClassSeriesResponse, ClassSessionEditResponse,
    ClassSessionResponse, StudentRemovalResponse,
};
use super::services;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/courts/:court_id/availability", get(availability))
        .route("/api/classes", post(create_class))
        .route("/api/classes/series", post(create_series))
        .route("/api/classes/:id", put(update_class).delete(cancel_class))
        .route(
            "/api/classes/:id/students/:student_id",
            delete(remove_student),
        )
}

async fn availability(
    State(state): State<AppState>,
    Path(court_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>> {
    let response =
        services::court_availability(&state.db, state.config.utc_offset, court_id, &query).await?;
    Ok(Json(response))
}

async fn create_class(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<ClassSessionRequest>,
) -> Result<(StatusCode, Json<ClassSessionResponse>)> {
    let academy_id = require_academy(&state.cache, operator, "crear clases").await?;
    let offset = state.config.utc_offset;

    let draft = services::validate_session_request(&req, offset, &state.config.currency)?;
    let created =
        services::create_class_session(&state.db, academy_id, draft, Utc::now(), Some(operator.0))
            .await?;

    Ok((
        StatusCode::CREATED,
        Json(ClassSessionResponse::new(
            created.session,
            created.student_ids,
            created.warnings,
            offset,
        )),
    ))
}

async fn create_series(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<ClassSeriesRequest>,
) -> Result<(StatusCode, Json<ClassSeriesResponse>)> {
    let academy_id = require_academy(&state.cache, operator, "crear clases").await?;
    let offset = state.config.utc_offset;

    let draft = services::validate_series_request(&req, offset, &state.config.currency)?;
    let series = services::create_class_series(
        &state.db,
        academy_id,
        draft,
        offset,
        Utc::now(),
        Some(operator.0),
    )
    .await?;

    let sessions = series
        .sessions
        .into_iter()
        .map(|s| ClassSessionResponse::new(s.session, s.student_ids, s.warnings, offset))
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(ClassSeriesResponse {
            sessions,
            skipped_busy_court: series.skipped_busy_court,
            skipped_busy_students: series.skipped_busy_students,
            incomplete: series.incomplete,
        }),
    ))
}

async fn update_class(
    State(state): State<AppState>,
    operator: Operator,
    Path(class_id): Path<Uuid>,
    Json(req): Json<ClassSessionRequest>,
) -> Result<Json<ClassSessionEditResponse>> {
    let academy_id = require_academy(&state.cache, operator, "editar clases").await?;
    let offset = state.config.utc_offset;

    let draft = services::validate_session_request(&req, offset, &state.config.currency)?;
    let updated =
        services::update_class_session(&state.db, academy_id, class_id, draft, Some(operator.0))
            .await?;

    Ok(Json(ClassSessionEditResponse {
        session: ClassSessionResponse::new(
            updated.session,
            updated.student_ids,
            updated.warnings,
            offset,
        ),
        added_students: updated.added,
        removed_students: updated.removed,
    }))
}

async fn cancel_class(
    State(state): State<AppState>,
    operator: Operator,
    Path(class_id): Path<Uuid>,
) -> Result<Json<CancelResponse>> {
    let academy_id = require_academy(&state.cache, operator, "cancelar clases").await?;
    let returned_credits = services::cancel_class_session(
        &state.db,
        academy_id,
        class_id,
        Utc::now(),
        Some(operator.0),
    )
    .await?;

    Ok(Json(CancelResponse {
        id: class_id,
        returned_credits,
    }))
}

async fn remove_student(
    State(state): State<AppState>,
    operator: Operator,
    Path((class_id, student_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<StudentRemovalResponse>> {
    let academy_id = require_academy(&state.cache, operator, "editar clases").await?;
    let removal = services::remove_student_from_class(
        &state.db,
        academy_id,
        class_id,
        student_id,
        Some(operator.0),
    )
    .await?;

    Ok(Json(StudentRemovalResponse {
        class_id,
        student_id,
        returned_credits: removal.returned_credits,
        remaining_students: removal.remaining_students,
        class_deleted: removal.class_deleted,
    }))
}
