//! Attendance route handlers

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::error::Result;
use crate::selection::{require_academy, Operator};
use crate::AppState;

use super::requests::SaveAttendanceRequest;
use super::responses::AttendanceSheetResponse;
use super::services;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/classes/:id/attendance",
        get(load_attendance).put(save_attendance),
    )
}

async fn load_attendance(
    State(state): State<AppState>,
    operator: Operator,
    Path(class_id): Path<Uuid>,
) -> Result<Json<AttendanceSheetResponse>> {
    let academy_id = require_academy(&state.cache, operator, "ver la asistencia").await?;
    let sheet = services::load_attendance(&state.db, academy_id, class_id).await?;
    Ok(Json(sheet.into()))
}

async fn save_attendance(
    State(state): State<AppState>,
    operator: Operator,
    Path(class_id): Path<Uuid>,
    Json(req): Json<SaveAttendanceRequest>,
) -> Result<Json<AttendanceSheetResponse>> {
    let academy_id = require_academy(&state.cache, operator, "cargar asistencia").await?;
    let sheet = services::save_attendance(
        &state.db,
        academy_id,
        class_id,
        &req.marks,
        Some(operator.0),
    )
    .await?;
    Ok(Json(sheet.into()))
}
