//! Plan and payment route handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::scheduling::calculators::local_date;
use crate::selection::{require_academy, Operator};
use crate::AppState;

use super::models::{Payment, StudentPlan};
use super::requests::{AssignPlanRequest, PaymentRequest};
use super::responses::{DeletedResponse, StudentPlansResponse};
use super::services;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/student-plans", post(assign_plan))
        .route("/api/students/:id/plans", get(student_plans))
        .route("/api/plans/:id", delete(delete_plan))
        .route("/api/payments", post(register_payment))
}

async fn assign_plan(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<AssignPlanRequest>,
) -> Result<(StatusCode, Json<StudentPlan>)> {
    let academy_id = require_academy(&state.cache, operator, "asignar un plan").await?;
    let student_plan = services::assign_plan(&state.db, academy_id, &req, Some(operator.0)).await?;
    Ok((StatusCode::CREATED, Json(student_plan)))
}

async fn student_plans(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<StudentPlansResponse>> {
    Ok(Json(services::student_plans(&state.db, student_id).await?))
}

async fn delete_plan(
    State(state): State<AppState>,
    operator: Operator,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    services::delete_plan(&state.db, plan_id, Some(operator.0)).await?;
    Ok(Json(DeletedResponse {
        id: plan_id,
        deleted: true,
    }))
}

async fn register_payment(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<Payment>)> {
    let today = local_date(Utc::now(), state.config.utc_offset);
    let payment = services::validate_payment(&req, today, &state.config.currency)?;
    let inserted = services::register_payment(&state.db, payment, Some(operator.0)).await?;
    Ok((StatusCode::CREATED, Json(inserted)))
}
