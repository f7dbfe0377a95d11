//! Billing route handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, Result};
use crate::selection::Operator;
use crate::AppState;

use super::models::{AcademyRate, SalesCommission};
use super::requests::{
    AssignmentRequest, InvoicePaymentRequest, IssueInvoiceRequest, PeriodQuery, RateRequest,
};
use super::responses::{
    AssignmentResponse, CommissionsResponse, InvoicePaymentResponse, IssueInvoiceResponse,
    LiveCommissionsResponse,
};
use super::services;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/billing/academies/:id/rates", post(set_rate))
        .route("/api/billing/invoices", post(issue_invoice))
        .route("/api/billing/invoices/:id/payments", post(register_payment))
        .route("/api/billing/assignments", post(assign_sales_agent))
        .route("/api/billing/commissions", get(commissions))
        .route("/api/billing/commissions/live", get(live_commissions))
        .route("/api/billing/commissions/:id/mark-paid", post(mark_paid))
}

async fn ensure_academy(state: &AppState, academy_id: Uuid) -> Result<()> {
    if !db::academy_exists(&state.db, academy_id).await? {
        return Err(AppError::NotFound("Academia no encontrada.".to_string()));
    }
    Ok(())
}

async fn set_rate(
    State(state): State<AppState>,
    operator: Operator,
    Path(academy_id): Path<Uuid>,
    Json(req): Json<RateRequest>,
) -> Result<(StatusCode, Json<AcademyRate>)> {
    ensure_academy(&state, academy_id).await?;
    let rate = services::set_academy_rate(
        &state.db,
        &state.cache,
        academy_id,
        &req,
        &state.config.currency,
        Some(operator.0),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(rate)))
}

async fn issue_invoice(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<IssueInvoiceRequest>,
) -> Result<(StatusCode, Json<IssueInvoiceResponse>)> {
    ensure_academy(&state, req.academy_id).await?;
    let issued = services::issue_invoice(
        &state.db,
        &state.cache,
        req.academy_id,
        req.year,
        req.month,
        Some(operator.0),
    )
    .await?;

    let status = if issued.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(issued)))
}

async fn register_payment(
    State(state): State<AppState>,
    operator: Operator,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<InvoicePaymentRequest>,
) -> Result<(StatusCode, Json<InvoicePaymentResponse>)> {
    let payment = services::validate_invoice_payment(&req, Utc::now())?;
    let result = services::register_invoice_payment(
        &state.db,
        &state.cache,
        state.config.utc_offset,
        invoice_id,
        payment,
        Some(operator.0),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn assign_sales_agent(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<AssignmentRequest>,
) -> Result<(StatusCode, Json<AssignmentResponse>)> {
    ensure_academy(&state, req.academy_id).await?;
    let assignment =
        services::assign_sales_agent(&state.db, &state.cache, &req, Some(operator.0)).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn commissions(
    State(state): State<AppState>,
    Query(period): Query<PeriodQuery>,
) -> Result<Json<CommissionsResponse>> {
    Ok(Json(
        services::persisted_commissions(&state.db, period.year, period.month).await?,
    ))
}

async fn live_commissions(
    State(state): State<AppState>,
    Query(period): Query<PeriodQuery>,
) -> Result<Json<LiveCommissionsResponse>> {
    let live = services::live_commissions(
        &state.db,
        &state.cache,
        state.config.utc_offset,
        period.year,
        period.month,
    )
    .await?;
    Ok(Json(live))
}

async fn mark_paid(
    State(state): State<AppState>,
    operator: Operator,
    Path(commission_id): Path<Uuid>,
) -> Result<Json<SalesCommission>> {
    let commission =
        services::mark_commission_paid(&state.db, commission_id, Utc::now(), Some(operator.0))
            .await?;
    Ok(Json(commission))
}
