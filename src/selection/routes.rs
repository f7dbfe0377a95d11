//! Selection context endpoints

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use futures::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, Result};
use crate::AppState;

use super::{Operator, Selection};

/// Request to select an academy
#[derive(Debug, Deserialize)]
pub struct SelectAcademyRequest {
    pub academy_id: Option<Uuid>,
}

/// Request to impersonate an academy
#[derive(Debug, Deserialize)]
pub struct ImpersonateRequest {
    pub academy_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/me/selection", get(current))
        .route("/api/me/selection/academy", put(select_academy))
        .route("/api/me/selection/events", get(events))
        .route(
            "/api/me/impersonation",
            post(start_impersonation).delete(end_impersonation),
        )
}

async fn current(State(state): State<AppState>, operator: Operator) -> Json<Selection> {
    Json(state.cache.selection_for(operator.0).await.snapshot())
}

async fn select_academy(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<SelectAcademyRequest>,
) -> Result<Json<Selection>> {
    if let Some(academy_id) = req.academy_id {
        if !db::academy_exists(&state.db, academy_id).await? {
            return Err(AppError::NotFound("Academia no encontrada.".to_string()));
        }
    }

    let store = state.cache.selection_for(operator.0).await;
    Ok(Json(store.select_academy(req.academy_id)))
}

async fn start_impersonation(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<ImpersonateRequest>,
) -> Result<Json<Selection>> {
    let name = db::get_academy_name(&state.db, req.academy_id).await?;

    let store = state.cache.selection_for(operator.0).await;
    let snapshot = store.start_impersonation(req.academy_id, Some(name));
    tracing::info!(operator = %operator.0, academy = %req.academy_id, "Impersonation started");

    Ok(Json(snapshot))
}

async fn end_impersonation(State(state): State<AppState>, operator: Operator) -> Json<Selection> {
    let store = state.cache.selection_for(operator.0).await;
    let snapshot = store.end_impersonation();
    tracing::info!(operator = %operator.0, "Impersonation ended");
    Json(snapshot)
}

/// Server-sent stream of selection changes for the operator
async fn events(
    State(state): State<AppState>,
    operator: Operator,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.cache.selection_for(operator.0).await.subscribe();

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(change) => match Event::default().event(change.name()).json_data(&change) {
                    Ok(event) => return Some((Ok(event), rx)),
                    Err(e) => tracing::warn!("Failed to encode selection event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Selection subscriber lagged by {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
