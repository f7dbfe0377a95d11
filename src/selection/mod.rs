//! Operator identity and academy selection context.
//!
//! Authentication happens upstream; the gateway forwards the operator id in
//! the `x-user-id` header. Each operator owns a [`SelectionStore`] that scopes
//! academy-bound actions and notifies subscribers of changes.

pub mod routes;
pub mod store;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::cache::AppCache;
use crate::error::AppError;

pub use routes::router;
pub use store::{Impersonation, Selection, SelectionChange, SelectionStore};

pub const OPERATOR_HEADER: &str = "x-user-id";

/// Authenticated operator forwarded by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for Operator
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OPERATOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthenticated)?;

        Uuid::parse_str(raw.trim())
            .map(Operator)
            .map_err(|_| AppError::Unauthenticated)
    }
}

/// Academy the operator is acting on, or a validation error naming `action`
pub async fn require_academy(cache: &AppCache, operator: Operator, action: &str) -> Result<Uuid, AppError> {
    cache
        .selection_for(operator.0)
        .await
        .effective_academy()
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Debes seleccionar una academia antes de {}.",
                action
            ))
        })
}
