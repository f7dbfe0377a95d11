//! Lookups shared by several modules

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Check that an academy exists
pub async fn academy_exists(pool: &PgPool, academy_id: Uuid) -> Result<bool> {
    let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM academies WHERE id = $1")
        .bind(academy_id)
        .fetch_optional(pool)
        .await?;

    Ok(found.is_some())
}

/// Get an academy's display name
pub async fn get_academy_name(pool: &PgPool, academy_id: Uuid) -> Result<String> {
    sqlx::query_scalar("SELECT name FROM academies WHERE id = $1")
        .bind(academy_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Academia no encontrada.".to_string()))
}
