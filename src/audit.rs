//! Audit trail for operator actions.
//!
//! Entries are written after the primary transaction commits. A failed audit
//! insert is logged and never fails the action that produced it.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// One audit entry
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: Option<Uuid>,
    pub payload: Option<Value>,
    pub user_id: Option<Uuid>,
}

impl AuditEntry {
    pub fn new(action: &'static str, entity: &'static str, entity_id: Uuid) -> Self {
        Self {
            action,
            entity,
            entity_id: Some(entity_id),
            payload: None,
            user_id: None,
        }
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn by(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Insert an audit entry, logging instead of failing
pub async fn record(pool: &PgPool, entry: AuditEntry) {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_logs (id, action, entity, entity_id, payload, user_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.action)
    .bind(entry.entity)
    .bind(entry.entity_id)
    .bind(&entry.payload)
    .bind(entry.user_id)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(
            action = entry.action,
            entity = entry.entity,
            "Failed to write audit log: {}",
            e
        );
    }
}
