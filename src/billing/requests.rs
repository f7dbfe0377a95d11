//! Request DTOs for billing endpoints.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

/// Billing period selector
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PeriodQuery {
    pub year: i32,
    pub month: u32,
}

/// Request to set the per-student price of an academy
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateRequest {
    #[serde(default)]
    pub price_per_active_student: Option<Decimal>,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Request to issue a monthly invoice
#[derive(Debug, Clone, Deserialize)]
pub struct IssueInvoiceRequest {
    pub academy_id: Uuid,
    pub year: i32,
    pub month: u32,
}

/// Request to assign a sales agent to an academy
#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentRequest {
    pub academy_id: Uuid,
    pub sales_agent_id: Uuid,
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
}

/// Request to register a payment against an invoice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoicePaymentRequest {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Defaults to now
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}
