//! Database models for academy billing.
//!
//! These models use sqlx's FromRow derive for direct database deserialization.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Monthly price per active student, from billing_academy_rates
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AcademyRate {
    pub id: Uuid,
    pub academy_id: Uuid,
    pub price_per_active_student: Decimal,
    pub currency: String,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

/// Sales agent assignment from billing_academy_sales_agents, with agent data
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SalesAgentAssignment {
    pub id: Uuid,
    pub academy_id: Uuid,
    pub sales_agent_id: Uuid,
    pub agent_name: String,
    pub agent_is_active: bool,
    pub commission_rate: Decimal,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl SalesAgentAssignment {
    /// Check if the assignment covers `day` (half-open interval)
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        if self.valid_from > day {
            return false;
        }
        match self.valid_to {
            Some(end) => day < end,
            None => true,
        }
    }
}

/// Sales agent from billing_sales_agents
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SalesAgent {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub is_active: bool,
}

/// Monthly invoice from billing_invoices
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub academy_id: Uuid,
    pub period_year: i32,
    pub period_month: i32,
    pub count_cutoff_date: NaiveDate,
    pub active_students_count: i32,
    pub price_per_student: Decimal,
    pub currency: String,
    pub total_amount: Decimal,
    pub status: String,
}

/// Payment against an invoice, from billing_payments
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BillingPayment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub academy_id: Uuid,
    pub paid_at: DateTime<Utc>,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub reference: Option<String>,
    pub note: Option<String>,
}

/// Running commission total from billing_sales_commissions
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SalesCommission {
    pub id: Uuid,
    pub sales_agent_id: Uuid,
    pub period_year: i32,
    pub period_month: i32,
    pub base_paid_amount: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Commission row joined with the agent name
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SalesCommissionRow {
    pub id: Uuid,
    pub sales_agent_id: Uuid,
    pub agent_name: String,
    pub period_year: i32,
    pub period_month: i32,
    pub base_paid_amount: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
}
