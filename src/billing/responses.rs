//! Response DTOs for billing endpoints.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::calculators::{CommissionTotals, InvoiceStatus};
use super::models::{BillingPayment, Invoice, SalesCommission, SalesCommissionRow};

/// Issued (or already existing) invoice
#[derive(Debug, Serialize)]
pub struct IssueInvoiceResponse {
    pub invoice: Invoice,
    /// False when the period was already invoiced
    pub created: bool,
}

/// Result of an invoice payment
#[derive(Debug, Serialize)]
pub struct InvoicePaymentResponse {
    pub payment: BillingPayment,
    pub invoice_status: InvoiceStatus,
    pub paid_total: Decimal,
    pub commissions: Vec<SalesCommission>,
}

/// New sales agent assignment
#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub id: Uuid,
    pub academy_id: Uuid,
    pub sales_agent_id: Uuid,
    pub commission_rate: Decimal,
    pub valid_from: NaiveDate,
    /// Open intervals of the same agent that were closed
    pub closed_previous: u64,
}

/// Commissions computed from payments on demand
#[derive(Debug, Serialize)]
pub struct LiveCommissionsResponse {
    pub year: i32,
    pub month: u32,
    #[serde(flatten)]
    pub totals: CommissionTotals,
}

/// Persisted running commission totals
#[derive(Debug, Serialize)]
pub struct CommissionsResponse {
    pub year: i32,
    pub month: u32,
    pub commissions: Vec<SalesCommissionRow>,
    pub total_commission: Decimal,
}
