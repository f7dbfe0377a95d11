//! Billing service functions with database access.
//!
//! Rates and sales agent assignments are read through the cache and
//! invalidated by the writes below.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{self, AuditEntry};
use crate::cache::AppCache;
use crate::error::AppError;
use crate::scheduling::calculators::local_date;

use super::calculators::{
    aggregate_commissions, commission_delta, commission_recipients, invoice_status, invoice_total,
    local_month_bounds, month_bounds, period_of, LivePayment,
};
use super::models::{AcademyRate, SalesAgentAssignment, SalesCommission, SalesCommissionRow};
use super::queries::{self, NewBillingPayment, NewInvoice};
use super::requests::{AssignmentRequest, InvoicePaymentRequest, RateRequest};
use super::responses::{
    AssignmentResponse, CommissionsResponse, InvoicePaymentResponse, IssueInvoiceResponse,
    LiveCommissionsResponse,
};

const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

/// Billing error types
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Periodo inválido.")]
    InvalidPeriod,

    #[error("Factura no encontrada.")]
    InvoiceNotFound,

    #[error("Vendedor no encontrado.")]
    AgentNotFound,

    #[error("No existe comisión para ese período.")]
    CommissionNotFound,

    #[error("Primero configurá el precio por alumno activo para esta academia.")]
    MissingRate,

    #[error("El precio por alumno debe ser un número válido mayor o igual a 0.")]
    InvalidRate,

    #[error("Ingresá una fecha válida (YYYY-MM-DD).")]
    MissingValidFrom,

    #[error("La nueva vigencia no puede comenzar antes del {0}, inicio de la vigencia abierta.")]
    ValidFromBeforeOpen(NaiveDate),

    #[error("La comisión debe estar entre 0 y 1.")]
    InvalidCommissionRate,

    #[error("El monto del pago debe ser un número válido mayor a 0.")]
    InvalidAmount,

    #[error("Ingresá un método de pago.")]
    MissingMethod,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Database(e) => AppError::Database(e),
            BillingError::InvoiceNotFound
            | BillingError::AgentNotFound
            | BillingError::CommissionNotFound => AppError::NotFound(err.to_string()),
            BillingError::MissingRate => AppError::Rejected(err.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// Validate a (year, month) pair
pub fn check_period(year: i32, month: u32) -> Result<(), BillingError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) || month_bounds(year, month).is_none() {
        return Err(BillingError::InvalidPeriod);
    }
    Ok(())
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Current rate of an academy, cached
pub async fn current_rate(
    pool: &PgPool,
    cache: &AppCache,
    academy_id: Uuid,
) -> Result<Option<Arc<AcademyRate>>, BillingError> {
    if let Some(cached) = cache.academy_rates.get(&academy_id).await {
        tracing::debug!("Cache HIT for academy rate: {}", academy_id);
        return Ok(Some(cached));
    }

    tracing::debug!("Cache MISS for academy rate: {}", academy_id);
    let Some(rate) = queries::get_current_rate(pool, academy_id).await? else {
        return Ok(None);
    };

    let rate = Arc::new(rate);
    cache.academy_rates.insert(academy_id, rate.clone()).await;
    Ok(Some(rate))
}

/// Sales agent assignments of an academy, cached
pub async fn academy_assignments(
    pool: &PgPool,
    cache: &AppCache,
    academy_id: Uuid,
) -> Result<Arc<Vec<SalesAgentAssignment>>, BillingError> {
    if let Some(cached) = cache.assignments.get(&academy_id).await {
        tracing::debug!("Cache HIT for assignments: {}", academy_id);
        return Ok(cached);
    }

    tracing::debug!("Cache MISS for assignments: {}", academy_id);
    let rows = Arc::new(queries::list_academy_assignments(pool, academy_id).await?);
    cache.assignments.insert(academy_id, rows.clone()).await;
    Ok(rows)
}

/// A new interval may not start before the open one it closes
fn ensure_not_before(
    open_since: Option<NaiveDate>,
    valid_from: NaiveDate,
) -> Result<(), BillingError> {
    match open_since {
        Some(start) if valid_from < start => Err(BillingError::ValidFromBeforeOpen(start)),
        _ => Ok(()),
    }
}

/// Set a new per-student price, closing the open one
pub async fn set_academy_rate(
    pool: &PgPool,
    cache: &AppCache,
    academy_id: Uuid,
    req: &RateRequest,
    default_currency: &str,
    user_id: Option<Uuid>,
) -> Result<AcademyRate, BillingError> {
    let price = match req.price_per_active_student {
        Some(price) if price >= Decimal::ZERO => price,
        _ => return Err(BillingError::InvalidRate),
    };
    let valid_from = req.valid_from.ok_or(BillingError::MissingValidFrom)?;
    let currency = trimmed(&req.currency).unwrap_or_else(|| default_currency.to_string());

    let mut tx = pool.begin().await?;
    ensure_not_before(queries::lock_open_rate_start(&mut *tx, academy_id).await?, valid_from)?;
    let closed = queries::close_open_rates(&mut *tx, academy_id, valid_from).await?;
    let rate = queries::insert_rate(&mut *tx, academy_id, price, &currency, valid_from).await?;
    tx.commit().await?;

    cache.invalidate_academy(academy_id).await;

    tracing::info!(
        academy_id = %academy_id,
        price = %price,
        valid_from = %valid_from,
        closed,
        "Academy rate updated"
    );

    audit::record(
        pool,
        AuditEntry::new("create", "billing_academy_rate", rate.id)
            .payload(json!({
                "academy_id": academy_id,
                "price_per_active_student": price,
                "valid_from": valid_from,
            }))
            .by(user_id),
    )
    .await;

    Ok(rate)
}

/// Issue the invoice of a period; an existing one is returned unchanged
pub async fn issue_invoice(
    pool: &PgPool,
    cache: &AppCache,
    academy_id: Uuid,
    year: i32,
    month: u32,
    user_id: Option<Uuid>,
) -> Result<IssueInvoiceResponse, BillingError> {
    check_period(year, month)?;
    let (cutoff, _) = month_bounds(year, month).ok_or(BillingError::InvalidPeriod)?;
    let period_month = month as i32;

    if let Some(invoice) = queries::find_invoice(pool, academy_id, year, period_month).await? {
        return Ok(IssueInvoiceResponse {
            invoice,
            created: false,
        });
    }

    let rate = current_rate(pool, cache, academy_id)
        .await?
        .ok_or(BillingError::MissingRate)?;

    let active = queries::count_active_students(pool, academy_id).await?;
    let new_invoice = NewInvoice {
        academy_id,
        period_year: year,
        period_month,
        count_cutoff_date: cutoff,
        active_students_count: active as i32,
        price_per_student: rate.price_per_active_student,
        currency: rate.currency.clone(),
        total_amount: invoice_total(active, rate.price_per_active_student),
    };

    let Some(invoice) = queries::insert_invoice(pool, &new_invoice).await? else {
        // Lost a race with a concurrent issue of the same period
        let invoice = queries::find_invoice(pool, academy_id, year, period_month)
            .await?
            .ok_or(BillingError::InvoiceNotFound)?;
        return Ok(IssueInvoiceResponse {
            invoice,
            created: false,
        });
    };

    tracing::info!(
        invoice_id = %invoice.id,
        academy_id = %academy_id,
        year,
        month,
        total = %invoice.total_amount,
        "Invoice issued"
    );

    audit::record(
        pool,
        AuditEntry::new("create", "billing_invoice", invoice.id)
            .payload(json!({
                "academy_id": academy_id,
                "period_year": year,
                "period_month": month,
                "active_students_count": invoice.active_students_count,
                "total_amount": invoice.total_amount,
            }))
            .by(user_id),
    )
    .await;

    Ok(IssueInvoiceResponse {
        invoice,
        created: true,
    })
}

/// Assign a sales agent, closing the agent's open interval on the academy
pub async fn assign_sales_agent(
    pool: &PgPool,
    cache: &AppCache,
    req: &AssignmentRequest,
    user_id: Option<Uuid>,
) -> Result<AssignmentResponse, BillingError> {
    let rate = match req.commission_rate {
        Some(rate) if rate >= Decimal::ZERO && rate <= Decimal::ONE => rate,
        _ => return Err(BillingError::InvalidCommissionRate),
    };
    let valid_from = req.valid_from.ok_or(BillingError::MissingValidFrom)?;

    let mut tx = pool.begin().await?;

    queries::get_sales_agent(&mut *tx, req.sales_agent_id)
        .await?
        .ok_or(BillingError::AgentNotFound)?;

    let open_since =
        queries::lock_open_assignment_start(&mut *tx, req.academy_id, req.sales_agent_id).await?;
    ensure_not_before(open_since, valid_from)?;

    let closed_previous =
        queries::close_open_assignment(&mut *tx, req.academy_id, req.sales_agent_id, valid_from)
            .await?;
    let id = queries::insert_assignment(
        &mut *tx,
        req.academy_id,
        req.sales_agent_id,
        rate,
        valid_from,
    )
    .await?;

    tx.commit().await?;
    cache.invalidate_academy(req.academy_id).await;

    tracing::info!(
        assignment_id = %id,
        academy_id = %req.academy_id,
        sales_agent_id = %req.sales_agent_id,
        rate = %rate,
        "Sales agent assigned"
    );

    audit::record(
        pool,
        AuditEntry::new("create", "billing_academy_sales_agent", id)
            .payload(json!({
                "academy_id": req.academy_id,
                "sales_agent_id": req.sales_agent_id,
                "commission_rate": rate,
                "valid_from": valid_from,
            }))
            .by(user_id),
    )
    .await;

    Ok(AssignmentResponse {
        id,
        academy_id: req.academy_id,
        sales_agent_id: req.sales_agent_id,
        commission_rate: rate,
        valid_from,
        closed_previous,
    })
}

/// Validate an invoice payment request
pub fn validate_invoice_payment(
    req: &InvoicePaymentRequest,
    now: DateTime<Utc>,
) -> Result<NewBillingPayment, BillingError> {
    let amount = match req.amount {
        Some(amount) if amount > Decimal::ZERO => amount,
        _ => return Err(BillingError::InvalidAmount),
    };
    let method = trimmed(&req.method).ok_or(BillingError::MissingMethod)?;

    Ok(NewBillingPayment {
        paid_at: req.paid_at.unwrap_or(now),
        amount,
        method,
        reference: trimmed(&req.reference),
        note: trimmed(&req.note),
    })
}

/// Register an invoice payment, update the invoice status and accrue the
/// commissions of the agents active on the payment day. One transaction.
pub async fn register_invoice_payment(
    pool: &PgPool,
    cache: &AppCache,
    offset: FixedOffset,
    invoice_id: Uuid,
    payment: NewBillingPayment,
    user_id: Option<Uuid>,
) -> Result<InvoicePaymentResponse, BillingError> {
    let mut tx = pool.begin().await?;

    let invoice = queries::lock_invoice(&mut *tx, invoice_id)
        .await?
        .ok_or(BillingError::InvoiceNotFound)?;

    let inserted = queries::insert_billing_payment(&mut *tx, &invoice, &payment).await?;

    let paid_total = queries::sum_invoice_payments(&mut *tx, invoice.id).await?;
    let status = invoice_status(paid_total, invoice.total_amount);
    if status.as_str() != invoice.status {
        queries::update_invoice_status(&mut *tx, invoice.id, status.as_str()).await?;
    }

    let day = local_date(inserted.paid_at, offset);
    let (year, month) = period_of(day);
    let assignments = academy_assignments(pool, cache, invoice.academy_id).await?;

    let mut commissions: Vec<SalesCommission> = vec![];
    for recipient in commission_recipients(&assignments, day) {
        let delta = commission_delta(inserted.amount, recipient.commission_rate);
        let row = queries::accrue_commission(
            &mut *tx,
            recipient.sales_agent_id,
            year,
            month as i32,
            inserted.amount,
            recipient.commission_rate,
            delta,
        )
        .await?;
        commissions.push(row);
    }

    tx.commit().await?;

    tracing::info!(
        invoice_id = %invoice.id,
        payment_id = %inserted.id,
        amount = %inserted.amount,
        status = status.as_str(),
        commissions = commissions.len(),
        "Invoice payment registered"
    );

    audit::record(
        pool,
        AuditEntry::new("create", "billing_payment", inserted.id)
            .payload(json!({
                "invoice_id": invoice.id,
                "academy_id": invoice.academy_id,
                "amount": inserted.amount,
                "invoice_status": status.as_str(),
                "sales_agent_ids": commissions.iter().map(|c| c.sales_agent_id).collect::<Vec<_>>(),
            }))
            .by(user_id),
    )
    .await;

    Ok(InvoicePaymentResponse {
        payment: inserted,
        invoice_status: status,
        paid_total,
        commissions,
    })
}

/// Commissions computed from the month's payments and current assignments
pub async fn live_commissions(
    pool: &PgPool,
    cache: &AppCache,
    offset: FixedOffset,
    year: i32,
    month: u32,
) -> Result<LiveCommissionsResponse, BillingError> {
    check_period(year, month)?;
    let (from, to) = local_month_bounds(year, month, offset).ok_or(BillingError::InvalidPeriod)?;

    let payments: Vec<LivePayment> = queries::list_payments_between(pool, from, to)
        .await?
        .into_iter()
        .map(|(academy_id, paid_at, amount)| LivePayment {
            academy_id,
            paid_on: local_date(paid_at, offset),
            amount,
        })
        .collect();

    let academies: BTreeSet<Uuid> = payments.iter().map(|p| p.academy_id).collect();
    let mut assignments: Vec<SalesAgentAssignment> = vec![];
    for academy_id in academies {
        let rows = academy_assignments(pool, cache, academy_id).await?;
        assignments.extend(rows.iter().cloned());
    }

    Ok(LiveCommissionsResponse {
        year,
        month,
        totals: aggregate_commissions(&payments, &assignments),
    })
}

/// Persisted commission totals of a period
pub async fn persisted_commissions(
    pool: &PgPool,
    year: i32,
    month: u32,
) -> Result<CommissionsResponse, BillingError> {
    check_period(year, month)?;

    let commissions: Vec<SalesCommissionRow> =
        queries::list_commissions(pool, year, month as i32).await?;
    let total_commission = commissions.iter().map(|c| c.commission_amount).sum();

    Ok(CommissionsResponse {
        year,
        month,
        commissions,
        total_commission,
    })
}

/// Mark a commission paid
pub async fn mark_commission_paid(
    pool: &PgPool,
    commission_id: Uuid,
    now: DateTime<Utc>,
    user_id: Option<Uuid>,
) -> Result<SalesCommission, BillingError> {
    let commission = queries::mark_commission_paid(pool, commission_id, now)
        .await?
        .ok_or(BillingError::CommissionNotFound)?;

    tracing::info!(
        commission_id = %commission.id,
        amount = %commission.commission_amount,
        "Commission marked paid"
    );

    audit::record(
        pool,
        AuditEntry::new("update", "billing_sales_commission", commission.id)
            .payload(json!({
                "status": commission.status,
                "commission_amount": commission.commission_amount,
            }))
            .by(user_id),
    )
    .await;

    Ok(commission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_check_period() {
        assert!(check_period(2024, 6).is_ok());
        assert!(matches!(check_period(2024, 13), Err(BillingError::InvalidPeriod)));
        assert!(matches!(check_period(1999, 1), Err(BillingError::InvalidPeriod)));
    }

    #[test]
    fn test_ensure_not_before_open_interval() {
        let open = NaiveDate::from_ymd_opt(2024, 6, 1);
        let day = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();

        assert!(ensure_not_before(None, day(1)).is_ok());
        assert!(ensure_not_before(open, day(1)).is_ok());
        assert!(ensure_not_before(open, day(20)).is_ok());
        let may = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        let err = ensure_not_before(open, may).unwrap_err();
        assert_eq!(
            err.to_string(),
            "La nueva vigencia no puede comenzar antes del 2024-06-01, inicio de la vigencia abierta."
        );
        assert!(matches!(AppError::from(err), AppError::Validation(_)));
    }

    #[test]
    fn test_validate_invoice_payment() {
        let now = Utc::now();
        let req = InvoicePaymentRequest {
            amount: Some(dec!(100000)),
            method: Some(" transferencia ".to_string()),
            reference: Some("".to_string()),
            ..Default::default()
        };

        let payment = validate_invoice_payment(&req, now).unwrap();
        assert_eq!(payment.method, "transferencia");
        assert_eq!(payment.paid_at, now);
        assert_eq!(payment.reference, None);
    }

    #[test]
    fn test_validate_invoice_payment_rejections() {
        let now = Utc::now();
        let req = InvoicePaymentRequest {
            amount: Some(dec!(-1)),
            method: Some("efectivo".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            validate_invoice_payment(&req, now),
            Err(BillingError::InvalidAmount)
        ));

        let req = InvoicePaymentRequest {
            amount: Some(dec!(10)),
            method: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            validate_invoice_payment(&req, now),
            Err(BillingError::MissingMethod)
        ));
    }

    #[test]
    fn test_missing_rate_maps_to_business_rule() {
        let err = AppError::from(BillingError::MissingRate);
        assert!(matches!(err, AppError::Rejected(_)));
        assert_eq!(
            err.to_string(),
            "Primero configurá el precio por alumno activo para esta academia."
        );
    }
}
