//! Database queries for academy billing.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::calculators::CommissionStatus;
use super::models::{
    AcademyRate, BillingPayment, Invoice, SalesAgent, SalesAgentAssignment, SalesCommission,
    SalesCommissionRow,
};

const INVOICE_COLUMNS: &str = r#"
    id, academy_id, period_year, period_month, count_cutoff_date,
    active_students_count, price_per_student, currency, total_amount, status
"#;

const COMMISSION_COLUMNS: &str = r#"
    id, sales_agent_id, period_year, period_month, base_paid_amount,
    commission_rate, commission_amount, status, paid_at
"#;

/// Open (valid_to IS NULL) rate of an academy, latest first
pub async fn get_current_rate(
    pool: &PgPool,
    academy_id: Uuid,
) -> Result<Option<AcademyRate>, sqlx::Error> {
    sqlx::query_as::<_, AcademyRate>(
        r#"
        SELECT id, academy_id, price_per_active_student, currency, valid_from, valid_to
        FROM billing_academy_rates
        WHERE academy_id = $1
          AND valid_to IS NULL
        ORDER BY valid_from DESC
        LIMIT 1
        "#,
    )
    .bind(academy_id)
    .fetch_optional(pool)
    .await
}

/// Start of the academy's open rate, locked until the transaction ends
pub async fn lock_open_rate_start(
    conn: &mut PgConnection,
    academy_id: Uuid,
) -> Result<Option<NaiveDate>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT valid_from
        FROM billing_academy_rates
        WHERE academy_id = $1
          AND valid_to IS NULL
        ORDER BY valid_from DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(academy_id)
    .fetch_optional(conn)
    .await
}

/// Close the open rates of an academy at `valid_to`.
///
/// Rates starting after `valid_to` are left open.
pub async fn close_open_rates(
    conn: &mut PgConnection,
    academy_id: Uuid,
    valid_to: NaiveDate,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE billing_academy_rates
        SET valid_to = $2
        WHERE academy_id = $1
          AND valid_to IS NULL
          AND valid_from <= $2
        "#,
    )
    .bind(academy_id)
    .bind(valid_to)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Insert an open rate
pub async fn insert_rate(
    conn: &mut PgConnection,
    academy_id: Uuid,
    price: Decimal,
    currency: &str,
    valid_from: NaiveDate,
) -> Result<AcademyRate, sqlx::Error> {
    sqlx::query_as::<_, AcademyRate>(
        r#"
        INSERT INTO billing_academy_rates
            (id, academy_id, price_per_active_student, currency, valid_from, valid_to)
        VALUES ($1, $2, $3, $4, $5, NULL)
        RETURNING id, academy_id, price_per_active_student, currency, valid_from, valid_to
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(academy_id)
    .bind(price)
    .bind(currency)
    .bind(valid_from)
    .fetch_one(conn)
    .await
}

/// Assignments of an academy with agent name and active flag
pub async fn list_academy_assignments(
    pool: &PgPool,
    academy_id: Uuid,
) -> Result<Vec<SalesAgentAssignment>, sqlx::Error> {
    sqlx::query_as::<_, SalesAgentAssignment>(
        r#"
        SELECT asg.id,
               asg.academy_id,
               asg.sales_agent_id,
               ag.name AS agent_name,
               ag.is_active AS agent_is_active,
               asg.commission_rate,
               asg.valid_from,
               asg.valid_to
        FROM billing_academy_sales_agents asg
        JOIN billing_sales_agents ag ON ag.id = asg.sales_agent_id
        WHERE asg.academy_id = $1
        ORDER BY asg.valid_from DESC
        "#,
    )
    .bind(academy_id)
    .fetch_all(pool)
    .await
}

/// Get a sales agent by id
pub async fn get_sales_agent(
    conn: &mut PgConnection,
    agent_id: Uuid,
) -> Result<Option<SalesAgent>, sqlx::Error> {
    sqlx::query_as::<_, SalesAgent>(
        "SELECT id, name, email, is_active FROM billing_sales_agents WHERE id = $1",
    )
    .bind(agent_id)
    .fetch_optional(conn)
    .await
}

/// Start of the agent's open interval on the academy, locked until the
/// transaction ends
pub async fn lock_open_assignment_start(
    conn: &mut PgConnection,
    academy_id: Uuid,
    agent_id: Uuid,
) -> Result<Option<NaiveDate>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT valid_from
        FROM billing_academy_sales_agents
        WHERE academy_id = $1
          AND sales_agent_id = $2
          AND valid_to IS NULL
        ORDER BY valid_from DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(academy_id)
    .bind(agent_id)
    .fetch_optional(conn)
    .await
}

/// Close the agent's open interval on the academy at `valid_to`
pub async fn close_open_assignment(
    conn: &mut PgConnection,
    academy_id: Uuid,
    agent_id: Uuid,
    valid_to: NaiveDate,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE billing_academy_sales_agents
        SET valid_to = $3
        WHERE academy_id = $1
          AND sales_agent_id = $2
          AND valid_to IS NULL
          AND valid_from <= $3
        "#,
    )
    .bind(academy_id)
    .bind(agent_id)
    .bind(valid_to)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Insert an open assignment
pub async fn insert_assignment(
    conn: &mut PgConnection,
    academy_id: Uuid,
    agent_id: Uuid,
    rate: Decimal,
    valid_from: NaiveDate,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO billing_academy_sales_agents
            (id, academy_id, sales_agent_id, commission_rate, valid_from, valid_to)
        VALUES ($1, $2, $3, $4, $5, NULL)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(academy_id)
    .bind(agent_id)
    .bind(rate)
    .bind(valid_from)
    .fetch_one(conn)
    .await
}

/// Count the active students of an academy
pub async fn count_active_students(pool: &PgPool, academy_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM students
        WHERE academy_id = $1
          AND is_active = TRUE
        "#,
    )
    .bind(academy_id)
    .fetch_one(pool)
    .await
}

/// Invoice of an academy for a period
pub async fn find_invoice(
    pool: &PgPool,
    academy_id: Uuid,
    year: i32,
    month: i32,
) -> Result<Option<Invoice>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM billing_invoices
        WHERE academy_id = $1 AND period_year = $2 AND period_month = $3
        "#,
        INVOICE_COLUMNS
    );
    sqlx::query_as::<_, Invoice>(&sql)
        .bind(academy_id)
        .bind(year)
        .bind(month)
        .fetch_optional(pool)
        .await
}

/// Values of a new invoice
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub academy_id: Uuid,
    pub period_year: i32,
    pub period_month: i32,
    pub count_cutoff_date: NaiveDate,
    pub active_students_count: i32,
    pub price_per_student: Decimal,
    pub currency: String,
    pub total_amount: Decimal,
}

/// Insert an invoice unless one exists for the period.
///
/// Returns `None` when another request created it first.
pub async fn insert_invoice(
    pool: &PgPool,
    invoice: &NewInvoice,
) -> Result<Option<Invoice>, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO billing_invoices
            (id, academy_id, period_year, period_month, count_cutoff_date,
             active_students_count, price_per_student, currency, total_amount, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'issued')
        ON CONFLICT (academy_id, period_year, period_month) DO NOTHING
        RETURNING {}
        "#,
        INVOICE_COLUMNS
    );
    sqlx::query_as::<_, Invoice>(&sql)
        .bind(Uuid::new_v4())
        .bind(invoice.academy_id)
        .bind(invoice.period_year)
        .bind(invoice.period_month)
        .bind(invoice.count_cutoff_date)
        .bind(invoice.active_students_count)
        .bind(invoice.price_per_student)
        .bind(&invoice.currency)
        .bind(invoice.total_amount)
        .fetch_optional(pool)
        .await
}

/// Lock an invoice for payment registration
pub async fn lock_invoice(
    conn: &mut PgConnection,
    invoice_id: Uuid,
) -> Result<Option<Invoice>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM billing_invoices WHERE id = $1 FOR UPDATE",
        INVOICE_COLUMNS
    );
    sqlx::query_as::<_, Invoice>(&sql)
        .bind(invoice_id)
        .fetch_optional(conn)
        .await
}

/// Values of a new invoice payment
#[derive(Debug, Clone)]
pub struct NewBillingPayment {
    pub paid_at: DateTime<Utc>,
    pub amount: Decimal,
    pub method: String,
    pub reference: Option<String>,
    pub note: Option<String>,
}

/// Insert a payment for an invoice
pub async fn insert_billing_payment(
    conn: &mut PgConnection,
    invoice: &Invoice,
    payment: &NewBillingPayment,
) -> Result<BillingPayment, sqlx::Error> {
    sqlx::query_as::<_, BillingPayment>(
        r#"
        INSERT INTO billing_payments
            (id, invoice_id, academy_id, paid_at, amount, currency, method, reference, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, invoice_id, academy_id, paid_at, amount, currency, method, reference, note
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(invoice.id)
    .bind(invoice.academy_id)
    .bind(payment.paid_at)
    .bind(payment.amount)
    .bind(&invoice.currency)
    .bind(&payment.method)
    .bind(&payment.reference)
    .bind(&payment.note)
    .fetch_one(conn)
    .await
}

/// Total collected on an invoice
pub async fn sum_invoice_payments(
    conn: &mut PgConnection,
    invoice_id: Uuid,
) -> Result<Decimal, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM billing_payments WHERE invoice_id = $1",
    )
    .bind(invoice_id)
    .fetch_one(conn)
    .await
}

/// Set an invoice status
pub async fn update_invoice_status(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE billing_invoices SET status = $2 WHERE id = $1")
        .bind(invoice_id)
        .bind(status)
        .execute(conn)
        .await?;

    Ok(())
}

/// Add a payment's base and commission to the agent's monthly total.
///
/// A row already marked paid goes back to pending.
pub async fn accrue_commission(
    conn: &mut PgConnection,
    agent_id: Uuid,
    year: i32,
    month: i32,
    base_delta: Decimal,
    rate: Decimal,
    commission_delta: Decimal,
) -> Result<SalesCommission, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO billing_sales_commissions
            (id, sales_agent_id, period_year, period_month, base_paid_amount,
             commission_rate, commission_amount, status, paid_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL)
        ON CONFLICT (sales_agent_id, period_year, period_month) DO UPDATE
        SET base_paid_amount = billing_sales_commissions.base_paid_amount + EXCLUDED.base_paid_amount,
            commission_amount = billing_sales_commissions.commission_amount + EXCLUDED.commission_amount,
            commission_rate = EXCLUDED.commission_rate,
            status = EXCLUDED.status,
            paid_at = NULL
        RETURNING {}
        "#,
        COMMISSION_COLUMNS
    );
    sqlx::query_as::<_, SalesCommission>(&sql)
        .bind(Uuid::new_v4())
        .bind(agent_id)
        .bind(year)
        .bind(month)
        .bind(base_delta)
        .bind(rate)
        .bind(commission_delta)
        .bind(CommissionStatus::Pending.as_str())
        .fetch_one(conn)
        .await
}

/// Payments whose paid_at falls in `[from, to)`: (academy_id, paid_at, amount)
pub async fn list_payments_between(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<(Uuid, DateTime<Utc>, Decimal)>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT academy_id, paid_at, amount
        FROM billing_payments
        WHERE paid_at >= $1
          AND paid_at < $2
        ORDER BY paid_at
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Persisted commission totals for a period
pub async fn list_commissions(
    pool: &PgPool,
    year: i32,
    month: i32,
) -> Result<Vec<SalesCommissionRow>, sqlx::Error> {
    sqlx::query_as::<_, SalesCommissionRow>(
        r#"
        SELECT c.id,
               c.sales_agent_id,
               ag.name AS agent_name,
               c.period_year,
               c.period_month,
               c.base_paid_amount,
               c.commission_rate,
               c.commission_amount,
               c.status,
               c.paid_at
        FROM billing_sales_commissions c
        JOIN billing_sales_agents ag ON ag.id = c.sales_agent_id
        WHERE c.period_year = $1
          AND c.period_month = $2
        ORDER BY ag.name
        "#,
    )
    .bind(year)
    .bind(month)
    .fetch_all(pool)
    .await
}

/// Mark a commission paid
pub async fn mark_commission_paid(
    pool: &PgPool,
    commission_id: Uuid,
    paid_at: DateTime<Utc>,
) -> Result<Option<SalesCommission>, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE billing_sales_commissions
        SET status = $3, paid_at = $2
        WHERE id = $1
        RETURNING {}
        "#,
        COMMISSION_COLUMNS
    );
    sqlx::query_as::<_, SalesCommission>(&sql)
        .bind(commission_id)
        .bind(paid_at)
        .bind(CommissionStatus::Paid.as_str())
        .fetch_optional(pool)
        .await
}
