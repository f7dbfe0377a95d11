mod common;

use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

use agendo_api::billing::calculators::InvoiceStatus;
use agendo_api::billing::requests::{AssignmentRequest, InvoicePaymentRequest, RateRequest};
use agendo_api::billing::services::{
    assign_sales_agent, issue_invoice, live_commissions, mark_commission_paid, persisted_commissions,
    register_invoice_payment, set_academy_rate, validate_invoice_payment,
};
use agendo_api::billing::BillingError;
use agendo_api::cache::AppCache;

fn offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).unwrap()
}

async fn seed_agent(pool: &PgPool, academy: Uuid, rate: rust_decimal::Decimal) -> Uuid {
    let agent = Uuid::new_v4();
    sqlx::query("INSERT INTO billing_sales_agents (id, name) VALUES ($1, $2)")
        .bind(agent)
        .bind(format!("Vendedor {}", &agent.to_string()[..8]))
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        r#"
        INSERT INTO billing_academy_sales_agents
            (id, academy_id, sales_agent_id, commission_rate, valid_from, valid_to)
        VALUES ($1, $2, $3, $4, '2024-06-01', '2024-07-01')
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(academy)
    .bind(agent)
    .bind(rate)
    .execute(pool)
    .await
    .unwrap();
    agent
}

#[tokio::test]
async fn test_invoice_payment_accrues_commission() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let cache = AppCache::new();
    let academy = common::seed_academy(&pool).await;
    common::seed_student(&pool, academy, "Ana Ruiz").await;
    common::seed_student(&pool, academy, "Luis Gómez").await;
    let agent = seed_agent(&pool, academy, dec!(0.20)).await;

    let missing = issue_invoice(&pool, &cache, academy, 2024, 6, None).await;
    assert!(matches!(missing, Err(BillingError::MissingRate)));

    set_academy_rate(
        &pool,
        &cache,
        academy,
        &RateRequest {
            price_per_active_student: Some(dec!(50000)),
            valid_from: NaiveDate::from_ymd_opt(2024, 1, 1),
            currency: None,
        },
        "PYG",
        None,
    )
    .await
    .unwrap();

    let issued = issue_invoice(&pool, &cache, academy, 2024, 6, None).await.unwrap();
    assert!(issued.created);
    assert_eq!(issued.invoice.active_students_count, 2);
    assert_eq!(issued.invoice.total_amount, dec!(100000));
    assert_eq!(
        issued.invoice.count_cutoff_date,
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    );

    let again = issue_invoice(&pool, &cache, academy, 2024, 6, None).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.invoice.id, issued.invoice.id);

    let request = InvoicePaymentRequest {
        amount: Some(dec!(100000)),
        method: Some("transferencia".to_string()),
        paid_at: Some(Utc.with_ymd_and_hms(2024, 6, 15, 15, 0, 0).unwrap()),
        ..Default::default()
    };
    let payment = validate_invoice_payment(&request, Utc::now()).unwrap();
    let paid = register_invoice_payment(&pool, &cache, offset(), issued.invoice.id, payment, None)
        .await
        .unwrap();

    assert_eq!(paid.invoice_status, InvoiceStatus::Paid);
    assert_eq!(paid.commissions.len(), 1);
    assert_eq!(paid.commissions[0].sales_agent_id, agent);
    assert_eq!(paid.commissions[0].commission_amount, dec!(20000));
    assert_eq!(paid.commissions[0].period_month, 6);

    let live = live_commissions(&pool, &cache, offset(), 2024, 6).await.unwrap();
    let row = live
        .totals
        .academies
        .iter()
        .find(|a| a.academy_id == academy)
        .unwrap();
    assert_eq!(row.commission_amount, dec!(20000));

    let persisted = persisted_commissions(&pool, 2024, 6).await.unwrap();
    let mine = persisted
        .commissions
        .iter()
        .find(|c| c.sales_agent_id == agent)
        .unwrap();
    assert_eq!(mine.base_paid_amount, dec!(100000));
    assert_eq!(mine.status, "pending");

    let settled = mark_commission_paid(&pool, mine.id, Utc::now(), None)
        .await
        .unwrap();
    assert_eq!(settled.status, "paid");
    assert!(settled.paid_at.is_some());
}

#[tokio::test]
async fn test_payment_outside_assignment_earns_nothing() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let cache = AppCache::new();
    let academy = common::seed_academy(&pool).await;
    common::seed_student(&pool, academy, "Ana Ruiz").await;
    seed_agent(&pool, academy, dec!(0.10)).await;

    set_academy_rate(
        &pool,
        &cache,
        academy,
        &RateRequest {
            price_per_active_student: Some(dec!(80000)),
            valid_from: NaiveDate::from_ymd_opt(2024, 1, 1),
            currency: None,
        },
        "PYG",
        None,
    )
    .await
    .unwrap();
    let issued = issue_invoice(&pool, &cache, academy, 2024, 7, None).await.unwrap();

    // 2024-07-01 local: the assignment's valid_to is exclusive
    let request = InvoicePaymentRequest {
        amount: Some(dec!(30000)),
        method: Some("efectivo".to_string()),
        paid_at: Some(Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()),
        ..Default::default()
    };
    let payment = validate_invoice_payment(&request, Utc::now()).unwrap();
    let paid = register_invoice_payment(&pool, &cache, offset(), issued.invoice.id, payment, None)
        .await
        .unwrap();

    assert_eq!(paid.invoice_status, InvoiceStatus::PartiallyPaid);
    assert!(paid.commissions.is_empty());
}

#[tokio::test]
async fn test_backdated_intervals_are_refused() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let cache = AppCache::new();
    let academy = common::seed_academy(&pool).await;
    let day = |m, d| NaiveDate::from_ymd_opt(2024, m, d);
    let rate_from = |valid_from| RateRequest {
        price_per_active_student: Some(dec!(50000)),
        valid_from,
        currency: None,
    };

    set_academy_rate(&pool, &cache, academy, &rate_from(day(6, 1)), "PYG", None)
        .await
        .unwrap();
    let err = set_academy_rate(&pool, &cache, academy, &rate_from(day(5, 1)), "PYG", None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::ValidFromBeforeOpen(_)));

    set_academy_rate(&pool, &cache, academy, &rate_from(day(7, 1)), "PYG", None)
        .await
        .unwrap();
    let intervals: Vec<(NaiveDate, Option<NaiveDate>)> = sqlx::query_as(
        "SELECT valid_from, valid_to FROM billing_academy_rates WHERE academy_id = $1 ORDER BY valid_from",
    )
    .bind(academy)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(
        intervals,
        vec![(day(6, 1).unwrap(), day(7, 1)), (day(7, 1).unwrap(), None)]
    );

    let agent = Uuid::new_v4();
    sqlx::query("INSERT INTO billing_sales_agents (id, name) VALUES ($1, 'Vendedor')")
        .bind(agent)
        .execute(&pool)
        .await
        .unwrap();
    let assign_from = |valid_from| AssignmentRequest {
        academy_id: academy,
        sales_agent_id: agent,
        commission_rate: Some(dec!(0.10)),
        valid_from,
    };

    assign_sales_agent(&pool, &cache, &assign_from(day(6, 1)), None)
        .await
        .unwrap();
    let err = assign_sales_agent(&pool, &cache, &assign_from(day(3, 1)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::ValidFromBeforeOpen(_)));

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM billing_academy_sales_agents WHERE sales_agent_id = $1 AND valid_to IS NULL",
    )
    .bind(agent)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(open, 1);
}
