mod common;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use agendo_api::plans::requests::{AssignPlanRequest, PaymentRequest};
use agendo_api::plans::services::{assign_plan, delete_plan, register_payment, validate_payment};
use agendo_api::plans::PlanError;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

#[tokio::test]
async fn test_second_plan_rejected_while_first_has_classes() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let academy = common::seed_academy(&pool).await;
    let student = common::seed_student(&pool, academy, "Ana Ruiz").await;
    let first = common::seed_plan(&pool, academy, 5, 250000).await;
    let second = common::seed_plan(&pool, academy, 8, 400000).await;

    let assigned = assign_plan(
        &pool,
        academy,
        &AssignPlanRequest {
            student_id: Some(student),
            plan_id: Some(first),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(assigned.remaining_classes, 5);
    assert_eq!(assigned.final_price, Some(dec!(250000)));

    let err = assign_plan(
        &pool,
        academy,
        &AssignPlanRequest {
            student_id: Some(student),
            plan_id: Some(second),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PlanError::ActivePlan));
    assert!(err.to_string().contains("ya tiene un plan vigente"));

    let in_use = delete_plan(&pool, first, None).await.unwrap_err();
    assert!(matches!(in_use, PlanError::PlanInUse));
    delete_plan(&pool, second, None).await.unwrap();
}

#[tokio::test]
async fn test_payments_capped_at_plan_price() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let academy = common::seed_academy(&pool).await;
    let student = common::seed_student(&pool, academy, "Luis Gómez").await;
    let plan = common::seed_plan(&pool, academy, 4, 100000).await;

    let student_plan = assign_plan(
        &pool,
        academy,
        &AssignPlanRequest {
            student_id: Some(student),
            plan_id: Some(plan),
            discount_type: Some("amount".to_string()),
            discount_value: Some(dec!(20000)),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(student_plan.final_price, Some(dec!(80000)));

    let payment = |amount| PaymentRequest {
        student_id: Some(student),
        student_plan_id: Some(student_plan.id),
        amount: Some(amount),
        ..Default::default()
    };

    let first = validate_payment(&payment(dec!(50000)), today(), "PYG").unwrap();
    register_payment(&pool, first, None).await.unwrap();

    let over = validate_payment(&payment(dec!(40000)), today(), "PYG").unwrap();
    let err = register_payment(&pool, over, None).await.unwrap_err();
    assert!(matches!(err, PlanError::Overpayment { .. }));
    assert_eq!(
        err.to_string(),
        "El total pagado (90000 PYG) no puede superar el valor del plan (80000 PYG). Ajusta el monto del pago."
    );

    let rest = validate_payment(&payment(dec!(30000)), today(), "PYG").unwrap();
    let inserted = register_payment(&pool, rest, None).await.unwrap();
    assert_eq!(inserted.amount, dec!(30000));
}
