//! Database queries for plans and payments.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::models::{Payment, Plan, StudentPlan, StudentPlanSummaryRow};
use super::services::{NewPayment, PlanTerms};

const STUDENT_PLAN_COLUMNS: &str = r#"
    id, academy_id, student_id, plan_id, remaining_classes, purchased_at,
    base_price, discount_type, discount_value, final_price
"#;

/// Lock a student row of the academy, serialising plan assignment per student
pub async fn lock_student(
    conn: &mut PgConnection,
    student_id: Uuid,
    academy_id: Uuid,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT full_name
        FROM students
        WHERE id = $1 AND academy_id = $2
        FOR UPDATE
        "#,
    )
    .bind(student_id)
    .bind(academy_id)
    .fetch_optional(conn)
    .await
}

/// Get an academy plan by id
pub async fn get_plan(
    conn: &mut PgConnection,
    plan_id: Uuid,
    academy_id: Uuid,
) -> Result<Option<Plan>, sqlx::Error> {
    sqlx::query_as::<_, Plan>(
        r#"
        SELECT id, academy_id, name, classes_included, price_cents, currency
        FROM plans
        WHERE id = $1 AND academy_id = $2
        "#,
    )
    .bind(plan_id)
    .bind(academy_id)
    .fetch_optional(conn)
    .await
}

/// (remaining_classes, usage count) of every plan of a student
pub async fn list_plan_consumption(
    conn: &mut PgConnection,
    student_id: Uuid,
) -> Result<Vec<(i32, i64)>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT sp.remaining_classes,
               (SELECT COUNT(*) FROM plan_usages pu
                 WHERE pu.student_plan_id = sp.id
                   AND pu.student_id = sp.student_id) AS used
        FROM student_plans sp
        WHERE sp.student_id = $1
        "#,
    )
    .bind(student_id)
    .fetch_all(conn)
    .await
}

/// Insert a student plan
pub async fn insert_student_plan(
    conn: &mut PgConnection,
    academy_id: Uuid,
    student_id: Uuid,
    plan_id: Uuid,
    terms: &PlanTerms,
) -> Result<StudentPlan, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO student_plans
            (id, academy_id, student_id, plan_id, remaining_classes,
             base_price, discount_type, discount_value, final_price)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        STUDENT_PLAN_COLUMNS
    );

    sqlx::query_as::<_, StudentPlan>(&sql)
        .bind(Uuid::new_v4())
        .bind(academy_id)
        .bind(student_id)
        .bind(plan_id)
        .bind(terms.remaining_classes)
        .bind(terms.base_price)
        .bind(terms.discount_type.as_str())
        .bind(terms.discount_value)
        .bind(terms.final_price)
        .fetch_one(conn)
        .await
}

/// Plans of a student with usage and paid totals, newest first
pub async fn list_student_plan_summaries(
    pool: &PgPool,
    student_id: Uuid,
) -> Result<Vec<StudentPlanSummaryRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentPlanSummaryRow>(
        r#"
        SELECT sp.id,
               sp.plan_id,
               p.name AS plan_name,
               sp.remaining_classes,
               sp.purchased_at,
               sp.base_price,
               sp.discount_type,
               sp.discount_value,
               sp.final_price,
               (SELECT COUNT(*) FROM plan_usages pu
                 WHERE pu.student_plan_id = sp.id) AS used,
               (SELECT COALESCE(SUM(pay.amount), 0) FROM payments pay
                 WHERE pay.student_plan_id = sp.id
                   AND pay.status = 'pagado') AS paid
        FROM student_plans sp
        LEFT JOIN plans p ON p.id = sp.plan_id
        WHERE sp.student_id = $1
        ORDER BY sp.purchased_at DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
}

/// True if the student exists
pub async fn student_exists(pool: &PgPool, student_id: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM students WHERE id = $1)")
        .bind(student_id)
        .fetch_one(pool)
        .await
}

/// Lock a plan row for deletion
pub async fn lock_plan(conn: &mut PgConnection, plan_id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM plans WHERE id = $1 FOR UPDATE")
        .bind(plan_id)
        .fetch_optional(conn)
        .await
}

/// Count student plans of a plan that still have classes
pub async fn count_plans_with_remaining(
    conn: &mut PgConnection,
    plan_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM student_plans
        WHERE plan_id = $1
          AND remaining_classes > 0
        "#,
    )
    .bind(plan_id)
    .fetch_one(conn)
    .await
}

/// Delete a plan
pub async fn delete_plan(conn: &mut PgConnection, plan_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM plans WHERE id = $1")
        .bind(plan_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Lock a student plan before checking its payment balance
pub async fn lock_student_plan(
    conn: &mut PgConnection,
    student_plan_id: Uuid,
) -> Result<Option<StudentPlan>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM student_plans WHERE id = $1 FOR UPDATE",
        STUDENT_PLAN_COLUMNS
    );
    sqlx::query_as::<_, StudentPlan>(&sql)
        .bind(student_plan_id)
        .fetch_optional(conn)
        .await
}

/// Sum of `pagado` payments of a student plan
pub async fn sum_paid(conn: &mut PgConnection, student_plan_id: Uuid) -> Result<Decimal, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM payments
        WHERE student_plan_id = $1
          AND status = 'pagado'
        "#,
    )
    .bind(student_plan_id)
    .fetch_one(conn)
    .await
}

/// Insert a payment
pub async fn insert_payment(
    conn: &mut PgConnection,
    payment: &NewPayment,
) -> Result<Payment, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments
            (id, student_id, student_plan_id, amount, currency, payment_date, method, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, student_id, student_plan_id, amount, currency, payment_date, method, status, notes
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payment.student_id)
    .bind(payment.student_plan_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(payment.payment_date)
    .bind(&payment.method)
    .bind(payment.status.as_str())
    .bind(&payment.notes)
    .fetch_one(conn)
    .await
}
