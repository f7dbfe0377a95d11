//! Database queries for attendance.

use std::collections::HashMap;

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::calculators::PlanBalance;
use super::models::{LockedPlanRow, RosterRow, UsageRecord};

const ROSTER_SQL: &str = r#"
    SELECT b.student_id,
           s.full_name AS student_name,
           COALESCE(a.present, FALSE) AS present,
           (a.id IS NOT NULL) AS recorded
    FROM bookings b
    JOIN students s ON s.id = b.student_id
    LEFT JOIN attendance a
           ON a.class_id = b.class_id
          AND a.student_id = b.student_id
    WHERE b.class_id = $1
    ORDER BY s.full_name, b.student_id
"#;

/// Roster of a session for display
pub async fn list_roster(pool: &PgPool, class_id: Uuid) -> Result<Vec<RosterRow>, sqlx::Error> {
    sqlx::query_as::<_, RosterRow>(ROSTER_SQL)
        .bind(class_id)
        .fetch_all(pool)
        .await
}

/// Roster of a session inside a save transaction
pub async fn list_roster_tx(
    conn: &mut PgConnection,
    class_id: Uuid,
) -> Result<Vec<RosterRow>, sqlx::Error> {
    sqlx::query_as::<_, RosterRow>(ROSTER_SQL)
        .bind(class_id)
        .fetch_all(conn)
        .await
}

/// Lock the students' plans with remaining classes, oldest purchase first
pub async fn lock_student_plans(
    conn: &mut PgConnection,
    student_ids: &[Uuid],
) -> Result<Vec<LockedPlanRow>, sqlx::Error> {
    if student_ids.is_empty() {
        return Ok(vec![]);
    }

    sqlx::query_as::<_, LockedPlanRow>(
        r#"
        SELECT id, student_id, remaining_classes, purchased_at
        FROM student_plans
        WHERE student_id = ANY($1)
          AND remaining_classes > 0
        ORDER BY purchased_at, id
        FOR UPDATE
        "#,
    )
    .bind(student_ids)
    .fetch_all(conn)
    .await
}

/// Usage count per student plan.
///
/// Run after `lock_student_plans` so the count sees every usage committed
/// by whoever held the lock before.
pub async fn count_plan_usages(
    conn: &mut PgConnection,
    plan_ids: &[Uuid],
) -> Result<HashMap<Uuid, i64>, sqlx::Error> {
    if plan_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT student_plan_id, COUNT(*)
        FROM plan_usages
        WHERE student_plan_id = ANY($1)
        GROUP BY student_plan_id
        "#,
    )
    .bind(plan_ids)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Locked plans of the students with their current consumption
pub async fn lock_plan_balances(
    conn: &mut PgConnection,
    student_ids: &[Uuid],
) -> Result<Vec<PlanBalance>, sqlx::Error> {
    let plans = lock_student_plans(&mut *conn, student_ids).await?;
    let plan_ids: Vec<Uuid> = plans.iter().map(|p| p.id).collect();
    let used = count_plan_usages(&mut *conn, &plan_ids).await?;

    Ok(plans
        .into_iter()
        .map(|plan| {
            let count = used.get(&plan.id).copied().unwrap_or(0);
            plan.with_usage(count)
        })
        .collect())
}

/// Plan consumed by each student for this class (student -> student plan)
pub async fn class_usages(
    conn: &mut PgConnection,
    class_id: Uuid,
) -> Result<HashMap<Uuid, Uuid>, sqlx::Error> {
    let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
        r#"
        SELECT student_id, student_plan_id
        FROM plan_usages
        WHERE class_id = $1
        "#,
    )
    .bind(class_id)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Overwrite the attendance snapshot of a class
pub async fn replace_attendance(
    conn: &mut PgConnection,
    class_id: Uuid,
    marks: &[(Uuid, bool)],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM attendance WHERE class_id = $1")
        .bind(class_id)
        .execute(&mut *conn)
        .await?;

    for (student_id, present) in marks {
        sqlx::query(
            r#"
            INSERT INTO attendance (id, class_id, student_id, present)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(class_id)
        .bind(student_id)
        .bind(present)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Record plan consumption for present students
pub async fn upsert_usages(
    conn: &mut PgConnection,
    class_id: Uuid,
    usages: &[UsageRecord],
) -> Result<(), sqlx::Error> {
    for usage in usages {
        sqlx::query(
            r#"
            INSERT INTO plan_usages (id, student_plan_id, class_id, student_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, class_id)
            DO UPDATE SET student_plan_id = EXCLUDED.student_plan_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(usage.student_plan_id)
        .bind(class_id)
        .bind(usage.student_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Return the credits of students marked absent
pub async fn delete_usages(
    conn: &mut PgConnection,
    class_id: Uuid,
    student_ids: &[Uuid],
) -> Result<u64, sqlx::Error> {
    if student_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        DELETE FROM plan_usages
        WHERE class_id = $1
          AND student_id = ANY($2)
        "#,
    )
    .bind(class_id)
    .bind(student_ids)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}
