//! Database queries for scheduling.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::calculators::ClassShape;
use super::models::{ClassSession, SessionRecord};

/// Name of the unique index guarding (court_id, date)
pub const COURT_SLOT_INDEX: &str = "class_sessions_court_date_key";

const SESSION_COLUMNS: &str = r#"
    id, academy_id, date, type, capacity, coach_id, court_id,
    price_cents, currency, notes
"#;

/// Get a class session by id
pub async fn get_class_session(
    conn: &mut PgConnection,
    class_id: Uuid,
) -> Result<Option<ClassSession>, sqlx::Error> {
    let sql = format!("SELECT {} FROM class_sessions WHERE id = $1", SESSION_COLUMNS);
    sqlx::query_as::<_, ClassSession>(&sql)
        .bind(class_id)
        .fetch_optional(conn)
        .await
}

/// Start instants of a court's sessions within `[from, to)`
pub async fn list_court_session_starts(
    pool: &PgPool,
    court_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    exclude_class_id: Option<Uuid>,
) -> Result<Vec<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT date
        FROM class_sessions
        WHERE court_id = $1
          AND date >= $2
          AND date < $3
          AND ($4::uuid IS NULL OR id <> $4)
        ORDER BY date
        "#,
    )
    .bind(court_id)
    .bind(from)
    .bind(to)
    .bind(exclude_class_id)
    .fetch_all(pool)
    .await
}

/// Find a session occupying the court at an exact start instant
pub async fn find_court_session_at(
    conn: &mut PgConnection,
    court_id: Uuid,
    date: DateTime<Utc>,
    exclude_class_id: Option<Uuid>,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT id
        FROM class_sessions
        WHERE court_id = $1
          AND date = $2
          AND ($3::uuid IS NULL OR id <> $3)
        LIMIT 1
        "#,
    )
    .bind(court_id)
    .bind(date)
    .bind(exclude_class_id)
    .fetch_optional(conn)
    .await
}

/// Find another session of the coach at the same start instant
pub async fn find_coach_session_at(
    conn: &mut PgConnection,
    coach_id: Uuid,
    date: DateTime<Utc>,
    exclude_class_id: Option<Uuid>,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT id
        FROM class_sessions
        WHERE coach_id = $1
          AND date = $2
          AND ($3::uuid IS NULL OR id <> $3)
        LIMIT 1
        "#,
    )
    .bind(coach_id)
    .bind(date)
    .bind(exclude_class_id)
    .fetch_optional(conn)
    .await
}

/// Academy owning a court
pub async fn get_court_academy(
    conn: &mut PgConnection,
    court_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar("SELECT academy_id FROM courts WHERE id = $1")
        .bind(court_id)
        .fetch_optional(conn)
        .await
}

/// Coach display name, if the coach belongs to the academy
pub async fn get_coach_name(
    conn: &mut PgConnection,
    coach_id: Uuid,
    academy_id: Uuid,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT full_name FROM coaches WHERE id = $1 AND academy_id = $2")
        .bind(coach_id)
        .bind(academy_id)
        .fetch_optional(conn)
        .await
}

/// Count how many of the given students belong to the academy
pub async fn count_academy_students(
    conn: &mut PgConnection,
    academy_id: Uuid,
    student_ids: &[Uuid],
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM students
        WHERE academy_id = $1
          AND id = ANY($2)
        "#,
    )
    .bind(academy_id)
    .bind(student_ids)
    .fetch_one(conn)
    .await
}

/// Insert a class session
pub async fn insert_class_session(
    conn: &mut PgConnection,
    record: &SessionRecord,
) -> Result<ClassSession, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO class_sessions
            (id, academy_id, date, type, capacity, coach_id, court_id, price_cents, currency, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        SESSION_COLUMNS
    );

    sqlx::query_as::<_, ClassSession>(&sql)
        .bind(Uuid::new_v4())
        .bind(record.academy_id)
        .bind(record.date)
        .bind(record.class_type.as_str())
        .bind(record.capacity)
        .bind(record.coach_id)
        .bind(record.court_id)
        .bind(record.price_cents)
        .bind(&record.currency)
        .bind(&record.notes)
        .fetch_one(conn)
        .await
}

/// Overwrite the editable fields of a session
pub async fn update_class_session(
    conn: &mut PgConnection,
    class_id: Uuid,
    record: &SessionRecord,
) -> Result<ClassSession, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE class_sessions
        SET date = $2,
            type = $3,
            capacity = $4,
            coach_id = $5,
            court_id = $6,
            price_cents = $7,
            currency = $8,
            notes = $9
        WHERE id = $1
        RETURNING {}
        "#,
        SESSION_COLUMNS
    );

    sqlx::query_as::<_, ClassSession>(&sql)
        .bind(class_id)
        .bind(record.date)
        .bind(record.class_type.as_str())
        .bind(record.capacity)
        .bind(record.coach_id)
        .bind(record.court_id)
        .bind(record.price_cents)
        .bind(&record.currency)
        .bind(&record.notes)
        .fetch_one(conn)
        .await
}

/// Students booked on a session
pub async fn list_booked_students(
    conn: &mut PgConnection,
    class_id: Uuid,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT student_id
        FROM bookings
        WHERE class_id = $1
        ORDER BY student_id
        "#,
    )
    .bind(class_id)
    .fetch_all(conn)
    .await
}

/// Insert one booking per student
pub async fn insert_bookings(
    conn: &mut PgConnection,
    class_id: Uuid,
    student_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    for student_id in student_ids {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, class_id, student_id, status)
            VALUES ($1, $2, $3, 'reserved')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(class_id)
        .bind(student_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Remove the bookings, attendance and plan usages of students leaving a session.
///
/// Returns the number of plan usages removed.
pub async fn remove_participants(
    conn: &mut PgConnection,
    class_id: Uuid,
    student_ids: &[Uuid],
) -> Result<u64, sqlx::Error> {
    if student_ids.is_empty() {
        return Ok(0);
    }

    let mut returned = 0;
    for table in ["plan_usages", "attendance", "bookings"] {
        let sql = format!(
            "DELETE FROM {} WHERE class_id = $1 AND student_id = ANY($2)",
            table
        );
        let result = sqlx::query(&sql)
            .bind(class_id)
            .bind(student_ids)
            .execute(&mut *conn)
            .await?;
        if table == "plan_usages" {
            returned = result.rows_affected();
        }
    }

    Ok(returned)
}

/// Names of the given students already booked on a session starting at `date`
pub async fn find_busy_students(
    conn: &mut PgConnection,
    student_ids: &[Uuid],
    date: DateTime<Utc>,
    exclude_class_id: Option<Uuid>,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT s.full_name
        FROM bookings b
        JOIN class_sessions cs ON cs.id = b.class_id
        JOIN students s ON s.id = b.student_id
        WHERE b.student_id = ANY($1)
          AND cs.date = $2
          AND ($3::uuid IS NULL OR cs.id <> $3)
        ORDER BY s.full_name
        "#,
    )
    .bind(student_ids)
    .bind(date)
    .bind(exclude_class_id)
    .fetch_all(conn)
    .await
}

/// Bookings per student on sessions starting after `now`
pub async fn count_future_bookings(
    conn: &mut PgConnection,
    student_ids: &[Uuid],
    now: DateTime<Utc>,
) -> Result<HashMap<Uuid, i64>, sqlx::Error> {
    let rows: Vec<(Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT b.student_id, COUNT(*)
        FROM bookings b
        JOIN class_sessions cs ON cs.id = b.class_id
        WHERE b.student_id = ANY($1)
          AND cs.date > $2
        GROUP BY b.student_id
        "#,
    )
    .bind(student_ids)
    .bind(now)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Display names of students
pub async fn student_names(
    conn: &mut PgConnection,
    student_ids: &[Uuid],
) -> Result<HashMap<Uuid, String>, sqlx::Error> {
    let rows: Vec<(Uuid, String)> =
        sqlx::query_as("SELECT id, full_name FROM students WHERE id = ANY($1)")
            .bind(student_ids)
            .fetch_all(conn)
            .await?;

    Ok(rows.into_iter().collect())
}

/// Rewrite type and capacity after the participant list changed
pub async fn update_class_shape(
    conn: &mut PgConnection,
    class_id: Uuid,
    shape: ClassShape,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE class_sessions SET type = $2, capacity = $3 WHERE id = $1")
        .bind(class_id)
        .bind(shape.class_type.as_str())
        .bind(shape.capacity)
        .execute(conn)
        .await?;

    Ok(())
}

/// Delete the plan usages of a session (returns the credits)
pub async fn delete_class_plan_usages(
    conn: &mut PgConnection,
    class_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM plan_usages WHERE class_id = $1")
        .bind(class_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Delete a session; bookings and attendance cascade
pub async fn delete_class_session(
    conn: &mut PgConnection,
    class_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM class_sessions WHERE id = $1")
        .bind(class_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}
