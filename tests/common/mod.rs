//! Shared setup for database-backed tests.
//!
//! Tests are skipped when DATABASE_URL is not set.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect and migrate, or None when no database is configured
pub async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    agendo_api::db::run_migrations(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

pub async fn seed_academy(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO academies (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(format!("Academia {}", &id.to_string()[..8]))
        .execute(pool)
        .await
        .expect("insert academy");
    id
}

pub async fn seed_court(pool: &PgPool, academy_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO courts (id, academy_id, name) VALUES ($1, $2, 'Cancha 1')")
        .bind(id)
        .bind(academy_id)
        .execute(pool)
        .await
        .expect("insert court");
    id
}

pub async fn seed_coach(pool: &PgPool, academy_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO coaches (id, academy_id, full_name) VALUES ($1, $2, 'Carla Benítez')")
        .bind(id)
        .bind(academy_id)
        .execute(pool)
        .await
        .expect("insert coach");
    id
}

pub async fn seed_student(pool: &PgPool, academy_id: Uuid, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO students (id, academy_id, full_name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(academy_id)
        .bind(name)
        .execute(pool)
        .await
        .expect("insert student");
    id
}

/// Session with bookings for `students`, inserted directly
pub async fn seed_class(
    pool: &PgPool,
    academy_id: Uuid,
    court_id: Uuid,
    coach_id: Uuid,
    date: DateTime<Utc>,
    students: &[Uuid],
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO class_sessions (id, academy_id, date, type, capacity, coach_id, court_id)
        VALUES ($1, $2, $3, 'individual', 1, $4, $5)
        "#,
    )
    .bind(id)
    .bind(academy_id)
    .bind(date)
    .bind(coach_id)
    .bind(court_id)
    .execute(pool)
    .await
    .expect("insert class session");

    for student_id in students {
        sqlx::query("INSERT INTO bookings (id, class_id, student_id) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(student_id)
            .execute(pool)
            .await
            .expect("insert booking");
    }
    id
}

pub async fn seed_plan(pool: &PgPool, academy_id: Uuid, classes: i32, price: i64) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO plans (id, academy_id, name, classes_included, price_cents)
        VALUES ($1, $2, 'Plan mensual', $3, $4)
        "#,
    )
    .bind(id)
    .bind(academy_id)
    .bind(classes)
    .bind(price)
    .execute(pool)
    .await
    .expect("insert plan");
    id
}

/// Student plan with `remaining` classes, purchased now
pub async fn seed_student_plan(
    pool: &PgPool,
    academy_id: Uuid,
    student_id: Uuid,
    remaining: i32,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO student_plans (id, academy_id, student_id, remaining_classes, base_price)
        VALUES ($1, $2, $3, $4, 100000)
        "#,
    )
    .bind(id)
    .bind(academy_id)
    .bind(student_id)
    .bind(remaining)
    .execute(pool)
    .await
    .expect("insert student plan");
    id
}

pub async fn seed_usage(pool: &PgPool, student_plan_id: Uuid, class_id: Uuid, student_id: Uuid) {
    sqlx::query(
        "INSERT INTO plan_usages (id, student_plan_id, class_id, student_id) VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(student_plan_id)
    .bind(class_id)
    .bind(student_id)
    .execute(pool)
    .await
    .expect("insert plan usage");
}

pub async fn usage_count(pool: &PgPool, class_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM plan_usages WHERE class_id = $1")
        .bind(class_id)
        .fetch_one(pool)
        .await
        .expect("count plan usages")
}
