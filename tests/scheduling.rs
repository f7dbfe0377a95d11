mod common;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use uuid::Uuid;

use agendo_api::scheduling::calculators::{compose_start, ClassType};
use agendo_api::scheduling::requests::{
    AvailabilityQuery, ClassSeriesRequest, ClassSessionRequest, WeeklySlot,
};
use agendo_api::scheduling::services::{
    cancel_class_session, court_availability, create_class_series, create_class_session,
    remove_student_from_class, update_class_session, validate_series_request,
    validate_session_request,
};
use agendo_api::scheduling::SchedulingError;

fn offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).unwrap()
}

#[tokio::test]
async fn test_concurrent_bookings_of_one_slot() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let academy = common::seed_academy(&pool).await;
    let court = common::seed_court(&pool, academy).await;
    let coach = common::seed_coach(&pool, academy).await;
    let ana = common::seed_student(&pool, academy, "Ana Ruiz").await;
    let luis = common::seed_student(&pool, academy, "Luis Gómez").await;
    common::seed_student_plan(&pool, academy, ana, 4).await;
    common::seed_student_plan(&pool, academy, luis, 4).await;

    let date = (Utc::now() + Duration::days(30)).date_naive();
    let request = |student| ClassSessionRequest {
        court_id: Some(court),
        coach_id: Some(coach),
        date: Some(date),
        time: Some("10:00".to_string()),
        student_ids: vec![student],
        ..Default::default()
    };
    let first = validate_session_request(&request(ana), offset(), "PYG").unwrap();
    let second = validate_session_request(&request(luis), offset(), "PYG").unwrap();

    let now = Utc::now();
    let (a, b) = tokio::join!(
        create_class_session(&pool, academy, first, now, None),
        create_class_session(&pool, academy, second, now, None),
    );

    let created = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(created, 1);
    let refused = if a.is_err() { a } else { b };
    assert!(matches!(refused, Err(SchedulingError::SlotTaken)));

    let query = AvailabilityQuery {
        date,
        exclude_class_id: None,
        selected: Some("10:00".to_string()),
    };
    let availability = court_availability(&pool, offset(), court, &query)
        .await
        .unwrap();
    assert_eq!(availability.free_slots.len(), 16);
    assert!(!availability.free_slots.contains(&"10:00".to_string()));
    assert_eq!(availability.selected.as_deref(), Some("06:00"));
}

#[tokio::test]
async fn test_started_class_cannot_be_cancelled() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let academy = common::seed_academy(&pool).await;
    let court = common::seed_court(&pool, academy).await;
    let coach = common::seed_coach(&pool, academy).await;
    let student = common::seed_student(&pool, academy, "Ana Ruiz").await;

    let start = Utc::now() - Duration::hours(2);
    let class_id = common::seed_class(&pool, academy, court, coach, start, &[student]).await;

    let result = cancel_class_session(&pool, academy, class_id, Utc::now(), None).await;
    assert!(matches!(result, Err(SchedulingError::AlreadyStarted)));

    let later = common::seed_class(
        &pool,
        academy,
        court,
        coach,
        Utc::now() + Duration::days(2),
        &[student],
    )
    .await;
    assert!(cancel_class_session(&pool, academy, later, Utc::now(), None).await.is_ok());
}

/// Academy with one court, one coach and the given students
struct Fixture {
    academy: Uuid,
    court: Uuid,
    coach: Uuid,
    students: Vec<Uuid>,
}

async fn fixture(pool: &sqlx::PgPool, names: &[&str]) -> Fixture {
    let academy = common::seed_academy(pool).await;
    let court = common::seed_court(pool, academy).await;
    let coach = common::seed_coach(pool, academy).await;
    let mut students = Vec::with_capacity(names.len());
    for name in names {
        students.push(common::seed_student(pool, academy, name).await);
    }
    Fixture {
        academy,
        court,
        coach,
        students,
    }
}

fn future_day(days: i64) -> NaiveDate {
    (Utc::now() + Duration::days(days)).date_naive()
}

fn at(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    compose_start(date, hour, offset()).unwrap()
}

fn class_request(
    court: Uuid,
    coach: Uuid,
    date: NaiveDate,
    time: &str,
    students: Vec<Uuid>,
) -> ClassSessionRequest {
    ClassSessionRequest {
        court_id: Some(court),
        coach_id: Some(coach),
        date: Some(date),
        time: Some(time.to_string()),
        student_ids: students,
        ..Default::default()
    }
}

async fn booking_count(pool: &sqlx::PgPool, class_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE class_id = $1")
        .bind(class_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_student_cannot_take_two_courts_at_once() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let f = fixture(&pool, &["Ana Ruiz"]).await;
    let ana = f.students[0];
    common::seed_student_plan(&pool, f.academy, ana, 8).await;
    let other_court = common::seed_court(&pool, f.academy).await;
    let other_coach = common::seed_coach(&pool, f.academy).await;

    let date = future_day(20);
    let first = validate_session_request(
        &class_request(f.court, f.coach, date, "18:00", vec![ana]),
        offset(),
        "PYG",
    )
    .unwrap();
    create_class_session(&pool, f.academy, first, Utc::now(), None)
        .await
        .unwrap();

    let second = validate_session_request(
        &class_request(other_court, other_coach, date, "18:00", vec![ana]),
        offset(),
        "PYG",
    )
    .unwrap();
    let err = create_class_session(&pool, f.academy, second, Utc::now(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::StudentsBusy(_)));
    assert_eq!(err.to_string(), "El alumno Ana Ruiz ya tiene una clase en ese horario.");

    // Moving another session onto that instant is refused too
    let elsewhere =
        common::seed_class(&pool, f.academy, other_court, other_coach, at(date, 9), &[ana]).await;
    let moved = validate_session_request(
        &class_request(other_court, other_coach, date, "18:00", vec![ana]),
        offset(),
        "PYG",
    )
    .unwrap();
    let err = update_class_session(&pool, f.academy, elsewhere, moved, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::StudentsBusy(_)));
}

#[tokio::test]
async fn test_update_reshapes_and_cleans_up_leaving_students() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let f = fixture(&pool, &["Ana Ruiz", "Luis Gómez", "Sofía Duarte"]).await;
    let (ana, luis, sofia) = (f.students[0], f.students[1], f.students[2]);
    let plan = common::seed_student_plan(&pool, f.academy, ana, 4).await;

    let date = future_day(15);
    let class_id =
        common::seed_class(&pool, f.academy, f.court, f.coach, at(date, 10), &[ana]).await;
    common::seed_usage(&pool, plan, class_id, ana).await;
    sqlx::query("INSERT INTO attendance (id, class_id, student_id, present) VALUES ($1, $2, $3, TRUE)")
        .bind(Uuid::new_v4())
        .bind(class_id)
        .bind(ana)
        .execute(&pool)
        .await
        .unwrap();

    // Same slot, three students
    let grown = validate_session_request(
        &class_request(f.court, f.coach, date, "10:00", vec![ana, luis, sofia]),
        offset(),
        "PYG",
    )
    .unwrap();
    let updated = update_class_session(&pool, f.academy, class_id, grown, None)
        .await
        .unwrap();
    assert_eq!(updated.session.capacity, 3);
    assert_eq!(updated.session.class_type, ClassType::Grupal.as_str());
    assert_eq!(updated.added.len(), 2);
    assert_eq!(booking_count(&pool, class_id).await, 3);

    // Ana leaves: her usage and attendance go with her booking
    let shrunk = validate_session_request(
        &class_request(f.court, f.coach, date, "10:00", vec![luis, sofia]),
        offset(),
        "PYG",
    )
    .unwrap();
    let updated = update_class_session(&pool, f.academy, class_id, shrunk, None)
        .await
        .unwrap();
    assert_eq!(updated.removed, vec![ana]);
    assert_eq!(updated.session.capacity, 2);
    assert_eq!(common::usage_count(&pool, class_id).await, 0);
    let attendance: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE class_id = $1")
        .bind(class_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(attendance, 0);

    // Another session's slot is taken
    common::seed_class(&pool, f.academy, f.court, f.coach, at(date, 12), &[]).await;
    let clash = validate_session_request(
        &class_request(f.court, f.coach, date, "12:00", vec![luis, sofia]),
        offset(),
        "PYG",
    )
    .unwrap();
    assert!(matches!(
        update_class_session(&pool, f.academy, class_id, clash, None).await,
        Err(SchedulingError::SlotTaken)
    ));
}

#[tokio::test]
async fn test_sessions_of_other_academies_are_hidden() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let f = fixture(&pool, &["Ana Ruiz"]).await;
    let intruder = fixture(&pool, &["Luis Gómez"]).await;
    let date = future_day(10);
    let class_id =
        common::seed_class(&pool, f.academy, f.court, f.coach, at(date, 10), &f.students).await;

    let edit = validate_session_request(
        &class_request(intruder.court, intruder.coach, date, "11:00", intruder.students.clone()),
        offset(),
        "PYG",
    )
    .unwrap();
    assert!(matches!(
        update_class_session(&pool, intruder.academy, class_id, edit, None).await,
        Err(SchedulingError::ClassNotFound)
    ));
    assert!(matches!(
        cancel_class_session(&pool, intruder.academy, class_id, Utc::now(), None).await,
        Err(SchedulingError::ClassNotFound)
    ));
    assert!(matches!(
        remove_student_from_class(&pool, intruder.academy, class_id, f.students[0], None).await,
        Err(SchedulingError::ClassNotFound)
    ));
    assert_eq!(booking_count(&pool, class_id).await, 1);
}

#[tokio::test]
async fn test_availability_of_unknown_court() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let query = AvailabilityQuery {
        date: future_day(1),
        exclude_class_id: None,
        selected: None,
    };
    let result = court_availability(&pool, offset(), Uuid::new_v4(), &query).await;
    assert!(matches!(result, Err(SchedulingError::CourtNotFound)));
}

#[tokio::test]
async fn test_creation_checks_student_plans() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let f = fixture(&pool, &["Ana Ruiz", "Luis Gómez"]).await;
    let (ana, luis) = (f.students[0], f.students[1]);
    let date = future_day(12);

    let draft = |time: &str, student| {
        validate_session_request(
            &class_request(f.court, f.coach, date, time, vec![student]),
            offset(),
            "PYG",
        )
        .unwrap()
    };

    let err = create_class_session(&pool, f.academy, draft("08:00", ana), Utc::now(), None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "El alumno Ana Ruiz no tiene un plan con clases disponibles.");

    // A two-class plan allows two future bookings
    common::seed_student_plan(&pool, f.academy, luis, 2).await;
    create_class_session(&pool, f.academy, draft("08:00", luis), Utc::now(), None)
        .await
        .unwrap();
    create_class_session(&pool, f.academy, draft("09:00", luis), Utc::now(), None)
        .await
        .unwrap();
    let err = create_class_session(&pool, f.academy, draft("10:00", luis), Utc::now(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulingError::FutureBookingLimit { booked: 2, .. }
    ));
}

#[tokio::test]
async fn test_weekly_series_follows_plan_balances() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let f = fixture(&pool, &["Ana Ruiz", "Luis Gómez"]).await;
    let (ana, luis) = (f.students[0], f.students[1]);
    common::seed_student_plan(&pool, f.academy, ana, 3).await;
    common::seed_student_plan(&pool, f.academy, luis, 1).await;

    let first = future_day(7);
    let weekday = first.weekday().num_days_from_sunday();
    let next_week = first + Duration::days(7);

    // The court is already taken the following week
    common::seed_class(&pool, f.academy, f.court, f.coach, at(next_week, 18), &[]).await;

    let req = ClassSeriesRequest {
        session: ClassSessionRequest {
            court_id: Some(f.court),
            coach_id: Some(f.coach),
            date: Some(first),
            student_ids: vec![ana, luis],
            ..Default::default()
        },
        weekdays: vec![WeeklySlot {
            weekday,
            time: Some("18:00".to_string()),
        }],
    };
    let draft = validate_series_request(&req, offset(), "PYG").unwrap();
    let series = create_class_series(&pool, f.academy, draft, offset(), Utc::now(), None)
        .await
        .unwrap();

    assert_eq!(series.sessions.len(), 3);
    assert_eq!(series.skipped_busy_court, 1);
    assert!(!series.incomplete);

    let first_session = &series.sessions[0];
    assert_eq!(first_session.student_ids, vec![ana, luis]);
    assert_eq!(first_session.session.capacity, 2);
    for later in &series.sessions[1..] {
        assert_eq!(later.student_ids, vec![ana]);
        assert_eq!(later.session.class_type, ClassType::Individual.as_str());
    }
    assert_eq!(series.sessions[1].session.date, at(first + Duration::days(14), 18));
}

#[tokio::test]
async fn test_removing_last_student_deletes_class() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let f = fixture(&pool, &["Ana Ruiz", "Luis Gómez"]).await;
    let (ana, luis) = (f.students[0], f.students[1]);
    let plan = common::seed_student_plan(&pool, f.academy, ana, 4).await;

    let start = at(future_day(3), 10);
    let class_id = common::seed_class(&pool, f.academy, f.court, f.coach, start, &[ana, luis]).await;
    common::seed_usage(&pool, plan, class_id, ana).await;

    let removal = remove_student_from_class(&pool, f.academy, class_id, ana, None)
        .await
        .unwrap();
    assert_eq!(removal.returned_credits, 1);
    assert_eq!(removal.remaining_students, 1);
    assert!(!removal.class_deleted);

    let (class_type, capacity): (String, i32) =
        sqlx::query_as("SELECT type, capacity FROM class_sessions WHERE id = $1")
            .bind(class_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!((class_type.as_str(), capacity), ("individual", 1));

    assert!(matches!(
        remove_student_from_class(&pool, f.academy, class_id, ana, None).await,
        Err(SchedulingError::StudentNotBooked)
    ));

    let removal = remove_student_from_class(&pool, f.academy, class_id, luis, None)
        .await
        .unwrap();
    assert!(removal.class_deleted);
    let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM class_sessions WHERE id = $1")
        .bind(class_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(left, 0);
}
