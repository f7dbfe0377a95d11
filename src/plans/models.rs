//! Database models for plans and payments.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Plan offered by an academy
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Plan {
    pub id: Uuid,
    pub academy_id: Uuid,
    pub name: String,
    pub classes_included: i32,
    /// Whole currency units despite the column name
    pub price_cents: i64,
    pub currency: String,
}

/// Plan assigned to a student
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudentPlan {
    pub id: Uuid,
    pub academy_id: Uuid,
    pub student_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub remaining_classes: i32,
    pub purchased_at: DateTime<Utc>,
    pub base_price: Decimal,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub final_price: Option<Decimal>,
}

/// Student plan joined with its consumption and payments
#[derive(Debug, Clone, FromRow)]
pub struct StudentPlanSummaryRow {
    pub id: Uuid,
    pub plan_id: Option<Uuid>,
    pub plan_name: Option<String>,
    pub remaining_classes: i32,
    pub purchased_at: DateTime<Utc>,
    pub base_price: Decimal,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub final_price: Option<Decimal>,
    pub used: i64,
    pub paid: Decimal,
}

/// Student payment
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_plan_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_date: NaiveDate,
    pub method: String,
    pub status: String,
    pub notes: Option<String>,
}
