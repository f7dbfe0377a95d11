//! Request DTOs for plan endpoints.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

/// Request to assign a plan to a student
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignPlanRequest {
    #[serde(default)]
    pub student_id: Option<Uuid>,
    #[serde(default)]
    pub plan_id: Option<Uuid>,
    /// Defaults to the plan's classes_included
    #[serde(default)]
    pub remaining_classes: Option<i32>,
    #[serde(default)]
    pub discount_type: Option<String>,
    #[serde(default)]
    pub discount_value: Option<Decimal>,
}

/// Request to register a student payment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub student_id: Option<Uuid>,
    #[serde(default)]
    pub student_plan_id: Option<Uuid>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Defaults to today, academy-local
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}
