//! Response DTOs for plan endpoints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::calculators::{available_classes, outstanding_balance, payment_cap};
use super::models::StudentPlanSummaryRow;

/// One plan of a student with its balance
#[derive(Debug, Serialize)]
pub struct StudentPlanSummary {
    pub id: Uuid,
    pub plan_id: Option<Uuid>,
    pub plan_name: Option<String>,
    pub remaining_classes: i32,
    pub used_classes: i64,
    pub available_classes: i64,
    pub purchased_at: DateTime<Utc>,
    pub base_price: Decimal,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub final_price: Decimal,
    pub paid: Decimal,
    pub balance: Decimal,
}

impl From<StudentPlanSummaryRow> for StudentPlanSummary {
    fn from(row: StudentPlanSummaryRow) -> Self {
        let final_price = payment_cap(row.final_price, row.base_price);
        Self {
            id: row.id,
            plan_id: row.plan_id,
            plan_name: row.plan_name,
            remaining_classes: row.remaining_classes,
            used_classes: row.used,
            available_classes: available_classes(row.remaining_classes, row.used),
            purchased_at: row.purchased_at,
            base_price: row.base_price,
            discount_type: row.discount_type,
            discount_value: row.discount_value,
            final_price,
            paid: row.paid,
            balance: outstanding_balance(final_price, row.paid),
        }
    }
}

/// Plans of a student
#[derive(Debug, Serialize)]
pub struct StudentPlansResponse {
    pub student_id: Uuid,
    pub plans: Vec<StudentPlanSummary>,
}

/// Response for a deleted plan
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub deleted: bool,
}
