//! Plan assignment and payment service functions.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{self, AuditEntry};
use crate::error::AppError;

use super::calculators::{
    apply_discount, exceeds_cap, has_spare_capacity, payment_cap, DiscountType, PaymentStatus,
};
use super::models::{Payment, Plan, StudentPlan};
use super::queries;
use super::requests::{AssignPlanRequest, PaymentRequest};
use super::responses::StudentPlansResponse;

pub const DEFAULT_PAYMENT_METHOD: &str = "efectivo";

/// Plan and payment error types
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Selecciona alumno y plan")]
    MissingSelection,

    #[error("Selecciona alumno y plan para registrar el pago")]
    MissingPaymentTarget,

    #[error("Alumno no encontrado.")]
    StudentNotFound,

    #[error("Plan no encontrado.")]
    PlanNotFound,

    #[error("Plan del alumno no encontrado.")]
    StudentPlanNotFound,

    #[error("Las clases restantes deben ser mayores a 0")]
    InvalidRemaining,

    #[error("Tipo de descuento inválido: {0}")]
    InvalidDiscountType(String),

    #[error("El plan seleccionado no tiene un precio válido.")]
    InvalidPlanPrice,

    #[error("El precio final debe ser mayor a 0 (revisa el descuento aplicado).")]
    InvalidFinalPrice,

    #[error("Este alumno ya tiene un plan vigente con clases disponibles. Primero debe agotar ese plan antes de asignar uno nuevo.")]
    ActivePlan,

    #[error("No se puede eliminar este plan porque hay alumnos con clases pendientes de este plan.")]
    PlanInUse,

    #[error("El monto del pago debe ser mayor a 0")]
    InvalidAmount,

    #[error("Estado de pago inválido: {0}")]
    InvalidStatus(String),

    #[error("El plan seleccionado no pertenece al alumno.")]
    PlanMismatch,

    #[error("El total pagado ({total} {currency}) no puede superar el valor del plan ({cap} {currency}). Ajusta el monto del pago.")]
    Overpayment {
        total: Decimal,
        cap: Decimal,
        currency: String,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Database(e) => AppError::Database(e),
            PlanError::StudentNotFound
            | PlanError::PlanNotFound
            | PlanError::StudentPlanNotFound => AppError::NotFound(err.to_string()),
            PlanError::ActivePlan | PlanError::PlanInUse | PlanError::Overpayment { .. } => {
                AppError::Rejected(err.to_string())
            }
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// Validated terms of a plan assignment
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTerms {
    pub remaining_classes: i32,
    pub base_price: Decimal,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub final_price: Decimal,
}

/// Validated payment ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub student_id: Uuid,
    pub student_plan_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_date: NaiveDate,
    pub method: String,
    pub status: PaymentStatus,
    pub notes: Option<String>,
}

/// Compute and validate the price and class count of an assignment
pub fn plan_terms(plan: &Plan, req: &AssignPlanRequest) -> Result<PlanTerms, PlanError> {
    let remaining_classes = req.remaining_classes.unwrap_or(plan.classes_included);
    if remaining_classes <= 0 {
        return Err(PlanError::InvalidRemaining);
    }

    let discount_type = match req.discount_type.as_deref().map(str::trim) {
        None | Some("") => DiscountType::None,
        Some(raw) => {
            DiscountType::parse(raw).ok_or_else(|| PlanError::InvalidDiscountType(raw.to_string()))?
        }
    };
    let discount_value = req.discount_value.unwrap_or(Decimal::ZERO);

    let base_price = Decimal::from(plan.price_cents);
    if base_price <= Decimal::ZERO {
        return Err(PlanError::InvalidPlanPrice);
    }

    let final_price = apply_discount(base_price, discount_type, discount_value);
    if final_price <= Decimal::ZERO {
        return Err(PlanError::InvalidFinalPrice);
    }

    Ok(PlanTerms {
        remaining_classes,
        base_price,
        discount_type,
        discount_value,
        final_price,
    })
}

/// Validate a payment request
pub fn validate_payment(
    req: &PaymentRequest,
    today: NaiveDate,
    default_currency: &str,
) -> Result<NewPayment, PlanError> {
    let (Some(student_id), Some(student_plan_id)) = (req.student_id, req.student_plan_id) else {
        return Err(PlanError::MissingPaymentTarget);
    };

    let amount = match req.amount {
        Some(amount) if amount > Decimal::ZERO => amount,
        _ => return Err(PlanError::InvalidAmount),
    };

    let status = match req.status.as_deref().map(str::trim) {
        None | Some("") => PaymentStatus::Pagado,
        Some(raw) => PaymentStatus::parse(raw).ok_or_else(|| PlanError::InvalidStatus(raw.to_string()))?,
    };

    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Ok(NewPayment {
        student_id,
        student_plan_id,
        amount,
        currency: non_empty(&req.currency).unwrap_or_else(|| default_currency.to_string()),
        payment_date: req.payment_date.unwrap_or(today),
        method: non_empty(&req.method).unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
        status,
        notes: non_empty(&req.notes),
    })
}

/// Assign a plan to a student of the academy.
///
/// The student row is locked so two concurrent assignments cannot both pass
/// the active-plan check.
pub async fn assign_plan(
    pool: &PgPool,
    academy_id: Uuid,
    req: &AssignPlanRequest,
    user_id: Option<Uuid>,
) -> Result<StudentPlan, PlanError> {
    let (Some(student_id), Some(plan_id)) = (req.student_id, req.plan_id) else {
        return Err(PlanError::MissingSelection);
    };

    let mut tx = pool.begin().await?;

    queries::lock_student(&mut *tx, student_id, academy_id)
        .await?
        .ok_or(PlanError::StudentNotFound)?;
    let plan = queries::get_plan(&mut *tx, plan_id, academy_id)
        .await?
        .ok_or(PlanError::PlanNotFound)?;

    let terms = plan_terms(&plan, req)?;

    let consumption = queries::list_plan_consumption(&mut *tx, student_id).await?;
    if consumption
        .iter()
        .any(|(remaining, used)| has_spare_capacity(*remaining, *used))
    {
        return Err(PlanError::ActivePlan);
    }

    let student_plan =
        queries::insert_student_plan(&mut *tx, academy_id, student_id, plan_id, &terms).await?;

    tx.commit().await?;

    tracing::info!(
        student_plan_id = %student_plan.id,
        student_id = %student_id,
        plan_id = %plan_id,
        final_price = %terms.final_price,
        "Plan assigned"
    );

    audit::record(
        pool,
        AuditEntry::new("create", "student_plan", student_plan.id)
            .payload(json!({
                "student_id": student_id,
                "plan_id": plan_id,
                "remaining_classes": terms.remaining_classes,
                "base_price": terms.base_price,
                "discount_type": terms.discount_type.as_str(),
                "discount_value": terms.discount_value,
                "final_price": terms.final_price,
            }))
            .by(user_id),
    )
    .await;

    Ok(student_plan)
}

/// Plans of a student with used classes, paid totals and balance
pub async fn student_plans(
    pool: &PgPool,
    student_id: Uuid,
) -> Result<StudentPlansResponse, PlanError> {
    if !queries::student_exists(pool, student_id).await? {
        return Err(PlanError::StudentNotFound);
    }

    let rows = queries::list_student_plan_summaries(pool, student_id).await?;

    Ok(StudentPlansResponse {
        student_id,
        plans: rows.into_iter().map(Into::into).collect(),
    })
}

/// Delete a plan nobody still has classes on
pub async fn delete_plan(
    pool: &PgPool,
    plan_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<(), PlanError> {
    let mut tx = pool.begin().await?;

    queries::lock_plan(&mut *tx, plan_id)
        .await?
        .ok_or(PlanError::PlanNotFound)?;

    if queries::count_plans_with_remaining(&mut *tx, plan_id).await? > 0 {
        return Err(PlanError::PlanInUse);
    }

    queries::delete_plan(&mut *tx, plan_id).await?;
    tx.commit().await?;

    tracing::info!(plan_id = %plan_id, "Plan deleted");
    audit::record(pool, AuditEntry::new("delete", "plan", plan_id).by(user_id)).await;

    Ok(())
}

/// Register a payment without exceeding the plan's final price
pub async fn register_payment(
    pool: &PgPool,
    payment: NewPayment,
    user_id: Option<Uuid>,
) -> Result<Payment, PlanError> {
    let mut tx = pool.begin().await?;

    let student_plan = queries::lock_student_plan(&mut *tx, payment.student_plan_id)
        .await?
        .ok_or(PlanError::StudentPlanNotFound)?;
    if student_plan.student_id != payment.student_id {
        return Err(PlanError::PlanMismatch);
    }

    let paid = queries::sum_paid(&mut *tx, student_plan.id).await?;
    let cap = payment_cap(student_plan.final_price, student_plan.base_price);
    if exceeds_cap(paid, payment.amount, cap) {
        return Err(PlanError::Overpayment {
            total: (paid + payment.amount).normalize(),
            cap: cap.normalize(),
            currency: payment.currency,
        });
    }

    let inserted = queries::insert_payment(&mut *tx, &payment).await?;
    tx.commit().await?;

    tracing::info!(
        payment_id = %inserted.id,
        student_plan_id = %inserted.student_plan_id,
        amount = %inserted.amount,
        status = %inserted.status,
        "Payment registered"
    );

    audit::record(
        pool,
        AuditEntry::new("create", "payment", inserted.id)
            .payload(json!({
                "student_id": inserted.student_id,
                "student_plan_id": inserted.student_plan_id,
                "amount": inserted.amount,
                "currency": inserted.currency,
                "payment_date": inserted.payment_date,
                "status": inserted.status,
            }))
            .by(user_id),
    )
    .await;

    Ok(inserted)
}
