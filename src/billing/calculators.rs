//! Billing and commission calculations.
//!
//! Pure functions for billing math - no database access.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::scheduling::calculators::local_day_bounds;

use super::models::SalesAgentAssignment;

/// Round to specified decimal places using banker's rounding (ROUND_HALF_EVEN).
///
/// Banker's rounding rounds to the nearest even number when the value is exactly
/// halfway between two possibilities. This reduces cumulative rounding bias.
///
/// # Examples
/// ```
/// use rust_decimal_macros::dec;
/// use agendo_api::billing::round_money;
///
/// assert_eq!(round_money(dec!(2.5), 0), dec!(2));   // rounds to even
/// assert_eq!(round_money(dec!(3.5), 0), dec!(4));   // rounds to even
/// assert_eq!(round_money(dec!(1.234), 2), dec!(1.23));
/// ```
pub fn round_money(amount: Decimal, places: u32) -> Decimal {
    amount.round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven)
}

/// Invoice lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Issued,
    PartiallyPaid,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
        }
    }
}

/// Status after `paid` has been collected on an invoice of `total`
pub fn invoice_status(paid: Decimal, total: Decimal) -> InvoiceStatus {
    if total > Decimal::ZERO && paid >= total {
        InvoiceStatus::Paid
    } else if paid > Decimal::ZERO {
        InvoiceStatus::PartiallyPaid
    } else {
        InvoiceStatus::Issued
    }
}

/// Commission payout status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Paid,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Paid => "paid",
        }
    }
}

/// First day of the month and first day of the next one
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

/// UTC instants bounding a local calendar month, `[from, to)`
pub fn local_month_bounds(
    year: i32,
    month: u32,
    offset: FixedOffset,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (start, end) = month_bounds(year, month)?;
    let (from, _) = local_day_bounds(start, offset);
    let (to, _) = local_day_bounds(end, offset);
    Some((from, to))
}

/// Invoice total: active students times the per-student price
pub fn invoice_total(active_students: i64, price_per_student: Decimal) -> Decimal {
    round_money(Decimal::from(active_students) * price_per_student, 2)
}

/// Commission earned on one payment
pub fn commission_delta(amount: Decimal, rate: Decimal) -> Decimal {
    round_money(amount * rate, 2)
}

/// Assignments that earn commission on a payment made on `day`.
///
/// Inactive agents and non-positive rates are skipped. When an agent has
/// several matching rows, the most recent assignment wins.
pub fn commission_recipients(
    assignments: &[SalesAgentAssignment],
    day: NaiveDate,
) -> Vec<&SalesAgentAssignment> {
    let mut matching: Vec<&SalesAgentAssignment> = assignments
        .iter()
        .filter(|a| a.agent_is_active && a.commission_rate > Decimal::ZERO && a.is_active_on(day))
        .collect();
    matching.sort_by(|a, b| b.valid_from.cmp(&a.valid_from));

    let mut seen = HashSet::new();
    matching.retain(|a| seen.insert(a.sales_agent_id));
    matching
}

/// A billing payment as seen by the live report
#[derive(Debug, Clone)]
pub struct LivePayment {
    pub academy_id: Uuid,
    /// Academy-local day of the payment
    pub paid_on: NaiveDate,
    pub amount: Decimal,
}

/// Commission total for one agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentCommission {
    pub sales_agent_id: Uuid,
    pub agent_name: String,
    pub base_amount: Decimal,
    pub commission_amount: Decimal,
}

/// Commission subtotal for one (academy, agent) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcademyAgentCommission {
    pub academy_id: Uuid,
    pub sales_agent_id: Uuid,
    pub base_amount: Decimal,
    pub commission_amount: Decimal,
}

/// Result of commission aggregation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommissionTotals {
    pub agents: Vec<AgentCommission>,
    pub academies: Vec<AcademyAgentCommission>,
}

/// Aggregate commissions for a set of payments.
///
/// Every assignment of the payment's academy covering the payment day with a
/// positive rate accrues `amount * rate`. Several agents may share an academy.
pub fn aggregate_commissions(
    payments: &[LivePayment],
    assignments: &[SalesAgentAssignment],
) -> CommissionTotals {
    let mut by_agent: BTreeMap<Uuid, (String, Decimal, Decimal)> = BTreeMap::new();
    let mut by_academy: BTreeMap<(Uuid, Uuid), (Decimal, Decimal)> = BTreeMap::new();

    for payment in payments {
        let matching = assignments.iter().filter(|a| {
            a.academy_id == payment.academy_id
                && a.commission_rate > Decimal::ZERO
                && a.is_active_on(payment.paid_on)
        });

        for assignment in matching {
            let commission = payment.amount * assignment.commission_rate;

            let agent = by_agent
                .entry(assignment.sales_agent_id)
                .or_insert_with(|| (assignment.agent_name.clone(), Decimal::ZERO, Decimal::ZERO));
            agent.1 += payment.amount;
            agent.2 += commission;

            let academy = by_academy
                .entry((payment.academy_id, assignment.sales_agent_id))
                .or_insert((Decimal::ZERO, Decimal::ZERO));
            academy.0 += payment.amount;
            academy.1 += commission;
        }
    }

    CommissionTotals {
        agents: by_agent
            .into_iter()
            .map(|(sales_agent_id, (agent_name, base, commission))| AgentCommission {
                sales_agent_id,
                agent_name,
                base_amount: round_money(base, 2),
                commission_amount: round_money(commission, 2),
            })
            .collect(),
        academies: by_academy
            .into_iter()
            .map(|((academy_id, sales_agent_id), (base, commission))| AcademyAgentCommission {
                academy_id,
                sales_agent_id,
                base_amount: round_money(base, 2),
                commission_amount: round_money(commission, 2),
            })
            .collect(),
    }
}

/// Commission period (year, month) of a local day
pub fn period_of(day: NaiveDate) -> (i32, u32) {
    (day.year(), day.month())
}
