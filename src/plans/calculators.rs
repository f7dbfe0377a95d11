//! Plan pricing and balance math.
//!
//! Pure functions - no database access.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::billing::round_money;

/// Discount applied when a plan is assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    None,
    Percent,
    Amount,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::None => "none",
            DiscountType::Percent => "percent",
            DiscountType::Amount => "amount",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(DiscountType::None),
            "percent" => Some(DiscountType::Percent),
            "amount" => Some(DiscountType::Amount),
            _ => None,
        }
    }
}

/// Payment status; only `pagado` counts toward the plan balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pagado,
    Pendiente,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pagado => "pagado",
            PaymentStatus::Pendiente => "pendiente",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pagado" => Some(PaymentStatus::Pagado),
            "pendiente" => Some(PaymentStatus::Pendiente),
            _ => None,
        }
    }
}

/// Final price after discount, floored at zero.
///
/// Non-positive discount values leave the base price untouched.
pub fn apply_discount(base_price: Decimal, discount_type: DiscountType, value: Decimal) -> Decimal {
    if value <= Decimal::ZERO {
        return base_price;
    }

    let discounted = match discount_type {
        DiscountType::None => base_price,
        DiscountType::Percent => base_price - base_price * value / Decimal::ONE_HUNDRED,
        DiscountType::Amount => base_price - value,
    };

    round_money(discounted.max(Decimal::ZERO), 2)
}

/// Amount a plan can be paid up to: the final price, else the base price
pub fn payment_cap(final_price: Option<Decimal>, base_price: Decimal) -> Decimal {
    final_price.unwrap_or(base_price)
}

/// True if adding `amount` to `paid` would go past `cap`
pub fn exceeds_cap(paid: Decimal, amount: Decimal, cap: Decimal) -> bool {
    paid + amount > cap
}

/// Unpaid remainder, never negative
pub fn outstanding_balance(cap: Decimal, paid: Decimal) -> Decimal {
    (cap - paid).max(Decimal::ZERO)
}

/// Classes still available on a plan
pub fn available_classes(remaining_classes: i32, used: i64) -> i64 {
    (i64::from(remaining_classes) - used).max(0)
}

/// A plan with unconsumed classes blocks assigning a new one
pub fn has_spare_capacity(remaining_classes: i32, used: i64) -> bool {
    used < i64::from(remaining_classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_discount_percent() {
        assert_eq!(
            apply_discount(dec!(400000), DiscountType::Percent, dec!(10)),
            dec!(360000)
        );
    }

    #[test]
    fn test_discount_amount_floors_at_zero() {
        assert_eq!(
            apply_discount(dec!(400000), DiscountType::Amount, dec!(50000)),
            dec!(350000)
        );
        assert_eq!(
            apply_discount(dec!(100), DiscountType::Amount, dec!(250)),
            dec!(0)
        );
    }

    #[test]
    fn test_discount_ignored_when_not_positive() {
        assert_eq!(
            apply_discount(dec!(100), DiscountType::Percent, dec!(0)),
            dec!(100)
        );
        assert_eq!(
            apply_discount(dec!(100), DiscountType::Amount, dec!(-5)),
            dec!(100)
        );
        assert_eq!(
            apply_discount(dec!(100), DiscountType::None, dec!(30)),
            dec!(100)
        );
    }

    #[test]
    fn test_payment_cap_falls_back_to_base() {
        assert_eq!(payment_cap(Some(dec!(90)), dec!(100)), dec!(90));
        assert_eq!(payment_cap(None, dec!(100)), dec!(100));
    }

    #[test]
    fn test_exceeds_cap() {
        assert!(!exceeds_cap(dec!(200000), dec!(200000), dec!(400000)));
        assert!(exceeds_cap(dec!(200000), dec!(200001), dec!(400000)));
    }

    #[test]
    fn test_balance_and_availability() {
        assert_eq!(outstanding_balance(dec!(400), dec!(150)), dec!(250));
        assert_eq!(outstanding_balance(dec!(400), dec!(500)), dec!(0));
        assert_eq!(available_classes(8, 3), 5);
        assert_eq!(available_classes(3, 4), 0);
    }

    #[test]
    fn test_spare_capacity() {
        assert!(has_spare_capacity(8, 3));
        assert!(!has_spare_capacity(3, 3));
        assert!(!has_spare_capacity(0, 0));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!(DiscountType::parse("percent"), Some(DiscountType::Percent));
        assert_eq!(DiscountType::parse("bogus"), None);
        assert_eq!(PaymentStatus::parse("pendiente"), Some(PaymentStatus::Pendiente));
        assert_eq!(PaymentStatus::Pagado.as_str(), "pagado");
    }
}
