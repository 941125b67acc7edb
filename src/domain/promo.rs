//! Promo code entity and the rules deciding whether a code applies to a cart.
//!
//! Evaluation is pure: it never touches `used_count`. A use is consumed only
//! when a checkout settles, so abandoned checkouts do not burn redemptions.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::pricing::round_money;
use super::transaction::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl FromStr for DiscountType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(UnknownVariant::new("discount type", other)),
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: BigDecimal,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub min_cart_value: Option<BigDecimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a promo code cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum PromoRejection {
    #[error("Promo code not found")]
    NotFound,
    #[error("Promo code is no longer active")]
    Inactive,
    #[error("Promo code has expired")]
    Expired,
    #[error("Promo code is not valid yet")]
    NotYetStarted,
    #[error("Promo code has reached its usage limit")]
    UsageExceeded,
    #[error("Cart total is below the minimum required for this promo code")]
    BelowMinimumCartValue,
}

impl PromoRejection {
    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            PromoRejection::NotFound => "not_found",
            PromoRejection::Inactive => "inactive",
            PromoRejection::Expired => "expired",
            PromoRejection::NotYetStarted => "not_yet_started",
            PromoRejection::UsageExceeded => "usage_exceeded",
            PromoRejection::BelowMinimumCartValue => "below_minimum_cart_value",
        }
    }
}

/// Discount a usable code yields for a given subtotal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromoDiscount {
    pub promo_code_id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: BigDecimal,
    pub discount_amount: BigDecimal,
}

/// Normalises user input to the stored form of a code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl PromoCode {
    /// Usability independent of the cart.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), PromoRejection> {
        if !self.is_active {
            return Err(PromoRejection::Inactive);
        }
        if matches!(self.end_date, Some(end) if end < now) {
            return Err(PromoRejection::Expired);
        }
        if matches!(self.max_uses, Some(max) if self.used_count >= max) {
            return Err(PromoRejection::UsageExceeded);
        }
        if matches!(self.start_date, Some(start) if start > now) {
            return Err(PromoRejection::NotYetStarted);
        }
        Ok(())
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.check_usable(now).is_ok()
    }

    /// Discount for `subtotal`, never negative and never above `subtotal`.
    pub fn discount_for(&self, subtotal: &BigDecimal) -> BigDecimal {
        let zero = BigDecimal::from(0);
        if subtotal <= &zero {
            return zero;
        }

        let raw = match self.discount_type {
            DiscountType::Percentage => subtotal * &self.discount_value / BigDecimal::from(100),
            DiscountType::Fixed => self.discount_value.clone(),
        };

        let capped = if &raw > subtotal {
            subtotal.clone()
        } else {
            raw
        };
        if capped < zero {
            zero
        } else {
            round_money(&capped)
        }
    }
}

/// Decides whether `promo` applies to a cart worth `subtotal` at `now`.
pub fn evaluate(
    promo: Option<&PromoCode>,
    subtotal: &BigDecimal,
    now: DateTime<Utc>,
) -> Result<PromoDiscount, PromoRejection> {
    let promo = promo.ok_or(PromoRejection::NotFound)?;
    promo.check_usable(now)?;

    if matches!(&promo.min_cart_value, Some(min) if subtotal < min) {
        return Err(PromoRejection::BelowMinimumCartValue);
    }

    Ok(PromoDiscount {
        promo_code_id: promo.id,
        code: promo.code.clone(),
        discount_type: promo.discount_type,
        discount_value: promo.discount_value.clone(),
        discount_amount: promo.discount_for(subtotal),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn promo(code: &str, discount_type: DiscountType, value: i64) -> PromoCode {
        let now = Utc::now();
        PromoCode {
            id: Uuid::new_v4(),
            code: code.to_string(),
            discount_type,
            discount_value: BigDecimal::from(value),
            start_date: None,
            end_date: None,
            max_uses: None,
            used_count: 0,
            min_cart_value: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percentage_discount_on_subtotal() {
        let p = promo("SAVE10", DiscountType::Percentage, 10);
        let result = evaluate(Some(&p), &BigDecimal::from(100), Utc::now()).unwrap();

        assert_eq!(result.discount_amount, BigDecimal::from(10));
        assert_eq!(result.discount_type, DiscountType::Percentage);
        assert_eq!(result.code, "SAVE10");
    }

    #[test]
    fn percentage_above_hundred_is_capped_at_subtotal() {
        let p = promo("ALL", DiscountType::Percentage, 150);
        assert_eq!(p.discount_for(&BigDecimal::from(40)), BigDecimal::from(40));
    }

    #[test]
    fn fixed_discount_is_min_of_value_and_subtotal() {
        let p = promo("FLAT25", DiscountType::Fixed, 25);
        for (subtotal, expected) in [(100, 25), (25, 25), (10, 10), (0, 0)] {
            let discount = p.discount_for(&BigDecimal::from(subtotal));
            assert_eq!(discount, BigDecimal::from(expected));
            assert!(discount >= BigDecimal::from(0));
            assert!(discount <= BigDecimal::from(subtotal));
        }
    }

    #[test]
    fn missing_code_is_not_found() {
        assert_eq!(
            evaluate(None, &BigDecimal::from(10), Utc::now()),
            Err(PromoRejection::NotFound)
        );
    }

    #[test]
    fn inactive_code_is_rejected() {
        let mut p = promo("OFF", DiscountType::Fixed, 5);
        p.is_active = false;
        assert_eq!(
            evaluate(Some(&p), &BigDecimal::from(10), Utc::now()),
            Err(PromoRejection::Inactive)
        );
    }

    #[test]
    fn date_window_is_enforced() {
        let now = Utc::now();
        let mut expired = promo("OLD", DiscountType::Fixed, 5);
        expired.end_date = Some(now - Duration::days(1));
        assert_eq!(expired.check_usable(now), Err(PromoRejection::Expired));

        let mut future = promo("SOON", DiscountType::Fixed, 5);
        future.start_date = Some(now + Duration::days(1));
        assert_eq!(future.check_usable(now), Err(PromoRejection::NotYetStarted));

        let mut open = promo("NOW", DiscountType::Fixed, 5);
        open.start_date = Some(now - Duration::days(1));
        open.end_date = Some(now + Duration::days(1));
        assert!(open.is_valid(now));
    }

    #[test]
    fn end_date_equal_to_now_is_still_valid() {
        let now = Utc::now();
        let mut p = promo("EDGE", DiscountType::Fixed, 5);
        p.end_date = Some(now);
        p.start_date = Some(now);
        assert!(p.is_valid(now));
    }

    #[test]
    fn usage_cap_is_enforced() {
        let mut p = promo("ONCE", DiscountType::Fixed, 5);
        p.max_uses = Some(1);
        assert!(p.is_valid(Utc::now()));

        p.used_count = 1;
        assert_eq!(
            evaluate(Some(&p), &BigDecimal::from(10), Utc::now()),
            Err(PromoRejection::UsageExceeded)
        );
    }

    #[test]
    fn minimum_cart_value_is_enforced() {
        let mut p = promo("BIG", DiscountType::Fixed, 5);
        p.min_cart_value = Some(BigDecimal::from(50));

        assert_eq!(
            evaluate(Some(&p), &BigDecimal::from(49), Utc::now()),
            Err(PromoRejection::BelowMinimumCartValue)
        );
        assert!(evaluate(Some(&p), &BigDecimal::from(50), Utc::now()).is_ok());
    }

    #[test]
    fn rejection_codes_are_snake_case() {
        assert_eq!(PromoRejection::UsageExceeded.code(), "usage_exceeded");
        assert_eq!(
            serde_json::to_value(PromoRejection::BelowMinimumCartValue).unwrap(),
            serde_json::json!("below_minimum_cart_value")
        );
    }

    #[test]
    fn codes_are_normalized() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
    }
}
