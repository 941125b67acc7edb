//! Checkout arithmetic. Pure and deterministic so totals can be recomputed
//! for reconciliation.

use bigdecimal::BigDecimal;
use serde::Serialize;

/// Money is persisted with two decimal places, rounded half away from zero.
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.round(2)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutTotals {
    pub subtotal: BigDecimal,
    pub discount: BigDecimal,
    pub tax: BigDecimal,
    pub total: BigDecimal,
}

impl CheckoutTotals {
    /// Amount the discount and tax apply to.
    pub fn taxable(&self) -> BigDecimal {
        &self.subtotal - &self.discount
    }

    pub fn is_free(&self) -> bool {
        self.total == BigDecimal::from(0)
    }
}

/// Combines subtotal, discount and tax rate into the charge sent to the provider.
pub fn calculate(
    subtotal: &BigDecimal,
    discount: &BigDecimal,
    tax_rate_percent: &BigDecimal,
) -> CheckoutTotals {
    let zero = BigDecimal::from(0);
    let subtotal = if subtotal < &zero {
        zero.clone()
    } else {
        round_money(subtotal)
    };

    let discount = if discount < &zero {
        zero.clone()
    } else if discount > &subtotal {
        subtotal.clone()
    } else {
        round_money(discount)
    };

    let taxable = &subtotal - &discount;
    let tax = round_money(&(&taxable * tax_rate_percent / BigDecimal::from(100)));
    let tax = if tax < zero { zero.clone() } else { tax };
    let total = &taxable + &tax;

    CheckoutTotals {
        subtotal,
        discount,
        tax,
        total,
    }
}

/// The instructor's cut of a sale, taken from the amount after discount and before tax.
pub fn instructor_share(taxable: &BigDecimal, share_percent: &BigDecimal) -> BigDecimal {
    round_money(&(taxable * share_percent / BigDecimal::from(100)))
}
