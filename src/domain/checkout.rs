//! A single checkout attempt, persisted between payment initiation and the
//! provider's asynchronous callback.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::pricing::CheckoutTotals;
use super::transaction::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    PaymentPending,
    Completed,
    Failed,
}

impl CheckoutState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::PaymentPending => "payment_pending",
            CheckoutState::Completed => "completed",
            CheckoutState::Failed => "failed",
        }
    }
}

impl FromStr for CheckoutState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment_pending" => Ok(CheckoutState::PaymentPending),
            "completed" => Ok(CheckoutState::Completed),
            "failed" => Ok(CheckoutState::Failed),
            other => Err(UnknownVariant::new("checkout state", other)),
        }
    }
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trusted result of a verified payment provider notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Completed,
    Failed,
    Pending,
}

impl PaymentOutcome {
    /// Maps the provider's transaction status vocabulary.
    pub fn from_provider_status(status: &str) -> Option<Self> {
        match status.trim().to_lowercase().as_str() {
            "capture" | "settlement" | "success" | "completed" => Some(PaymentOutcome::Completed),
            "pending" => Some(PaymentOutcome::Pending),
            "deny" | "cancel" | "expire" | "failure" | "failed" => Some(PaymentOutcome::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub promo_code_id: Option<Uuid>,
    pub subtotal: BigDecimal,
    pub discount_amount: BigDecimal,
    pub tax_amount: BigDecimal,
    pub total: BigDecimal,
    pub instructor_amount: BigDecimal,
    pub currency: String,
    pub state: CheckoutState,
    pub payment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkout {
    pub fn new(
        user_id: Uuid,
        course_id: Uuid,
        promo_code_id: Option<Uuid>,
        totals: &CheckoutTotals,
        instructor_amount: BigDecimal,
        currency: &str,
    ) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            id,
            order_id: format!("ORDER-{}", id.simple()),
            user_id,
            course_id,
            promo_code_id,
            subtotal: totals.subtotal.clone(),
            discount_amount: totals.discount.clone(),
            tax_amount: totals.tax.clone(),
            total: totals.total.clone(),
            instructor_amount,
            currency: currency.to_string(),
            state: CheckoutState::PaymentPending,
            payment_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}
