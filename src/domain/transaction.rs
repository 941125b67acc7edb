//! Ledger entry domain entity.
//! Framework-agnostic representation of a monetary movement on the platform.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Prefix of the external id carried by refund rows.
pub const REFUND_PREFIX: &str = "REFUND-";
/// Prefix of the external id carried by payout rows.
pub const PAYOUT_PREFIX: &str = "PAYOUT-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Refund,
    Payout,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Refund => "refund",
            TransactionType::Payout => "payout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }
}

/// Error returned when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl FromStr for TransactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionType::Purchase),
            "refund" => Ok(TransactionType::Refund),
            "payout" => Ok(TransactionType::Payout),
            other => Err(UnknownVariant::new("transaction type", other)),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "refunded" => Ok(TransactionStatus::Refunded),
            other => Err(UnknownVariant::new("transaction status", other)),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a transaction cannot be refunded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefundRejection {
    #[error("transaction has already been refunded")]
    AlreadyRefunded,
    #[error("only completed transactions can be refunded (status is {0})")]
    NotCompleted(TransactionStatus),
    #[error("only purchases can be refunded (type is {0})")]
    NotPurchase(TransactionType),
}

/// Domain entity representing one ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Option<Uuid>,
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub instructor_amount: BigDecimal,
    pub currency: String,
    pub payment_method: String,
    pub status: TransactionStatus,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub paid_at: Option<DateTime<Utc>>,
    pub promo_code_id: Option<Uuid>,
    pub discount_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to record a settled course purchase.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub instructor_amount: BigDecimal,
    pub currency: String,
    pub payment_method: String,
    pub promo_code_id: Option<Uuid>,
    pub discount_amount: BigDecimal,
}

impl Transaction {
    /// A completed purchase, paid at `now`.
    pub fn purchase(new: NewPurchase, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            course_id: Some(new.course_id),
            transaction_id: new.transaction_id,
            amount: new.amount,
            instructor_amount: new.instructor_amount,
            currency: new.currency,
            payment_method: new.payment_method,
            status: TransactionStatus::Completed,
            tx_type: TransactionType::Purchase,
            paid_at: Some(now),
            promo_code_id: new.promo_code_id,
            discount_amount: new.discount_amount,
            created_at: now,
            updated_at: now,
        }
    }

    /// A completed payout of `amount` to an instructor. Stored negated.
    pub fn payout(
        user_id: Uuid,
        withdrawal_id: Uuid,
        amount: &BigDecimal,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let negated = -amount.clone();
        Self {
            id: Uuid::new_v4(),
            user_id,
            course_id: None,
            transaction_id: format!("{}{}", PAYOUT_PREFIX, withdrawal_id),
            amount: negated.clone(),
            instructor_amount: negated,
            currency: currency.to_string(),
            payment_method: "withdrawal".to_string(),
            status: TransactionStatus::Completed,
            tx_type: TransactionType::Payout,
            paid_at: Some(now),
            promo_code_id: None,
            discount_amount: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ensure_refundable(&self) -> Result<(), RefundRejection> {
        if self.status == TransactionStatus::Refunded {
            return Err(RefundRejection::AlreadyRefunded);
        }
        if self.status != TransactionStatus::Completed {
            return Err(RefundRejection::NotCompleted(self.status));
        }
        if self.tx_type != TransactionType::Purchase {
            return Err(RefundRejection::NotPurchase(self.tx_type));
        }
        Ok(())
    }

    /// Builds the reversal row for this purchase.
    ///
    /// The caller is responsible for flipping the original row with
    /// [`Transaction::mark_refunded`] in the same unit of work.
    pub fn refund_entry(&self, now: DateTime<Utc>) -> Result<Transaction, RefundRejection> {
        self.ensure_refundable()?;

        Ok(Transaction {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            course_id: self.course_id,
            transaction_id: format!("{}{}", REFUND_PREFIX, self.transaction_id),
            amount: -self.amount.clone(),
            instructor_amount: -self.instructor_amount.clone(),
            currency: self.currency.clone(),
            payment_method: self.payment_method.clone(),
            status: TransactionStatus::Completed,
            tx_type: TransactionType::Refund,
            paid_at: Some(now),
            promo_code_id: None,
            discount_amount: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        })
    }

    /// Type flips to `refund` and status to `refunded`; amounts are untouched.
    pub fn mark_refunded(&mut self, now: DateTime<Utc>) {
        self.tx_type = TransactionType::Refund;
        self.status = TransactionStatus::Refunded;
        self.updated_at = now;
    }
}
