use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::transaction::{Transaction, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Processed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Processed => "processed",
        }
    }
}

impl FromStr for WithdrawalStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "approved" => Ok(WithdrawalStatus::Approved),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            "processed" => Ok(WithdrawalStatus::Processed),
            other => Err(UnknownVariant::new("withdrawal status", other)),
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("withdrawal request is {from}, cannot move to {to}")]
pub struct InvalidTransition {
    pub from: WithdrawalStatus,
    pub to: WithdrawalStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub payment_method_id: Uuid,
    pub status: WithdrawalStatus,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    pub fn new(user_id: Uuid, amount: BigDecimal, payment_method_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            payment_method_id,
            status: WithdrawalStatus::Pending,
            processed_by: None,
            processed_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(
        &mut self,
        expected: WithdrawalStatus,
        to: WithdrawalStatus,
        admin_id: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if self.status != expected {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.processed_by = Some(admin_id);
        self.processed_at = Some(now);
        if notes.is_some() {
            self.notes = notes;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Approves a pending request and returns the payout ledger row it spawns.
    pub fn approve(
        &mut self,
        admin_id: Uuid,
        notes: Option<String>,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction, InvalidTransition> {
        self.transition(
            WithdrawalStatus::Pending,
            WithdrawalStatus::Approved,
            admin_id,
            notes,
            now,
        )?;
        Ok(Transaction::payout(
            self.user_id,
            self.id,
            &self.amount,
            currency,
            now,
        ))
    }

    pub fn reject(
        &mut self,
        admin_id: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.transition(
            WithdrawalStatus::Pending,
            WithdrawalStatus::Rejected,
            admin_id,
            notes,
            now,
        )
    }

    /// Marks an approved request as paid out by the finance team.
    pub fn mark_processed(
        &mut self,
        admin_id: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.transition(
            WithdrawalStatus::Approved,
            WithdrawalStatus::Processed,
            admin_id,
            notes,
            now,
        )
    }
}
