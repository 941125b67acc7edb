use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::audit::{ENTITY_ENROLLMENT, ENTITY_TRANSACTION};
use crate::domain::{AuditEntry, Transaction};
use crate::error::AppError;
use crate::ports::Store;

use super::audit_value;

#[derive(Debug, Clone, Serialize)]
pub struct RefundResult {
    /// The purchase row, now flipped to `refund` / `refunded`.
    pub original: Transaction,
    /// The new negated reversal row.
    pub refund: Transaction,
    pub enrollment_revoked: bool,
}

pub struct LedgerService {
    store: Arc<dyn Store>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reverses a completed purchase and revokes the buyer's access to the course.
    pub async fn refund(&self, id: Uuid, actor: &str) -> Result<RefundResult, AppError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let original = uow
            .lock_transaction(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))?;

        let refund = original.refund_entry(now).map_err(|reason| {
            tracing::warn!(transaction_id = %id, reason = %reason, "refund rejected");
            reason
        })?;

        if let Some(course_id) = original.course_id {
            if let Some(course) = uow.find_course(course_id).await? {
                uow.lock_instructor_balance(course.instructor_id).await?;
            }
        }

        let mut flipped = original.clone();
        flipped.mark_refunded(now);
        uow.update_transaction_kind(id, flipped.tx_type, flipped.status).await?;
        let refund = uow.insert_transaction(&refund).await?;

        let revoked = match original.course_id {
            Some(course_id) => uow.delete_enrollment(original.user_id, course_id).await?,
            None => None,
        };

        uow.record_audit(&AuditEntry::updated(
            original.id,
            ENTITY_TRANSACTION,
            audit_value(&original),
            audit_value(&flipped),
            actor,
        ))
        .await?;
        uow.record_audit(&AuditEntry::created(
            refund.id,
            ENTITY_TRANSACTION,
            audit_value(&refund),
            actor,
        ))
        .await?;
        if let Some(enrollment) = &revoked {
            uow.record_audit(&AuditEntry::deleted(
                enrollment.id,
                ENTITY_ENROLLMENT,
                audit_value(enrollment),
                actor,
            ))
            .await?;
        }

        uow.commit().await?;

        tracing::info!(
            transaction_id = %id,
            refund_id = %refund.id,
            amount = %refund.amount,
            "transaction refunded"
        );

        Ok(RefundResult {
            original: flipped,
            refund,
            enrollment_revoked: revoked.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::transaction::NewPurchase;
    use crate::domain::{Enrollment, TransactionStatus, TransactionType};
    use crate::ports::Store;
    use bigdecimal::BigDecimal;

    fn purchase(amount: i64) -> Transaction {
        Transaction::purchase(
            NewPurchase {
                user_id: Uuid::new_v4(),
                course_id: Uuid::new_v4(),
                transaction_id: "ORDER-42".to_string(),
                amount: BigDecimal::from(amount),
                instructor_amount: BigDecimal::from(amount * 7 / 10),
                currency: "USD".to_string(),
                payment_method: "credit_card".to_string(),
                promo_code_id: None,
                discount_amount: BigDecimal::from(0),
            },
            Utc::now(),
        )
    }

    async fn seeded(tx: &Transaction) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_transaction(tx.clone()).await;

        let mut uow = store.begin().await.unwrap();
        let course_id = tx.course_id.unwrap();
        uow.insert_enrollment(&Enrollment::new(tx.user_id, course_id, Utc::now()))
            .await
            .unwrap();
        uow.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn refund_flips_original_and_appends_negated_row() {
        let tx = purchase(50);
        let store = seeded(&tx).await;
        let service = LedgerService::new(Arc::new(store.clone()));
        let enrollment_id = store.snapshot().await.enrollments[0].id;

        let result = service.refund(tx.id, "admin").await.unwrap();

        assert_eq!(result.refund.transaction_id, "REFUND-ORDER-42");
        assert_eq!(result.refund.amount, BigDecimal::from(-50));
        assert_eq!(result.refund.instructor_amount, BigDecimal::from(-35));
        assert_eq!(result.refund.status, TransactionStatus::Completed);
        assert_eq!(result.refund.tx_type, TransactionType::Refund);
        assert!(result.enrollment_revoked);

        let state = store.snapshot().await;
        assert_eq!(state.transactions.len(), 2);
        let original = state.transactions.iter().find(|t| t.id == tx.id).unwrap();
        assert_eq!(original.tx_type, TransactionType::Refund);
        assert_eq!(original.status, TransactionStatus::Refunded);
        assert_eq!(original.amount, BigDecimal::from(50));
        assert!(state.enrollments.is_empty());
        assert_eq!(state.audit_log.len(), 3);

        let revoked = state
            .audit_log
            .iter()
            .find(|entry| entry.entity_type == ENTITY_ENROLLMENT)
            .unwrap();
        assert_eq!(revoked.action, "deleted");
        assert_eq!(revoked.entity_id, enrollment_id);
        assert_eq!(revoked.old_val.as_ref().unwrap()["user_id"], tx.user_id.to_string());
    }

    #[tokio::test]
    async fn second_refund_is_rejected() {
        let tx = purchase(50);
        let store = seeded(&tx).await;
        let service = LedgerService::new(Arc::new(store.clone()));

        service.refund(tx.id, "admin").await.unwrap();
        let err = service.refund(tx.id, "admin").await.unwrap_err();

        assert!(matches!(err, AppError::PreconditionFailed(_)));
        assert_eq!(store.snapshot().await.transactions.len(), 2);
    }

    #[tokio::test]
    async fn payouts_and_unknown_rows_cannot_be_refunded() {
        let payout = Transaction::payout(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &BigDecimal::from(20),
            "USD",
            Utc::now(),
        );
        let store = InMemoryStore::new();
        store.insert_transaction(payout.clone()).await;
        let service = LedgerService::new(Arc::new(store.clone()));

        let err = service.refund(payout.id, "admin").await.unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));

        let err = service.refund(Uuid::new_v4(), "admin").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(store.snapshot().await.transactions.len(), 1);
    }

    #[tokio::test]
    async fn pending_purchase_cannot_be_refunded() {
        let mut tx = purchase(10);
        tx.status = TransactionStatus::Pending;
        let store = InMemoryStore::new();
        store.insert_transaction(tx.clone()).await;
        let service = LedgerService::new(Arc::new(store));

        let err = service.refund(tx.id, "admin").await.unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
    }
}
