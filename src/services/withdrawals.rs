//! Instructor withdrawal requests and the admin review that turns them into
//! payout ledger rows.

use bigdecimal::BigDecimal;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::audit::{ENTITY_TRANSACTION, ENTITY_WITHDRAWAL};
use crate::domain::{AuditEntry, Transaction, WithdrawalRequest};
use crate::error::AppError;
use crate::ports::{Store, UnitOfWork};
use crate::validation::{
    sanitize_string, validate_max_len, validate_money_scale, validate_positive_amount,
    NOTES_MAX_LEN,
};

use super::audit_value;

pub struct WithdrawalService {
    store: Arc<dyn Store>,
    currency: String,
}

fn clean_notes(notes: Option<String>) -> Result<Option<String>, AppError> {
    let notes = notes.map(|n| sanitize_string(&n)).filter(|n| !n.is_empty());
    if let Some(n) = &notes {
        validate_max_len("notes", n, NOTES_MAX_LEN)?;
    }
    Ok(notes)
}

async fn lock_request(uow: &mut dyn UnitOfWork, id: Uuid) -> Result<WithdrawalRequest, AppError> {
    uow.lock_withdrawal(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("withdrawal request {}", id)))
}

impl WithdrawalService {
    pub fn new(store: Arc<dyn Store>, currency: String) -> Self {
        Self { store, currency }
    }

    pub async fn available_balance(&self, instructor_id: Uuid) -> Result<BigDecimal, AppError> {
        let mut uow = self.store.begin().await?;
        Ok(uow.available_balance(instructor_id).await?)
    }

    pub async fn request(
        &self,
        instructor_id: Uuid,
        amount: BigDecimal,
        payment_method_id: Uuid,
    ) -> Result<WithdrawalRequest, AppError> {
        validate_positive_amount("amount", &amount)?;
        validate_money_scale("amount", &amount)?;

        let mut uow = self.store.begin().await?;
        uow.lock_instructor_balance(instructor_id).await?;
        let available = uow.available_balance(instructor_id).await?;
        if amount > available {
            tracing::warn!(
                user_id = %instructor_id,
                requested = %amount,
                available = %available,
                "withdrawal exceeds available balance"
            );
            return Err(AppError::PreconditionFailed(format!(
                "requested {} exceeds available balance {}",
                amount, available
            )));
        }

        let request = uow
            .insert_withdrawal(&WithdrawalRequest::new(instructor_id, amount, payment_method_id))
            .await?;
        uow.record_audit(&AuditEntry::created(
            request.id,
            ENTITY_WITHDRAWAL,
            audit_value(&request),
            instructor_id.to_string(),
        ))
        .await?;
        uow.commit().await?;

        tracing::info!(
            withdrawal_id = %request.id,
            amount = %request.amount,
            "withdrawal requested"
        );
        Ok(request)
    }

    /// Approves a pending request and books the payout.
    pub async fn approve(
        &self,
        id: Uuid,
        admin_id: Uuid,
        notes: Option<String>,
    ) -> Result<(WithdrawalRequest, Transaction), AppError> {
        let notes = clean_notes(notes)?;
        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let mut request = lock_request(uow.as_mut(), id).await?;
        let before = request.clone();
        let payout = request.approve(admin_id, notes, &self.currency, now).map_err(|e| {
            tracing::warn!(withdrawal_id = %id, error = %e, "approval rejected");
            e
        })?;

        // Refunds since the request may have eaten into the earnings it was drawn on.
        uow.lock_instructor_balance(request.user_id).await?;
        let available = uow.available_balance(request.user_id).await?;
        if available < BigDecimal::from(0) {
            let shortfall = -available;
            tracing::warn!(
                withdrawal_id = %id,
                user_id = %request.user_id,
                shortfall = %shortfall,
                "approval exceeds available balance"
            );
            return Err(AppError::PreconditionFailed(format!(
                "withdrawal {} exceeds available balance by {}",
                id, shortfall
            )));
        }

        let payout = uow.insert_transaction(&payout).await?;
        uow.update_withdrawal(&request).await?;
        uow.record_audit(&AuditEntry::updated(
            id,
            ENTITY_WITHDRAWAL,
            audit_value(&before),
            audit_value(&request),
            admin_id.to_string(),
        ))
        .await?;
        uow.record_audit(&AuditEntry::created(
            payout.id,
            ENTITY_TRANSACTION,
            audit_value(&payout),
            admin_id.to_string(),
        ))
        .await?;
        uow.commit().await?;

        tracing::info!(
            withdrawal_id = %id,
            payout_id = %payout.id,
            amount = %request.amount,
            "withdrawal approved"
        );
        Ok((request, payout))
    }

    pub async fn reject(
        &self,
        id: Uuid,
        admin_id: Uuid,
        notes: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        let notes = clean_notes(notes)?;
        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let mut request = lock_request(uow.as_mut(), id).await?;
        let before = request.clone();
        request.reject(admin_id, notes, now)?;

        uow.update_withdrawal(&request).await?;
        uow.record_audit(&AuditEntry::updated(
            id,
            ENTITY_WITHDRAWAL,
            audit_value(&before),
            audit_value(&request),
            admin_id.to_string(),
        ))
        .await?;
        uow.commit().await?;

        tracing::info!(withdrawal_id = %id, "withdrawal rejected");
        Ok(request)
    }

    /// Records that an approved payout has left the platform.
    pub async fn mark_processed(
        &self,
        id: Uuid,
        admin_id: Uuid,
        notes: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        let notes = clean_notes(notes)?;
        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let mut request = lock_request(uow.as_mut(), id).await?;
        let before = request.clone();
        request.mark_processed(admin_id, notes, now)?;

        uow.update_withdrawal(&request).await?;
        uow.record_audit(&AuditEntry::updated(
            id,
            ENTITY_WITHDRAWAL,
            audit_value(&before),
            audit_value(&request),
            admin_id.to_string(),
        ))
        .await?;
        uow.commit().await?;

        tracing::info!(withdrawal_id = %id, "withdrawal processed");
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::transaction::NewPurchase;
    use crate::domain::{Course, TransactionStatus, TransactionType, WithdrawalStatus};

    async fn instructor_with_earnings(earned: i64) -> (InMemoryStore, Uuid) {
        let store = InMemoryStore::new();
        let instructor = Uuid::new_v4();
        let course = Course {
            id: Uuid::new_v4(),
            instructor_id: instructor,
            title: "Systems Programming".to_string(),
            price: BigDecimal::from(100),
            is_published: true,
        };
        store.insert_course(course.clone()).await;
        store
            .insert_transaction(Transaction::purchase(
                NewPurchase {
                    user_id: Uuid::new_v4(),
                    course_id: course.id,
                    transaction_id: "ORDER-1".to_string(),
                    amount: BigDecimal::from(earned * 2),
                    instructor_amount: BigDecimal::from(earned),
                    currency: "USD".to_string(),
                    payment_method: "credit_card".to_string(),
                    promo_code_id: None,
                    discount_amount: BigDecimal::from(0),
                },
                Utc::now(),
            ))
            .await;
        (store, instructor)
    }

    fn service(store: &InMemoryStore) -> WithdrawalService {
        WithdrawalService::new(Arc::new(store.clone()), "USD".to_string())
    }

    #[tokio::test]
    async fn approving_200_creates_negated_payout() {
        let (store, instructor) = instructor_with_earnings(500).await;
        let service = service(&store);
        let admin = Uuid::new_v4();

        let request = service
            .request(instructor, BigDecimal::from(200), Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(service.available_balance(instructor).await.unwrap(), BigDecimal::from(300));

        let (approved, payout) = service
            .approve(request.id, admin, Some("  paid via bank ".to_string()))
            .await
            .unwrap();

        assert_eq!(approved.status, WithdrawalStatus::Approved);
        assert_eq!(approved.processed_by, Some(admin));
        assert_eq!(approved.notes.as_deref(), Some("paid via bank"));
        assert_eq!(payout.amount, BigDecimal::from(-200));
        assert_eq!(payout.instructor_amount, BigDecimal::from(-200));
        assert_eq!(payout.tx_type, TransactionType::Payout);
        assert_eq!(payout.status, TransactionStatus::Completed);
        assert_eq!(payout.transaction_id, format!("PAYOUT-{}", request.id));
        assert_eq!(payout.payment_method, "withdrawal");
        assert!(payout.course_id.is_none());

        // Approved requests still count against the balance; payouts do not double count.
        assert_eq!(service.available_balance(instructor).await.unwrap(), BigDecimal::from(300));

        let err = service.approve(request.id, admin, None).await.unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
        let payouts = store
            .snapshot()
            .await
            .transactions
            .iter()
            .filter(|t| t.tx_type == TransactionType::Payout)
            .count();
        assert_eq!(payouts, 1);
    }

    #[tokio::test]
    async fn request_is_bounded_by_available_balance() {
        let (store, instructor) = instructor_with_earnings(100).await;
        let service = service(&store);

        let err = service
            .request(instructor, BigDecimal::from(101), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));

        let err = service
            .request(instructor, BigDecimal::from(0), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        service
            .request(instructor, BigDecimal::from(60), Uuid::new_v4())
            .await
            .unwrap();
        let err = service
            .request(instructor, BigDecimal::from(60), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn approval_rechecks_balance_after_refund() {
        let (store, instructor) = instructor_with_earnings(100).await;
        let service = service(&store);

        let request = service
            .request(instructor, BigDecimal::from(80), Uuid::new_v4())
            .await
            .unwrap();

        // half the earnings are refunded while the request waits for review
        let course_id = store.snapshot().await.transactions[0].course_id;
        let mut refund = Transaction::purchase(
            NewPurchase {
                user_id: Uuid::new_v4(),
                course_id: course_id.unwrap(),
                transaction_id: "REFUND-ORDER-1".to_string(),
                amount: BigDecimal::from(-100),
                instructor_amount: BigDecimal::from(-50),
                currency: "USD".to_string(),
                payment_method: "credit_card".to_string(),
                promo_code_id: None,
                discount_amount: BigDecimal::from(0),
            },
            Utc::now(),
        );
        refund.tx_type = TransactionType::Refund;
        store.insert_transaction(refund).await;
        assert_eq!(service.available_balance(instructor).await.unwrap(), BigDecimal::from(-30));

        let err = service.approve(request.id, Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));

        let state = store.snapshot().await;
        assert_eq!(state.withdrawals[&request.id].status, WithdrawalStatus::Pending);
        assert!(state.transactions.iter().all(|t| t.tx_type != TransactionType::Payout));
    }

    #[tokio::test]
    async fn rejected_request_frees_balance_and_books_nothing() {
        let (store, instructor) = instructor_with_earnings(100).await;
        let service = service(&store);
        let admin = Uuid::new_v4();

        let request = service
            .request(instructor, BigDecimal::from(100), Uuid::new_v4())
            .await
            .unwrap();
        let rejected = service
            .reject(request.id, admin, Some("missing tax form".to_string()))
            .await
            .unwrap();

        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert_eq!(service.available_balance(instructor).await.unwrap(), BigDecimal::from(100));
        assert!(service.approve(request.id, admin, None).await.is_err());
        assert_eq!(store.snapshot().await.transactions.len(), 1);
    }

    #[tokio::test]
    async fn only_approved_requests_can_be_processed() {
        let (store, instructor) = instructor_with_earnings(100).await;
        let service = service(&store);
        let admin = Uuid::new_v4();

        let request = service
            .request(instructor, BigDecimal::from(40), Uuid::new_v4())
            .await
            .unwrap();
        let err = service.mark_processed(request.id, admin, None).await.unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));

        service.approve(request.id, admin, None).await.unwrap();
        let processed = service.mark_processed(request.id, admin, None).await.unwrap();
        assert_eq!(processed.status, WithdrawalStatus::Processed);

        let err = service.approve(Uuid::new_v4(), admin, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
