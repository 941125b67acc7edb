//! In-memory implementation of the storage ports.
//!
//! A unit of work holds the store lock for its whole lifetime and mutates a
//! private copy of the state; `commit` publishes the copy. Units of work are
//! therefore serialised, which matches the row locks the Postgres adapter takes.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    AuditEntry, Checkout, CheckoutState, Course, Enrollment, PromoCode, Transaction,
    TransactionStatus, TransactionType, WithdrawalRequest, WithdrawalStatus,
};
use crate::ports::{RepositoryError, RepositoryResult, Store, UnitOfWork};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub courses: HashMap<Uuid, Course>,
    pub promo_codes: HashMap<Uuid, PromoCode>,
    pub enrollments: Vec<Enrollment>,
    pub checkouts: HashMap<Uuid, Checkout>,
    pub transactions: Vec<Transaction>,
    pub withdrawals: HashMap<Uuid, WithdrawalRequest>,
    pub audit_log: Vec<AuditEntry>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_course(&self, course: Course) {
        self.state.lock().await.courses.insert(course.id, course);
    }

    pub async fn insert_promo_code(&self, promo: PromoCode) {
        self.state.lock().await.promo_codes.insert(promo.id, promo);
    }

    pub async fn insert_transaction(&self, tx: Transaction) {
        self.state.lock().await.transactions.push(tx);
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }
}

pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn not_found(what: &str, id: Uuid) -> RepositoryError {
    RepositoryError::NotFound(format!("{} {}", what, id))
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn find_course(&mut self, id: Uuid) -> RepositoryResult<Option<Course>> {
        Ok(self.working.courses.get(&id).cloned())
    }

    async fn find_promo_code(&mut self, code: &str) -> RepositoryResult<Option<PromoCode>> {
        Ok(self
            .working
            .promo_codes
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn lock_promo_code(&mut self, id: Uuid) -> RepositoryResult<Option<PromoCode>> {
        Ok(self.working.promo_codes.get(&id).cloned())
    }

    async fn insert_promo_code(&mut self, promo: &PromoCode) -> RepositoryResult<PromoCode> {
        if self.working.promo_codes.values().any(|p| p.code == promo.code) {
            return Err(RepositoryError::Conflict(format!(
                "promo code {} already exists",
                promo.code
            )));
        }
        self.working.promo_codes.insert(promo.id, promo.clone());
        Ok(promo.clone())
    }

    async fn set_promo_code_active(&mut self, id: Uuid, is_active: bool) -> RepositoryResult<()> {
        let promo = self
            .working
            .promo_codes
            .get_mut(&id)
            .ok_or_else(|| not_found("promo code", id))?;
        promo.is_active = is_active;
        promo.updated_at = Utc::now();
        Ok(())
    }

    async fn promo_code_in_use(&mut self, id: Uuid) -> RepositoryResult<bool> {
        Ok(self
            .working
            .transactions
            .iter()
            .any(|tx| tx.promo_code_id == Some(id)))
    }

    async fn delete_promo_code(&mut self, id: Uuid) -> RepositoryResult<()> {
        if self.promo_code_in_use(id).await? {
            return Err(RepositoryError::Conflict(format!(
                "promo code {} is referenced by transactions",
                id
            )));
        }
        self.working
            .promo_codes
            .remove(&id)
            .ok_or_else(|| not_found("promo code", id))?;
        for checkout in self.working.checkouts.values_mut() {
            if checkout.promo_code_id == Some(id) && checkout.state != CheckoutState::Completed {
                checkout.promo_code_id = None;
            }
        }
        Ok(())
    }

    async fn redeem_promo_code(&mut self, id: Uuid) -> RepositoryResult<bool> {
        let Some(promo) = self.working.promo_codes.get_mut(&id) else {
            return Ok(false);
        };
        if matches!(promo.max_uses, Some(max) if promo.used_count >= max) {
            return Ok(false);
        }
        promo.used_count += 1;
        promo.updated_at = Utc::now();
        Ok(true)
    }

    async fn is_enrolled(&mut self, user_id: Uuid, course_id: Uuid) -> RepositoryResult<bool> {
        Ok(self
            .working
            .enrollments
            .iter()
            .any(|e| e.user_id == user_id && e.course_id == course_id))
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> RepositoryResult<Enrollment> {
        if let Some(existing) = self
            .working
            .enrollments
            .iter()
            .find(|e| e.user_id == enrollment.user_id && e.course_id == enrollment.course_id)
        {
            return Ok(existing.clone());
        }
        self.working.enrollments.push(enrollment.clone());
        Ok(enrollment.clone())
    }

    async fn delete_enrollment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> RepositoryResult<Option<Enrollment>> {
        let position = self
            .working
            .enrollments
            .iter()
            .position(|e| e.user_id == user_id && e.course_id == course_id);
        Ok(position.map(|index| self.working.enrollments.remove(index)))
    }

    async fn insert_checkout(&mut self, checkout: &Checkout) -> RepositoryResult<Checkout> {
        if self
            .working
            .checkouts
            .values()
            .any(|c| c.order_id == checkout.order_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "order {} already exists",
                checkout.order_id
            )));
        }
        self.working.checkouts.insert(checkout.id, checkout.clone());
        Ok(checkout.clone())
    }

    async fn lock_checkout_by_order(
        &mut self,
        order_id: &str,
    ) -> RepositoryResult<Option<Checkout>> {
        Ok(self
            .working
            .checkouts
            .values()
            .find(|c| c.order_id == order_id)
            .cloned())
    }

    async fn transition_checkout(
        &mut self,
        id: Uuid,
        from: CheckoutState,
        to: CheckoutState,
    ) -> RepositoryResult<bool> {
        match self.working.checkouts.get_mut(&id) {
            Some(checkout) if checkout.state == from => {
                checkout.state = to;
                checkout.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_payment_url(&mut self, id: Uuid, url: &str) -> RepositoryResult<Option<Checkout>> {
        Ok(self.working.checkouts.get_mut(&id).map(|checkout| {
            checkout.payment_url = Some(url.to_string());
            checkout.updated_at = Utc::now();
            checkout.clone()
        }))
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> RepositoryResult<Transaction> {
        if self
            .working
            .transactions
            .iter()
            .any(|t| t.transaction_id == tx.transaction_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} already exists",
                tx.transaction_id
            )));
        }
        self.working.transactions.push(tx.clone());
        Ok(tx.clone())
    }

    async fn lock_transaction(&mut self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        Ok(self
            .working
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn update_transaction_kind(
        &mut self,
        id: Uuid,
        tx_type: TransactionType,
        status: TransactionStatus,
    ) -> RepositoryResult<()> {
        let tx = self
            .working
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found("transaction", id))?;
        tx.tx_type = tx_type;
        tx.status = status;
        tx.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_withdrawal(
        &mut self,
        request: &WithdrawalRequest,
    ) -> RepositoryResult<WithdrawalRequest> {
        self.working.withdrawals.insert(request.id, request.clone());
        Ok(request.clone())
    }

    async fn lock_withdrawal(&mut self, id: Uuid) -> RepositoryResult<Option<WithdrawalRequest>> {
        Ok(self.working.withdrawals.get(&id).cloned())
    }

    async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> RepositoryResult<()> {
        let stored = self
            .working
            .withdrawals
            .get_mut(&request.id)
            .ok_or_else(|| not_found("withdrawal request", request.id))?;
        *stored = request.clone();
        Ok(())
    }

    async fn lock_instructor_balance(&mut self, _instructor_id: Uuid) -> RepositoryResult<()> {
        // the unit of work already holds the store lock
        Ok(())
    }

    async fn available_balance(&mut self, instructor_id: Uuid) -> RepositoryResult<BigDecimal> {
        let state = &self.working;
        let earned = state
            .transactions
            .iter()
            .filter(|t| matches!(t.tx_type, TransactionType::Purchase | TransactionType::Refund))
            .filter(|t| {
                matches!(t.status, TransactionStatus::Completed | TransactionStatus::Refunded)
            })
            .filter(|t| {
                t.course_id
                    .and_then(|course_id| state.courses.get(&course_id))
                    .map_or(false, |course| course.instructor_id == instructor_id)
            })
            .fold(BigDecimal::from(0), |acc, t| acc + &t.instructor_amount);

        let requested = state
            .withdrawals
            .values()
            .filter(|w| w.user_id == instructor_id)
            .filter(|w| {
                matches!(
                    w.status,
                    WithdrawalStatus::Pending
                        | WithdrawalStatus::Approved
                        | WithdrawalStatus::Processed
                )
            })
            .fold(BigDecimal::from(0), |acc, w| acc + &w.amount);

        Ok(earned - requested)
    }

    async fn record_audit(&mut self, entry: &AuditEntry) -> RepositoryResult<()> {
        self.working.audit_log.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::promo::tests::promo;
    use crate::domain::{CheckoutTotals, DiscountType};

    #[tokio::test]
    async fn dropped_unit_of_work_discards_writes() {
        let store = InMemoryStore::new();
        let code = promo("SAVE10", DiscountType::Percentage, 10);
        store.insert_promo_code(code.clone()).await;

        {
            let mut uow = store.begin().await.unwrap();
            assert!(uow.redeem_promo_code(code.id).await.unwrap());
        }

        let state = store.snapshot().await;
        assert_eq!(state.promo_codes[&code.id].used_count, 0);
    }

    #[tokio::test]
    async fn committed_unit_of_work_is_visible() {
        let store = InMemoryStore::new();
        let code = promo("SAVE10", DiscountType::Percentage, 10);
        store.insert_promo_code(code.clone()).await;

        let mut uow = store.begin().await.unwrap();
        assert!(uow.redeem_promo_code(code.id).await.unwrap());
        uow.commit().await.unwrap();

        let state = store.snapshot().await;
        assert_eq!(state.promo_codes[&code.id].used_count, 1);
    }

    #[tokio::test]
    async fn redeem_stops_at_max_uses() {
        let store = InMemoryStore::new();
        let mut code = promo("ONCE", DiscountType::Fixed, 5);
        code.max_uses = Some(1);
        store.insert_promo_code(code.clone()).await;

        let mut uow = store.begin().await.unwrap();
        assert!(uow.redeem_promo_code(code.id).await.unwrap());
        assert!(!uow.redeem_promo_code(code.id).await.unwrap());
    }

    #[tokio::test]
    async fn enrollment_insert_returns_existing_row() {
        let store = InMemoryStore::new();
        let (user, course) = (Uuid::new_v4(), Uuid::new_v4());

        let mut uow = store.begin().await.unwrap();
        let enrollment = Enrollment::new(user, course, Utc::now());
        let first = uow.insert_enrollment(&enrollment).await.unwrap();
        let second = uow
            .insert_enrollment(&Enrollment::new(user, course, Utc::now()))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(uow.is_enrolled(user, course).await.unwrap());

        let removed = uow.delete_enrollment(user, course).await.unwrap();
        assert_eq!(removed.map(|e| e.id), Some(first.id));
        assert!(uow.delete_enrollment(user, course).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkout_transition_requires_expected_state() {
        let store = InMemoryStore::new();
        let totals = CheckoutTotals {
            subtotal: BigDecimal::from(10),
            discount: BigDecimal::from(0),
            tax: BigDecimal::from(0),
            total: BigDecimal::from(10),
        };
        let checkout = Checkout::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            &totals,
            BigDecimal::from(7),
            "USD",
        );

        let mut uow = store.begin().await.unwrap();
        uow.insert_checkout(&checkout).await.unwrap();
        let (pending, completed, failed) = (
            CheckoutState::PaymentPending,
            CheckoutState::Completed,
            CheckoutState::Failed,
        );
        assert!(uow.transition_checkout(checkout.id, pending, completed).await.unwrap());
        assert!(!uow.transition_checkout(checkout.id, pending, failed).await.unwrap());

        let updated = uow.set_payment_url(checkout.id, "https://pay/1").await.unwrap().unwrap();
        assert_eq!(updated.state, CheckoutState::Completed);
        assert_eq!(updated.payment_url.as_deref(), Some("https://pay/1"));
    }
}
