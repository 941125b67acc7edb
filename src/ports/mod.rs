//! Storage ports for the settlement flow.
//!
//! Every state-changing operation opens one [`UnitOfWork`] from a [`Store`],
//! performs its reads and writes through it, and calls
//! [`UnitOfWork::commit`]. Dropping a unit of work without committing
//! discards every write made through it.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    AuditEntry, Checkout, CheckoutState, Course, Enrollment, PromoCode, Transaction,
    TransactionStatus, TransactionType, WithdrawalRequest,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("integrity conflict: {0}")]
    Conflict(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Postgres `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) | Some(FOREIGN_KEY_VIOLATION) => {
                    RepositoryError::Conflict(db_err.message().to_string())
                }
                _ => RepositoryError::Database(err.to_string()),
            },
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Opens units of work against the relational store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>>;
}

/// One atomic, request-scoped database transaction.
///
/// `lock_*` methods take a row lock that is held until the unit of work
/// commits or is dropped.
#[async_trait]
pub trait UnitOfWork: Send {
    // --- catalog ---
    async fn find_course(&mut self, id: Uuid) -> RepositoryResult<Option<Course>>;

    // --- promo codes ---
    /// Looks a code up by its normalised (upper-case) form.
    async fn find_promo_code(&mut self, code: &str) -> RepositoryResult<Option<PromoCode>>;
    async fn lock_promo_code(&mut self, id: Uuid) -> RepositoryResult<Option<PromoCode>>;
    async fn insert_promo_code(&mut self, promo: &PromoCode) -> RepositoryResult<PromoCode>;
    async fn set_promo_code_active(&mut self, id: Uuid, is_active: bool) -> RepositoryResult<()>;
    async fn promo_code_in_use(&mut self, id: Uuid) -> RepositoryResult<bool>;
    async fn delete_promo_code(&mut self, id: Uuid) -> RepositoryResult<()>;
    /// Consumes one use if the cap allows it. Returns `false` when the code is exhausted.
    async fn redeem_promo_code(&mut self, id: Uuid) -> RepositoryResult<bool>;

    // --- enrollments ---
    async fn is_enrolled(&mut self, user_id: Uuid, course_id: Uuid) -> RepositoryResult<bool>;
    /// Inserts the enrollment, or returns the existing one for the same user and course.
    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> RepositoryResult<Enrollment>;
    /// Removes the enrollment and returns the deleted row, if there was one.
    async fn delete_enrollment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> RepositoryResult<Option<Enrollment>>;

    // --- checkouts ---
    async fn insert_checkout(&mut self, checkout: &Checkout) -> RepositoryResult<Checkout>;
    async fn lock_checkout_by_order(
        &mut self,
        order_id: &str,
    ) -> RepositoryResult<Option<Checkout>>;
    /// Moves the checkout from `from` to `to`. Returns `false` and leaves the
    /// row alone when it is no longer in `from`.
    async fn transition_checkout(
        &mut self,
        id: Uuid,
        from: CheckoutState,
        to: CheckoutState,
    ) -> RepositoryResult<bool>;
    /// Stores the redirect URL without touching the state; returns the checkout as it is now.
    async fn set_payment_url(&mut self, id: Uuid, url: &str) -> RepositoryResult<Option<Checkout>>;

    // --- ledger ---
    async fn insert_transaction(&mut self, tx: &Transaction) -> RepositoryResult<Transaction>;
    async fn lock_transaction(&mut self, id: Uuid) -> RepositoryResult<Option<Transaction>>;
    async fn update_transaction_kind(
        &mut self,
        id: Uuid,
        tx_type: TransactionType,
        status: TransactionStatus,
    ) -> RepositoryResult<()>;

    // --- withdrawals ---
    async fn insert_withdrawal(
        &mut self,
        request: &WithdrawalRequest,
    ) -> RepositoryResult<WithdrawalRequest>;
    async fn lock_withdrawal(&mut self, id: Uuid) -> RepositoryResult<Option<WithdrawalRequest>>;
    async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> RepositoryResult<()>;
    /// Serialises balance-changing work for one instructor until the unit of work ends.
    async fn lock_instructor_balance(&mut self, instructor_id: Uuid) -> RepositoryResult<()>;
    /// Earnings on the instructor's courses minus everything already requested for withdrawal.
    async fn available_balance(&mut self, instructor_id: Uuid) -> RepositoryResult<BigDecimal>;

    // --- audit ---
    async fn record_audit(&mut self, entry: &AuditEntry) -> RepositoryResult<()>;

    async fn commit(self: Box<Self>) -> RepositoryResult<()>;
}
