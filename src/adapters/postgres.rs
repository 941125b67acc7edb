//! Postgres implementation of the storage ports.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::audit::AuditLog;
use crate::db::models::{
    CheckoutRow, CourseRow, EnrollmentRow, PromoCodeRow, TransactionRow, WithdrawalRow,
};
use crate::db::queries::TRANSACTION_COLUMNS;
use crate::domain::{
    AuditEntry, Checkout, CheckoutState, Course, Enrollment, PromoCode, Transaction,
    TransactionStatus, TransactionType, WithdrawalRequest,
};
use crate::ports::{RepositoryError, RepositoryResult, Store, UnitOfWork};

/// Postgres-backed store. Each unit of work is one database transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

/// Rolls back on drop unless committed.
pub struct PostgresUnitOfWork {
    tx: SqlxTransaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn find_course(&mut self, id: Uuid) -> RepositoryResult<Option<Course>> {
        let row = sqlx::query_as::<_, CourseRow>(
            "SELECT id, instructor_id, title, price, is_published FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Course::from))
    }

    async fn find_promo_code(&mut self, code: &str) -> RepositoryResult<Option<PromoCode>> {
        let row = sqlx::query_as::<_, PromoCodeRow>("SELECT * FROM promo_codes WHERE code = $1")
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(PromoCodeRow::into_domain).transpose()
    }

    async fn lock_promo_code(&mut self, id: Uuid) -> RepositoryResult<Option<PromoCode>> {
        let row = sqlx::query_as::<_, PromoCodeRow>(
            "SELECT * FROM promo_codes WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(PromoCodeRow::into_domain).transpose()
    }

    async fn insert_promo_code(&mut self, promo: &PromoCode) -> RepositoryResult<PromoCode> {
        let row = sqlx::query_as::<_, PromoCodeRow>(
            r#"
            INSERT INTO promo_codes (
                id, code, discount_type, discount_value, start_date, end_date,
                max_uses, used_count, min_cart_value, is_active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(promo.id)
        .bind(&promo.code)
        .bind(promo.discount_type.as_str())
        .bind(&promo.discount_value)
        .bind(promo.start_date)
        .bind(promo.end_date)
        .bind(promo.max_uses)
        .bind(promo.used_count)
        .bind(&promo.min_cart_value)
        .bind(promo.is_active)
        .bind(promo.created_at)
        .bind(promo.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;

        row.into_domain()
    }

    async fn set_promo_code_active(&mut self, id: Uuid, is_active: bool) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE promo_codes SET is_active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(is_active)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("promo code {}", id)));
        }
        Ok(())
    }

    async fn promo_code_in_use(&mut self, id: Uuid) -> RepositoryResult<bool> {
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM transactions WHERE promo_code_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(in_use)
    }

    async fn delete_promo_code(&mut self, id: Uuid) -> RepositoryResult<()> {
        // Abandoned checkouts may still point at the code.
        sqlx::query(
            "UPDATE checkouts SET promo_code_id = NULL \
             WHERE promo_code_id = $1 AND state <> 'completed'",
        )
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        let result = sqlx::query("DELETE FROM promo_codes WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("promo code {}", id)));
        }
        Ok(())
    }

    async fn redeem_promo_code(&mut self, id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE promo_codes
            SET used_count = used_count + 1, updated_at = NOW()
            WHERE id = $1 AND (max_uses IS NULL OR used_count < max_uses)
            "#,
        )
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_enrolled(&mut self, user_id: Uuid, course_id: Uuid) -> RepositoryResult<bool> {
        let enrolled: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM enrollments WHERE user_id = $1 AND course_id = $2)",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(enrolled)
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> RepositoryResult<Enrollment> {
        let inserted = sqlx::query_as::<_, EnrollmentRow>(
            r#"
            INSERT INTO enrollments (id, user_id, course_id, enrolled_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, course_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.user_id)
        .bind(enrollment.course_id)
        .bind(enrollment.enrolled_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        let row = match inserted {
            Some(row) => row,
            None => {
                sqlx::query_as::<_, EnrollmentRow>(
                    "SELECT * FROM enrollments WHERE user_id = $1 AND course_id = $2",
                )
                .bind(enrollment.user_id)
                .bind(enrollment.course_id)
                .fetch_one(&mut *self.tx)
                .await?
            }
        };

        Ok(row.into())
    }

    async fn delete_enrollment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> RepositoryResult<Option<Enrollment>> {
        let row = sqlx::query_as::<_, EnrollmentRow>(
            "DELETE FROM enrollments WHERE user_id = $1 AND course_id = $2 RETURNING *",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert_checkout(&mut self, checkout: &Checkout) -> RepositoryResult<Checkout> {
        let row = sqlx::query_as::<_, CheckoutRow>(
            r#"
            INSERT INTO checkouts (
                id, order_id, user_id, course_id, promo_code_id, subtotal, discount_amount,
                tax_amount, total, instructor_amount, currency, state, payment_url,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(checkout.id)
        .bind(&checkout.order_id)
        .bind(checkout.user_id)
        .bind(checkout.course_id)
        .bind(checkout.promo_code_id)
        .bind(&checkout.subtotal)
        .bind(&checkout.discount_amount)
        .bind(&checkout.tax_amount)
        .bind(&checkout.total)
        .bind(&checkout.instructor_amount)
        .bind(&checkout.currency)
        .bind(checkout.state.as_str())
        .bind(&checkout.payment_url)
        .bind(checkout.created_at)
        .bind(checkout.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;

        row.into_domain()
    }

    async fn lock_checkout_by_order(
        &mut self,
        order_id: &str,
    ) -> RepositoryResult<Option<Checkout>> {
        let row = sqlx::query_as::<_, CheckoutRow>(
            "SELECT * FROM checkouts WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(CheckoutRow::into_domain).transpose()
    }

    async fn transition_checkout(
        &mut self,
        id: Uuid,
        from: CheckoutState,
        to: CheckoutState,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE checkouts SET state = $3, updated_at = NOW() WHERE id = $1 AND state = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_payment_url(&mut self, id: Uuid, url: &str) -> RepositoryResult<Option<Checkout>> {
        let row = sqlx::query_as::<_, CheckoutRow>(
            "UPDATE checkouts SET payment_url = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(url)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(CheckoutRow::into_domain).transpose()
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, user_id, course_id, transaction_id, amount, instructor_amount, currency,
                payment_method, status, type, paid_at, promo_code_id, discount_amount,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(tx.id)
        .bind(tx.user_id)
        .bind(tx.course_id)
        .bind(&tx.transaction_id)
        .bind(&tx.amount)
        .bind(&tx.instructor_amount)
        .bind(&tx.currency)
        .bind(&tx.payment_method)
        .bind(tx.status.as_str())
        .bind(tx.tx_type.as_str())
        .bind(tx.paid_at)
        .bind(tx.promo_code_id)
        .bind(&tx.discount_amount)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;

        row.into_domain()
    }

    async fn lock_transaction(&mut self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn update_transaction_kind(
        &mut self,
        id: Uuid,
        tx_type: TransactionType,
        status: TransactionStatus,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE transactions SET type = $2, status = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(tx_type.as_str())
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("transaction {}", id)));
        }
        Ok(())
    }

    async fn insert_withdrawal(
        &mut self,
        request: &WithdrawalRequest,
    ) -> RepositoryResult<WithdrawalRequest> {
        let row = sqlx::query_as::<_, WithdrawalRow>(
            r#"
            INSERT INTO withdrawal_requests (
                id, user_id, amount, payment_method_id, status, processed_by, processed_at,
                notes, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(request.id)
        .bind(request.user_id)
        .bind(&request.amount)
        .bind(request.payment_method_id)
        .bind(request.status.as_str())
        .bind(request.processed_by)
        .bind(request.processed_at)
        .bind(&request.notes)
        .bind(request.created_at)
        .bind(request.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;

        row.into_domain()
    }

    async fn lock_withdrawal(&mut self, id: Uuid) -> RepositoryResult<Option<WithdrawalRequest>> {
        let row = sqlx::query_as::<_, WithdrawalRow>(
            "SELECT * FROM withdrawal_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(WithdrawalRow::into_domain).transpose()
    }

    async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE withdrawal_requests
            SET status = $2, processed_by = $3, processed_at = $4, notes = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(request.processed_by)
        .bind(request.processed_at)
        .bind(&request.notes)
        .bind(request.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn lock_instructor_balance(&mut self, instructor_id: Uuid) -> RepositoryResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(instructor_id.to_string())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn available_balance(&mut self, instructor_id: Uuid) -> RepositoryResult<BigDecimal> {
        let balance: BigDecimal = sqlx::query_scalar(
            r#"
            SELECT
                COALESCE((
                    SELECT SUM(t.instructor_amount)
                    FROM transactions t
                    JOIN courses c ON c.id = t.course_id
                    WHERE c.instructor_id = $1
                      AND t.type IN ('purchase', 'refund')
                      AND t.status IN ('completed', 'refunded')
                ), 0)
                - COALESCE((
                    SELECT SUM(w.amount)
                    FROM withdrawal_requests w
                    WHERE w.user_id = $1
                      AND w.status IN ('pending', 'approved', 'processed')
                ), 0)
            "#,
        )
        .bind(instructor_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(balance)
    }

    async fn record_audit(&mut self, entry: &AuditEntry) -> RepositoryResult<()> {
        AuditLog::record(&mut *self.tx, entry).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
