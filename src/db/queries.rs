//! Read-side queries for reporting and administration. State changes go
//! through `ports::UnitOfWork`; nothing in here writes.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::models::{collect_domain, PromoCodeRow, TransactionRow, WithdrawalRow};
use crate::domain::{
    PromoCode, Transaction, TransactionStatus, TransactionType, WithdrawalRequest,
    WithdrawalStatus,
};
use crate::ports::RepositoryResult;

pub const TRANSACTION_COLUMNS: &str = "id, user_id, course_id, transaction_id, amount, \
     instructor_amount, currency, payment_method, status, type, paid_at, promo_code_id, \
     discount_amount, created_at, updated_at";

/// Reporting filter over the ledger. Date bounds are `[from, to)`.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub user_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    pub tx_type: Option<TransactionType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    /// Appends `WHERE` conditions; always leaves the builder ready for more `AND` clauses.
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE TRUE");

        if let Some(user_id) = self.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(course_id) = self.course_id {
            qb.push(" AND course_id = ").push_bind(course_id);
        }
        if let Some(status) = self.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(tx_type) = self.tx_type {
            qb.push(" AND type = ").push_bind(tx_type.as_str());
        }
        if let Some(from) = self.from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = self.to {
            qb.push(" AND created_at < ").push_bind(to);
        }
    }
}

// --- Transaction Queries ---

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> RepositoryResult<Option<Transaction>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {} FROM transactions WHERE id = $1",
        TRANSACTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(TransactionRow::into_domain).transpose()
}

/// Newest first, keyset-paginated on `(created_at, id)`.
pub async fn list_transactions(
    pool: &PgPool,
    filter: &TransactionFilter,
    after: Option<(DateTime<Utc>, Uuid)>,
    limit: i64,
) -> RepositoryResult<Vec<Transaction>> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM transactions",
        TRANSACTION_COLUMNS
    ));
    filter.push_conditions(&mut qb);

    if let Some((created_at, id)) = after {
        qb.push(" AND (created_at, id) < (")
            .push_bind(created_at)
            .push(", ")
            .push_bind(id)
            .push(")");
    }

    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit);

    let rows = qb
        .build_query_as::<TransactionRow>()
        .fetch_all(pool)
        .await?;

    collect_domain(rows, TransactionRow::into_domain)
}

/// One export batch in `id` order, starting after `after_id`.
pub async fn transaction_batch(
    pool: &PgPool,
    filter: &TransactionFilter,
    after_id: Option<Uuid>,
    batch_size: i64,
) -> RepositoryResult<Vec<Transaction>> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM transactions",
        TRANSACTION_COLUMNS
    ));
    filter.push_conditions(&mut qb);

    if let Some(id) = after_id {
        qb.push(" AND id > ").push_bind(id);
    }
    qb.push(" ORDER BY id ASC LIMIT ").push_bind(batch_size);

    let rows = qb
        .build_query_as::<TransactionRow>()
        .fetch_all(pool)
        .await?;

    collect_domain(rows, TransactionRow::into_domain)
}

// --- Promo Code Queries ---

pub async fn get_promo_code(pool: &PgPool, id: Uuid) -> RepositoryResult<Option<PromoCode>> {
    let row = sqlx::query_as::<_, PromoCodeRow>("SELECT * FROM promo_codes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(PromoCodeRow::into_domain).transpose()
}

pub async fn list_promo_codes(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> RepositoryResult<Vec<PromoCode>> {
    let rows = sqlx::query_as::<_, PromoCodeRow>(
        "SELECT * FROM promo_codes ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    collect_domain(rows, PromoCodeRow::into_domain)
}

// --- Withdrawal Queries ---

pub async fn list_withdrawals(
    pool: &PgPool,
    status: Option<WithdrawalStatus>,
    user_id: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> RepositoryResult<Vec<WithdrawalRequest>> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM withdrawal_requests WHERE TRUE");
    if let Some(status) = status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(user_id) = user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build_query_as::<WithdrawalRow>().fetch_all(pool).await?;

    collect_domain(rows, WithdrawalRow::into_domain)
}

// --- Audit Log Queries ---

/// `(id, entity_type, action, old_val, new_val, actor, created_at)`
pub type AuditLogRow = (
    Uuid,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    DateTime<Utc>,
);

pub async fn get_audit_logs(
    pool: &PgPool,
    entity_id: Uuid,
    limit: i64,
    offset: i64,
) -> RepositoryResult<Vec<AuditLogRow>> {
    let rows = sqlx::query_as(
        r#"
        SELECT id, entity_type, action,
               old_val::text, new_val::text, actor, timestamp
        FROM audit_logs
        WHERE entity_id = $1
        ORDER BY timestamp DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(entity_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
