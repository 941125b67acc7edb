use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::db::queries::{self, TransactionFilter};
use crate::domain::{Transaction, TransactionStatus, TransactionType};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::utils::cursor;
use crate::AppState;

use super::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Ledger row as exposed over HTTP. Amounts are decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: Uuid,
    pub transaction_id: String,
    pub user_id: Uuid,
    pub course_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub status: String,
    pub amount: String,
    pub instructor_amount: String,
    pub discount_amount: String,
    pub currency: String,
    pub payment_method: String,
    pub promo_code_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionView {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            transaction_id: tx.transaction_id,
            user_id: tx.user_id,
            course_id: tx.course_id,
            tx_type: tx.tx_type.to_string(),
            status: tx.status.to_string(),
            amount: tx.amount.to_string(),
            instructor_amount: tx.instructor_amount.to_string(),
            discount_amount: tx.discount_amount.to_string(),
            currency: tx.currency,
            payment_method: tx.payment_method,
            promo_code_id: tx.promo_code_id,
            paid_at: tx.paid_at,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionQuery {
    pub user_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    /// pending, completed, failed or refunded
    pub status: Option<String>,
    /// purchase, refund or payout
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    /// Inclusive start, `YYYY-MM-DD` or RFC 3339
    pub from: Option<String>,
    /// Inclusive end date, or exclusive RFC 3339 instant
    pub to: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

impl TransactionQuery {
    pub fn filter(&self) -> Result<TransactionFilter, AppError> {
        Ok(TransactionFilter {
            user_id: self.user_id,
            course_id: self.course_id,
            status: self
                .status
                .as_deref()
                .map(str::parse::<TransactionStatus>)
                .transpose()
                .map_err(|e| AppError::Validation(format!("status: {}", e)))?,
            tx_type: self
                .tx_type
                .as_deref()
                .map(str::parse::<TransactionType>)
                .transpose()
                .map_err(|e| AppError::Validation(format!("type: {}", e)))?,
            from: self.from.as_deref().map(|d| parse_date(d, false)).transpose()?,
            to: self.to.as_deref().map(|d| parse_date(d, true)).transpose()?,
        })
    }
}

/// Accepts `YYYY-MM-DD` or RFC 3339. A bare date used as an upper bound
/// covers the whole day.
pub fn parse_date(date_str: &str, end_of_range: bool) -> Result<DateTime<Utc>, AppError> {
    let date_str = date_str.trim();
    if date_str.len() == 10 {
        let day = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|e| AppError::Validation(format!("invalid date {}: {}", date_str, e)))?;
        let day = if end_of_range {
            day.succ_opt()
                .ok_or_else(|| AppError::Validation(format!("date {} out of range", date_str)))?
        } else {
            day
        };
        let midnight = day
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::Validation(format!("invalid date {}", date_str)))?;
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc));
    }

    DateTime::parse_from_rfc3339(date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Validation(format!("invalid date {}: {}", date_str, e)))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub data: Vec<TransactionView>,
    pub next_cursor: Option<String>,
}

async fn fetch_page(
    state: &AppState,
    query: &TransactionQuery,
    filter: TransactionFilter,
) -> Result<TransactionPage, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let after = query
        .cursor
        .as_deref()
        .map(cursor::decode)
        .transpose()
        .map_err(|e| AppError::BadRequest(format!("invalid cursor: {}", e)))?;

    let rows = queries::list_transactions(&state.db, &filter, after, limit).await?;
    let next_cursor = if rows.len() as i64 == limit {
        rows.last().map(|tx| cursor::encode(tx.created_at, tx.id))
    } else {
        None
    };

    Ok(TransactionPage {
        data: rows.into_iter().map(TransactionView::from).collect(),
        next_cursor,
    })
}

#[utoipa::path(
    get,
    path = "/admin/transactions",
    params(TransactionQuery),
    responses(
        (status = 200, description = "Ledger rows, newest first", body = TransactionPage),
        (status = 400, description = "Invalid filter or cursor"),
        (status = 401, description = "Missing or invalid admin API key")
    ),
    security(("adminKey" = [])),
    tag = "Transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<TransactionPage>, AppError> {
    let filter = query.filter()?;
    Ok(Json(fetch_page(&state, &query, filter).await?))
}

#[utoipa::path(
    get,
    path = "/me/transactions",
    params(TransactionQuery),
    responses(
        (
            status = 200,
            description = "The caller's ledger rows, newest first",
            body = TransactionPage
        ),
        (status = 401, description = "Missing X-User-Id")
    ),
    tag = "Transactions"
)]
pub async fn list_my_transactions(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<TransactionPage>, AppError> {
    let mut filter = query.filter()?;
    filter.user_id = Some(user_id);
    Ok(Json(fetch_page(&state, &query, filter).await?))
}
