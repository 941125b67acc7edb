//! Operator endpoints. Every route here sits behind `admin_auth`; the acting
//! admin is named by `X-User-Id`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::db::queries;
use crate::domain::{DiscountType, PromoCode, WithdrawalStatus};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::{NewPromoCode, RefundResult};
use crate::AppState;

use super::transactions::TransactionView;
use super::withdrawals::WithdrawalView;
use super::Pagination;

// --- Refunds ---

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub original: TransactionView,
    pub refund: TransactionView,
    pub enrollment_revoked: bool,
}

impl From<RefundResult> for RefundResponse {
    fn from(result: RefundResult) -> Self {
        RefundResponse {
            original: result.original.into(),
            refund: result.refund.into(),
            enrollment_revoked: result.enrollment_revoked,
        }
    }
}

#[utoipa::path(
    post,
    path = "/admin/transactions/{id}/refund",
    params(("id" = Uuid, Path, description = "Ledger row id")),
    responses(
        (status = 200, description = "Purchase reversed", body = RefundResponse),
        (status = 404, description = "Unknown transaction"),
        (status = 409, description = "Not a completed purchase or already refunded")
    ),
    security(("adminKey" = [])),
    tag = "Transactions"
)]
pub async fn refund_transaction(
    State(state): State<AppState>,
    CurrentUser(admin_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RefundResponse>, AppError> {
    let result = state.ledger.refund(id, &admin_id.to_string()).await?;
    Ok(Json(result.into()))
}

#[utoipa::path(
    get,
    path = "/admin/transactions/{id}",
    params(("id" = Uuid, Path, description = "Ledger row id")),
    responses(
        (status = 200, description = "Ledger row", body = TransactionView),
        (status = 404, description = "Unknown transaction")
    ),
    security(("adminKey" = [])),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionView>, AppError> {
    let tx = queries::get_transaction(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))?;
    Ok(Json(tx.into()))
}

// --- Promo codes ---

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeView {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub min_cart_value: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PromoCode> for PromoCodeView {
    fn from(promo: PromoCode) -> Self {
        PromoCodeView {
            id: promo.id,
            code: promo.code,
            discount_type: promo.discount_type.to_string(),
            discount_value: promo.discount_value.to_string(),
            start_date: promo.start_date,
            end_date: promo.end_date,
            max_uses: promo.max_uses,
            used_count: promo.used_count,
            min_cart_value: promo.min_cart_value.map(|v| v.to_string()),
            is_active: promo.is_active,
            created_at: promo.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromoCodeRequest {
    pub code: String,
    /// `percentage` or `fixed`
    pub discount_type: String,
    #[schema(value_type = String, example = "10")]
    pub discount_value: BigDecimal,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    #[schema(value_type = Option<String>)]
    pub min_cart_value: Option<BigDecimal>,
    pub is_active: Option<bool>,
}

impl TryFrom<CreatePromoCodeRequest> for NewPromoCode {
    type Error = AppError;

    fn try_from(req: CreatePromoCodeRequest) -> Result<Self, Self::Error> {
        let discount_type = req
            .discount_type
            .trim()
            .to_lowercase()
            .parse::<DiscountType>()
            .map_err(|e| AppError::Validation(format!("discountType: {}", e)))?;

        Ok(NewPromoCode {
            code: req.code,
            discount_type,
            discount_value: req.discount_value,
            start_date: req.start_date,
            end_date: req.end_date,
            max_uses: req.max_uses,
            min_cart_value: req.min_cart_value,
            is_active: req.is_active.unwrap_or(true),
        })
    }
}

#[utoipa::path(
    get,
    path = "/admin/promo-codes",
    params(Pagination),
    responses((status = 200, description = "Promo codes, newest first", body = [PromoCodeView])),
    security(("adminKey" = [])),
    tag = "Promo Codes"
)]
pub async fn list_promo_codes(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<PromoCodeView>>, AppError> {
    let codes = queries::list_promo_codes(&state.db, page.limit(), page.offset()).await?;
    Ok(Json(codes.into_iter().map(PromoCodeView::from).collect()))
}

#[utoipa::path(
    get,
    path = "/admin/promo-codes/{id}",
    params(("id" = Uuid, Path, description = "Promo code id")),
    responses(
        (status = 200, description = "Promo code", body = PromoCodeView),
        (status = 404, description = "Unknown promo code")
    ),
    security(("adminKey" = [])),
    tag = "Promo Codes"
)]
pub async fn get_promo_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PromoCodeView>, AppError> {
    let promo = queries::get_promo_code(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("promo code {}", id)))?;
    Ok(Json(promo.into()))
}

#[utoipa::path(
    post,
    path = "/admin/promo-codes",
    request_body = CreatePromoCodeRequest,
    responses(
        (status = 201, description = "Promo code created", body = PromoCodeView),
        (status = 400, description = "Invalid promo code definition"),
        (status = 409, description = "Code already exists")
    ),
    security(("adminKey" = [])),
    tag = "Promo Codes"
)]
pub async fn create_promo_code(
    State(state): State<AppState>,
    CurrentUser(admin_id): CurrentUser,
    Json(payload): Json<CreatePromoCodeRequest>,
) -> Result<(StatusCode, Json<PromoCodeView>), AppError> {
    let input = NewPromoCode::try_from(payload)?;
    let promo = state.promo_codes.create(input, &admin_id.to_string()).await?;
    Ok((StatusCode::CREATED, Json(promo.into())))
}

#[utoipa::path(
    post,
    path = "/admin/promo-codes/{id}/toggle",
    params(("id" = Uuid, Path, description = "Promo code id")),
    responses(
        (status = 200, description = "Active flag flipped", body = PromoCodeView),
        (status = 404, description = "Unknown promo code")
    ),
    security(("adminKey" = [])),
    tag = "Promo Codes"
)]
pub async fn toggle_promo_code(
    State(state): State<AppState>,
    CurrentUser(admin_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PromoCodeView>, AppError> {
    let promo = state.promo_codes.toggle(id, &admin_id.to_string()).await?;
    Ok(Json(promo.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/promo-codes/{id}",
    params(("id" = Uuid, Path, description = "Promo code id")),
    responses(
        (status = 204, description = "Promo code deleted"),
        (status = 404, description = "Unknown promo code"),
        (status = 409, description = "Code is referenced by settled purchases")
    ),
    security(("adminKey" = [])),
    tag = "Promo Codes"
)]
pub async fn delete_promo_code(
    State(state): State<AppState>,
    CurrentUser(admin_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.promo_codes.delete(id, &admin_id.to_string()).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Withdrawals ---

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WithdrawalQuery {
    /// pending, approved, rejected or processed
    pub status: Option<String>,
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub withdrawal: WithdrawalView,
    pub payout: TransactionView,
}

#[utoipa::path(
    get,
    path = "/admin/withdrawals",
    params(WithdrawalQuery),
    responses(
        (status = 200, description = "Withdrawal requests, newest first", body = [WithdrawalView]),
        (status = 400, description = "Unknown status filter")
    ),
    security(("adminKey" = [])),
    tag = "Withdrawals"
)]
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Query(query): Query<WithdrawalQuery>,
) -> Result<Json<Vec<WithdrawalView>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<WithdrawalStatus>)
        .transpose()
        .map_err(|e| AppError::Validation(format!("status: {}", e)))?;
    let page = Pagination {
        limit: query.limit,
        offset: query.offset,
    };

    let requests = queries::list_withdrawals(
        &state.db,
        status,
        query.user_id,
        page.limit(),
        page.offset(),
    )
    .await?;
    Ok(Json(requests.into_iter().map(WithdrawalView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/admin/withdrawals/{id}/approve",
    params(("id" = Uuid, Path, description = "Withdrawal request id")),
    request_body(content = ReviewRequest, description = "Optional review notes"),
    responses(
        (status = 200, description = "Approved; payout recorded", body = ApprovalResponse),
        (status = 404, description = "Unknown withdrawal request"),
        (status = 409, description = "Request is not pending")
    ),
    security(("adminKey" = [])),
    tag = "Withdrawals"
)]
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    CurrentUser(admin_id): CurrentUser,
    Path(id): Path<Uuid>,
    review: Option<Json<ReviewRequest>>,
) -> Result<Json<ApprovalResponse>, AppError> {
    let notes = review.and_then(|Json(r)| r.notes);
    let (withdrawal, payout) = state.withdrawals.approve(id, admin_id, notes).await?;
    Ok(Json(ApprovalResponse {
        withdrawal: withdrawal.into(),
        payout: payout.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/admin/withdrawals/{id}/reject",
    params(("id" = Uuid, Path, description = "Withdrawal request id")),
    request_body(content = ReviewRequest, description = "Optional review notes"),
    responses(
        (status = 200, description = "Rejected", body = WithdrawalView),
        (status = 404, description = "Unknown withdrawal request"),
        (status = 409, description = "Request is not pending")
    ),
    security(("adminKey" = [])),
    tag = "Withdrawals"
)]
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    CurrentUser(admin_id): CurrentUser,
    Path(id): Path<Uuid>,
    review: Option<Json<ReviewRequest>>,
) -> Result<Json<WithdrawalView>, AppError> {
    let notes = review.and_then(|Json(r)| r.notes);
    let withdrawal = state.withdrawals.reject(id, admin_id, notes).await?;
    Ok(Json(withdrawal.into()))
}

#[utoipa::path(
    post,
    path = "/admin/withdrawals/{id}/process",
    params(("id" = Uuid, Path, description = "Withdrawal request id")),
    request_body(content = ReviewRequest, description = "Optional payout reference"),
    responses(
        (status = 200, description = "Funds sent", body = WithdrawalView),
        (status = 404, description = "Unknown withdrawal request"),
        (status = 409, description = "Request is not approved")
    ),
    security(("adminKey" = [])),
    tag = "Withdrawals"
)]
pub async fn process_withdrawal(
    State(state): State<AppState>,
    CurrentUser(admin_id): CurrentUser,
    Path(id): Path<Uuid>,
    review: Option<Json<ReviewRequest>>,
) -> Result<Json<WithdrawalView>, AppError> {
    let notes = review.and_then(|Json(r)| r.notes);
    let withdrawal = state.withdrawals.mark_processed(id, admin_id, notes).await?;
    Ok(Json(withdrawal.into()))
}

// --- Audit trail ---

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogView {
    pub id: Uuid,
    pub entity_type: String,
    pub action: String,
    pub old_val: Option<serde_json::Value>,
    pub new_val: Option<serde_json::Value>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/admin/audit-logs/{entity_id}",
    params(("entity_id" = Uuid, Path, description = "Audited entity id"), Pagination),
    responses((status = 200, description = "Audit rows, newest first", body = [AuditLogView])),
    security(("adminKey" = [])),
    tag = "Audit"
)]
pub async fn get_audit_logs(
    State(state): State<AppState>,
    Path(entity_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<AuditLogView>>, AppError> {
    let rows = queries::get_audit_logs(&state.db, entity_id, page.limit(), page.offset()).await?;

    let logs = rows
        .into_iter()
        .map(|(id, entity_type, action, old_val, new_val, actor, timestamp)| AuditLogView {
            id,
            entity_type,
            action,
            old_val: old_val.and_then(|v| serde_json::from_str(&v).ok()),
            new_val: new_val.and_then(|v| serde_json::from_str(&v).ok()),
            actor,
            timestamp,
        })
        .collect();

    Ok(Json(logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(discount_type: &str) -> CreatePromoCodeRequest {
        CreatePromoCodeRequest {
            code: "save10".to_string(),
            discount_type: discount_type.to_string(),
            discount_value: BigDecimal::from(10),
            start_date: None,
            end_date: None,
            max_uses: Some(100),
            min_cart_value: None,
            is_active: None,
        }
    }

    #[test]
    fn create_request_maps_to_new_promo_code() {
        let input = NewPromoCode::try_from(create_request("Percentage")).unwrap();
        assert_eq!(input.discount_type, DiscountType::Percentage);
        assert!(input.is_active);
        assert_eq!(input.max_uses, Some(100));
    }

    #[test]
    fn unknown_discount_type_is_rejected() {
        let err = NewPromoCode::try_from(create_request("bogo")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn review_body_notes_are_optional() {
        let review: ReviewRequest = serde_json::from_str("{}").unwrap();
        assert!(review.notes.is_none());
    }
}
