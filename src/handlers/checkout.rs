use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::CheckoutOutcome;
use crate::validation::{sanitize_string, validate_max_len, PROMO_CODE_MAX_LEN};
use crate::AppState;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub course_id: Uuid,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// Present when the buyer still has to pay.
    pub order_id: Option<String>,
    pub course_id: Uuid,
    pub subtotal: String,
    pub discount: String,
    pub tax: String,
    pub total: String,
    pub currency: String,
    pub promo_code: Option<String>,
    pub payment_url: Option<String>,
    /// True when no payment was needed and access is already granted.
    pub enrolled: bool,
    pub transaction_id: Option<String>,
}

impl CheckoutResponse {
    fn from_outcome(outcome: CheckoutOutcome, course_id: Uuid, currency: &str) -> Self {
        match outcome {
            CheckoutOutcome::PaymentRequired { checkout, promo } => CheckoutResponse {
                order_id: Some(checkout.order_id),
                course_id: checkout.course_id,
                subtotal: checkout.subtotal.to_string(),
                discount: checkout.discount_amount.to_string(),
                tax: checkout.tax_amount.to_string(),
                total: checkout.total.to_string(),
                currency: checkout.currency,
                promo_code: promo.map(|p| p.code),
                payment_url: checkout.payment_url,
                enrolled: false,
                transaction_id: None,
            },
            CheckoutOutcome::Enrolled {
                totals,
                promo,
                transaction,
                ..
            } => CheckoutResponse {
                order_id: transaction.as_ref().map(|tx| tx.transaction_id.clone()),
                course_id,
                subtotal: totals.subtotal.to_string(),
                discount: totals.discount.to_string(),
                tax: totals.tax.to_string(),
                total: totals.total.to_string(),
                currency: currency.to_string(),
                promo_code: promo.map(|p| p.code),
                payment_url: None,
                enrolled: true,
                transaction_id: transaction.map(|tx| tx.id.to_string()),
            },
        }
    }
}

#[utoipa::path(
    post,
    path = "/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Checkout created or course granted", body = CheckoutResponse),
        (status = 401, description = "Missing X-User-Id"),
        (status = 404, description = "Unknown course"),
        (status = 409, description = "Already enrolled or course unavailable"),
        (status = 422, description = "Promo code rejected"),
        (status = 502, description = "Payment provider unavailable")
    ),
    tag = "Checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let promo_code = payload
        .promo_code
        .as_deref()
        .map(sanitize_string)
        .filter(|code| !code.is_empty());
    if let Some(code) = &promo_code {
        validate_max_len("promoCode", code, PROMO_CODE_MAX_LEN)?;
    }

    let outcome = state
        .settlement
        .initiate_checkout(user_id, payload.course_id, promo_code.as_deref())
        .await?;

    tracing::info!(
        user_id = %user_id,
        course_id = %payload.course_id,
        enrolled = matches!(outcome, CheckoutOutcome::Enrolled { .. }),
        "checkout initiated"
    );

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse::from_outcome(
            outcome,
            payload.course_id,
            &state.config.currency,
        )),
    ))
}
