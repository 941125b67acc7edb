use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::PaymentOutcome;
use crate::error::AppError;
use crate::payments::signature::{self, SIGNATURE_HEADER};
use crate::services::CallbackResult;
use crate::AppState;

/// Notification body posted by the payment provider.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PaymentCallback {
    pub order_id: String,
    pub transaction_status: String,
    pub payment_type: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub status: String,
    pub order_id: String,
    /// Checkout state after the notification was applied.
    pub state: String,
    pub transaction_id: Option<String>,
}

impl CallbackAck {
    fn from_result(result: &CallbackResult) -> Self {
        let checkout = result.checkout();
        CallbackAck {
            status: "ok".to_string(),
            order_id: checkout.order_id.clone(),
            state: checkout.state.to_string(),
            transaction_id: match result {
                CallbackResult::Settled { transaction, .. } => Some(transaction.id.to_string()),
                _ => None,
            },
        }
    }
}

#[utoipa::path(
    post,
    path = "/payments/callback",
    request_body = PaymentCallback,
    params(
        ("X-Payment-Signature" = String, Header, description = "Hex HMAC-SHA256 of the raw body")
    ),
    responses(
        (status = 200, description = "Notification applied", body = CallbackAck),
        (status = 400, description = "Malformed notification"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 404, description = "Unknown order"),
        (status = 409, description = "Notification conflicts with the checkout state")
    ),
    tag = "Webhooks"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackAck>, AppError> {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing payment signature".to_string()))?;

    if !signature::verify(&state.config.payment_webhook_secret, &body, provided) {
        tracing::warn!("payment callback with invalid signature rejected");
        return Err(AppError::Unauthorized("invalid payment signature".to_string()));
    }

    let payload: PaymentCallback = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed payment callback: {}", e)))?;

    let outcome = PaymentOutcome::from_provider_status(&payload.transaction_status).ok_or_else(|| {
        AppError::Validation(format!(
            "transaction_status: unknown provider status {}",
            payload.transaction_status
        ))
    })?;

    tracing::info!(
        order_id = %payload.order_id,
        provider_status = %payload.transaction_status,
        outcome = ?outcome,
        "payment callback received"
    );

    let result = state
        .settlement
        .handle_payment_callback(&payload.order_id, outcome, payload.payment_type.as_deref())
        .await?;

    Ok(Json(CallbackAck::from_result(&result)))
}
