use axum::{extract::State, http::StatusCode, Json};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::WithdrawalRequest;
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::AppState;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWithdrawalRequest {
    #[schema(value_type = String, example = "200.00")]
    pub amount: BigDecimal,
    pub payment_method_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: String,
    pub payment_method_id: Uuid,
    pub status: String,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<WithdrawalRequest> for WithdrawalView {
    fn from(w: WithdrawalRequest) -> Self {
        WithdrawalView {
            id: w.id,
            user_id: w.user_id,
            amount: w.amount.to_string(),
            payment_method_id: w.payment_method_id,
            status: w.status.to_string(),
            processed_by: w.processed_by,
            processed_at: w.processed_at,
            notes: w.notes,
            created_at: w.created_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/me/withdrawals",
    request_body = CreateWithdrawalRequest,
    responses(
        (status = 201, description = "Withdrawal request is pending review", body = WithdrawalView),
        (status = 400, description = "Invalid amount"),
        (status = 401, description = "Missing X-User-Id"),
        (status = 409, description = "Amount exceeds the available balance")
    ),
    tag = "Withdrawals"
)]
pub async fn request_withdrawal(
    State(state): State<AppState>,
    CurrentUser(instructor_id): CurrentUser,
    Json(payload): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<WithdrawalView>), AppError> {
    let request = state
        .withdrawals
        .request(instructor_id, payload.amount, payload.payment_method_id)
        .await?;

    Ok((StatusCode::CREATED, Json(WithdrawalView::from(request))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_accepts_decimal_strings_and_numbers() {
        let from_string: CreateWithdrawalRequest = serde_json::from_str(&format!(
            r#"{{"amount":"200.00","paymentMethodId":"{}"}}"#,
            Uuid::new_v4()
        ))
        .unwrap();
        assert_eq!(from_string.amount, BigDecimal::from(200));

        let from_number: CreateWithdrawalRequest = serde_json::from_str(&format!(
            r#"{{"amount":150,"paymentMethodId":"{}"}}"#,
            Uuid::new_v4()
        ))
        .unwrap();
        assert_eq!(from_number.amount, BigDecimal::from(150));
    }

    #[test]
    fn view_renders_status_as_text() {
        let request = WithdrawalRequest::new(Uuid::new_v4(), BigDecimal::from(200), Uuid::new_v4());
        let view = WithdrawalView::from(request);
        assert_eq!(view.status, "pending");
        assert_eq!(view.amount, "200");
    }
}
