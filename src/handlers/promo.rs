use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::PromoDiscount;
use crate::error::AppError;
use crate::validation::{sanitize_string, validate_required};
use crate::AppState;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromoRequest {
    pub code: String,
    pub course_id: Uuid,
}

/// Preview of what a code would take off the course price. Redeeming happens
/// only when a purchase settles.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromoPreview {
    pub success: bool,
    pub promo_code: String,
    pub promo_code_id: Uuid,
    /// `percentage` or `fixed`
    pub discount_type: String,
    pub discount_value: String,
    pub discount_amount: String,
}

impl From<PromoDiscount> for PromoPreview {
    fn from(discount: PromoDiscount) -> Self {
        PromoPreview {
            success: true,
            promo_code: discount.code,
            promo_code_id: discount.promo_code_id,
            discount_type: discount.discount_type.to_string(),
            discount_value: discount.discount_value.to_string(),
            discount_amount: discount.discount_amount.to_string(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/promo-codes/validate",
    request_body = ValidatePromoRequest,
    responses(
        (status = 200, description = "Code is usable for this course", body = PromoPreview),
        (status = 404, description = "Unknown course"),
        (status = 422, description = "Code rejected, with a machine-readable reason")
    ),
    tag = "Promo Codes"
)]
pub async fn validate_promo_code(
    State(state): State<AppState>,
    Json(payload): Json<ValidatePromoRequest>,
) -> Result<Json<PromoPreview>, AppError> {
    let code = sanitize_string(&payload.code);
    validate_required("code", &code)?;

    let discount = state.settlement.validate_promo(&code, payload.course_id).await?;
    Ok(Json(PromoPreview::from(discount)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DiscountType;
    use bigdecimal::BigDecimal;

    #[test]
    fn preview_carries_discount_as_strings() {
        let preview = PromoPreview::from(PromoDiscount {
            promo_code_id: Uuid::new_v4(),
            code: "SAVE10".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: BigDecimal::from(10),
            discount_amount: BigDecimal::from(10),
        });

        let json = serde_json::to_value(&preview).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["promoCode"], "SAVE10");
        assert_eq!(json["discountType"], "percentage");
        assert_eq!(json["discountAmount"], "10");
    }
}
