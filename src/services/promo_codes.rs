use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::audit::ENTITY_PROMO_CODE;
use crate::domain::promo::normalize_code;
use crate::domain::{AuditEntry, DiscountType, PromoCode};
use crate::error::AppError;
use crate::ports::Store;
use crate::validation::{
    validate_money_scale, validate_non_negative_amount, validate_positive_amount,
    validate_promo_code, ValidationError,
};

use super::audit_value;

#[derive(Debug, Clone)]
pub struct NewPromoCode {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: BigDecimal,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub min_cart_value: Option<BigDecimal>,
    pub is_active: bool,
}

impl NewPromoCode {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_promo_code(&self.code)?;
        validate_positive_amount("discount_value", &self.discount_value)?;
        match self.discount_type {
            DiscountType::Percentage if self.discount_value > BigDecimal::from(100) => {
                return Err(ValidationError::new(
                    "discount_value",
                    "percentage must be at most 100",
                ));
            }
            DiscountType::Fixed => validate_money_scale("discount_value", &self.discount_value)?,
            _ => {}
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(ValidationError::new("end_date", "must not be before start_date"));
            }
        }
        if matches!(self.max_uses, Some(max) if max < 1) {
            return Err(ValidationError::new("max_uses", "must be at least 1"));
        }
        if let Some(min) = &self.min_cart_value {
            validate_non_negative_amount("min_cart_value", min)?;
        }
        Ok(())
    }
}

pub struct PromoCodeService {
    store: Arc<dyn Store>,
}

impl PromoCodeService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: NewPromoCode, actor: &str) -> Result<PromoCode, AppError> {
        let input = NewPromoCode {
            code: normalize_code(&input.code),
            ..input
        };
        input.validate()?;

        let now = Utc::now();
        let promo = PromoCode {
            id: Uuid::new_v4(),
            code: input.code,
            discount_type: input.discount_type,
            discount_value: input.discount_value,
            start_date: input.start_date,
            end_date: input.end_date,
            max_uses: input.max_uses,
            used_count: 0,
            min_cart_value: input.min_cart_value,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.store.begin().await?;
        let promo = uow.insert_promo_code(&promo).await.map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("promo code {} already exists", promo.code))
            }
            other => other,
        })?;
        uow.record_audit(&AuditEntry::created(
            promo.id,
            ENTITY_PROMO_CODE,
            audit_value(&promo),
            actor,
        ))
        .await?;
        uow.commit().await?;

        tracing::info!(promo_code_id = %promo.id, code = %promo.code, "promo code created");
        Ok(promo)
    }

    /// Flips `is_active` and returns the updated code.
    pub async fn toggle(&self, id: Uuid, actor: &str) -> Result<PromoCode, AppError> {
        let mut uow = self.store.begin().await?;
        let before = uow
            .lock_promo_code(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("promo code {}", id)))?;

        uow.set_promo_code_active(id, !before.is_active).await?;
        let after = PromoCode {
            is_active: !before.is_active,
            updated_at: Utc::now(),
            ..before.clone()
        };
        uow.record_audit(&AuditEntry::updated(
            id,
            ENTITY_PROMO_CODE,
            audit_value(&before),
            audit_value(&after),
            actor,
        ))
        .await?;
        uow.commit().await?;

        tracing::info!(promo_code_id = %id, is_active = after.is_active, "promo code toggled");
        Ok(after)
    }

    /// Deletes a code that no transaction refers to.
    pub async fn delete(&self, id: Uuid, actor: &str) -> Result<(), AppError> {
        let mut uow = self.store.begin().await?;
        let existing = uow
            .lock_promo_code(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("promo code {}", id)))?;

        if uow.promo_code_in_use(id).await? {
            return Err(AppError::PreconditionFailed(format!(
                "promo code {} has been redeemed and cannot be deleted; deactivate it instead",
                existing.code
            )));
        }

        uow.delete_promo_code(id).await?;
        uow.record_audit(&AuditEntry::deleted(
            id,
            ENTITY_PROMO_CODE,
            audit_value(&existing),
            actor,
        ))
        .await?;
        uow.commit().await?;

        tracing::info!(promo_code_id = %id, "promo code deleted");
        Ok(())
    }
}
