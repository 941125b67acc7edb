pub mod ledger;
pub mod promo_codes;
pub mod settlement;
pub mod withdrawals;

pub use ledger::{LedgerService, RefundResult};
pub use promo_codes::{NewPromoCode, PromoCodeService};
pub use settlement::{CallbackResult, CheckoutOutcome, SettlementService};
pub use withdrawals::WithdrawalService;

use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;

/// Pricing knobs shared by checkout and settlement.
#[derive(Debug, Clone)]
pub struct PricingSettings {
    pub tax_rate_percent: BigDecimal,
    pub instructor_share_percent: BigDecimal,
    pub currency: String,
}

impl From<&Config> for PricingSettings {
    fn from(config: &Config) -> Self {
        Self {
            tax_rate_percent: config.tax_rate_percent.clone(),
            instructor_share_percent: config.instructor_share_percent.clone(),
            currency: config.currency.clone(),
        }
    }
}

/// JSON snapshot of an entity for the audit trail.
pub(crate) fn audit_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}
