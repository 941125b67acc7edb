//! Payment provider integration: outbound payment creation and verification
//! of the provider's callbacks.

pub mod client;
pub mod signature;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use client::HttpPaymentProvider;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("provider rejected the payment: {status} {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),
    #[error("circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Charge the provider is asked to collect for one checkout.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub order_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub customer_id: Uuid,
    pub item_name: String,
}

/// Hosted payment page the buyer is redirected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub token: Option<String>,
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentSession, PaymentError>;
}
