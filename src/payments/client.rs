use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{PaymentError, PaymentProvider, PaymentRequest, PaymentSession};

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    order_id: &'a str,
    gross_amount: String,
    currency: &'a str,
    customer_id: String,
    item_name: &'a str,
}

/// HTTP client for the payment provider's hosted checkout API.
#[derive(Clone)]
pub struct HttpPaymentProvider {
    client: Client,
    base_url: String,
    server_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpPaymentProvider {
    pub fn new(base_url: String, server_key: String) -> Self {
        Self::with_circuit_breaker(base_url, server_key, 3, 60)
    }

    /// Opens after `failure_threshold` consecutive failures and retries after
    /// roughly `reset_timeout_secs`.
    pub fn with_circuit_breaker(
        base_url: String,
        server_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        HttpPaymentProvider {
            client,
            base_url,
            server_key,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentSession, PaymentError> {
        let url = format!("{}/v1/payments", self.base_url.trim_end_matches('/'));
        let body = CreatePaymentBody {
            order_id: &request.order_id,
            gross_amount: request.amount.to_string(),
            currency: &request.currency,
            customer_id: request.customer_id.to_string(),
            item_name: &request.item_name,
        };
        let client = self.client.clone();
        let server_key = self.server_key.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .basic_auth(server_key, None::<&str>)
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(PaymentError::Rejected {
                        status: status.as_u16(),
                        body,
                    });
                }

                let session = response
                    .json::<PaymentSession>()
                    .await
                    .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
                if session.redirect_url.is_empty() {
                    return Err(PaymentError::InvalidResponse(
                        "missing redirect_url".to_string(),
                    ));
                }
                Ok(session)
            })
            .await;

        match result {
            Ok(session) => Ok(session),
            Err(FailsafeError::Rejected) => Err(PaymentError::CircuitBreakerOpen(
                "payment provider circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use uuid::Uuid;

    fn request() -> PaymentRequest {
        PaymentRequest {
            order_id: "ORDER-abc".to_string(),
            amount: BigDecimal::from(90),
            currency: "USD".to_string(),
            customer_id: Uuid::new_v4(),
            item_name: "Rust for Pythonistas".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_payment_returns_redirect_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/payments")
            .match_header("authorization", mockito::Matcher::Regex("^Basic ".into()))
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "order_id": "ORDER-abc",
                "gross_amount": "90",
                "currency": "USD"
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token":"tok_1","redirect_url":"https://pay.example.com/tok_1"}"#)
            .create_async()
            .await;

        let provider = HttpPaymentProvider::new(server.url(), "server-key".to_string());
        let session = provider.create_payment(&request()).await.unwrap();

        assert_eq!(session.redirect_url, "https://pay.example.com/tok_1");
        assert_eq!(session.token.as_deref(), Some("tok_1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_provider_error_status_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payments")
            .with_status(400)
            .with_body("duplicate order_id")
            .create_async()
            .await;

        let provider = HttpPaymentProvider::new(server.url(), "server-key".to_string());
        let err = provider.create_payment(&request()).await.unwrap_err();

        match err {
            PaymentError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "duplicate order_id");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_circuit_opens_after_consecutive_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payments")
            .with_status(500)
            .expect_at_least(2)
            .create_async()
            .await;

        let provider =
            HttpPaymentProvider::with_circuit_breaker(server.url(), "key".to_string(), 2, 60);
        assert_eq!(provider.circuit_state(), "closed");

        for _ in 0..2 {
            assert!(provider.create_payment(&request()).await.is_err());
        }

        let err = provider.create_payment(&request()).await.unwrap_err();
        assert!(matches!(err, PaymentError::CircuitBreakerOpen(_)));
        assert_eq!(provider.circuit_state(), "open");
    }
}
