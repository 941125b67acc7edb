use coursemart_core::payments::HttpPaymentProvider;

#[tokio::test]
async fn test_circuit_breaker_state() {
    let provider = HttpPaymentProvider::new(
        "https://payments.example.com".to_string(),
        "server-key".to_string(),
    );

    // Nothing has failed yet
    assert_eq!(provider.circuit_state(), "closed");
}

#[tokio::test]
async fn test_circuit_breaker_with_custom_config() {
    let provider = HttpPaymentProvider::with_circuit_breaker(
        "https://payments.example.com".to_string(),
        "server-key".to_string(),
        5,
        30,
    );

    assert_eq!(provider.circuit_state(), "closed");
}
