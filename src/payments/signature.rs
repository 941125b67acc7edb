//! Callback authentication: the provider signs the raw request body with
//! HMAC-SHA256 using the shared webhook secret and sends the hex digest in
//! `X-Payment-Signature`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-payment-signature";

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded signature for `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Constant-time check of a hex signature against `body`.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_body_verifies() {
        let body = br#"{"order_id":"ORDER-1","transaction_status":"settlement"}"#;
        let signature = sign("webhook-secret", body);

        assert_eq!(signature.len(), 64);
        assert!(verify("webhook-secret", body, &signature));
        assert!(verify("webhook-secret", body, &signature.to_uppercase()));
    }

    #[test]
    fn tampered_body_or_wrong_secret_fails() {
        let body = br#"{"order_id":"ORDER-1","transaction_status":"settlement"}"#;
        let signature = sign("webhook-secret", body);

        assert!(!verify("other-secret", body, &signature));
        assert!(!verify("webhook-secret", br#"{"order_id":"ORDER-2"}"#, &signature));
        assert!(!verify("webhook-secret", body, "not-hex"));
        assert!(!verify("webhook-secret", body, ""));
    }
}
