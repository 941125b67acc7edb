use serde_json::Value;

/// Sanitizes sensitive fields in JSON payloads for logging
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "password"
            | "secret"
            | "token"
            | "api_key"
            | "authorization"
            | "signature_key"
            | "card_number"
            | "masked_card"
            | "payment_method_id"
            | "paymentmethodid"
    )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > 8 => {
            let chars: Vec<char> = s.chars().collect();
            let visible: String = chars[..4].iter().collect();
            let end: String = chars[chars.len() - 4..].iter().collect();
            Value::String(format!("{}****{}", visible, end))
        }
        _ => Value::String("****".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_card_number() {
        let input = json!({
            "card_number": "4111111111111111",
            "amount": "100.00"
        });

        let sanitized = sanitize_json(&input);
        let card = sanitized["card_number"].as_str().unwrap();

        assert_eq!(card, "4111****1111");
        assert_eq!(sanitized["amount"], "100.00");
    }

    #[test]
    fn test_sanitize_nested() {
        let input = json!({
            "customer": {
                "token": "tok",
                "name": "Ada"
            },
            "items": [{"secret": "s3cr3t-value-long"}]
        });

        let sanitized = sanitize_json(&input);
        assert_eq!(sanitized["customer"]["token"], "****");
        assert_eq!(sanitized["customer"]["name"], "Ada");
        assert!(sanitized["items"][0]["secret"].as_str().unwrap().contains("****"));
    }
}
