use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Cursor helpers: encode/decode a (created_at, id) tuple into an opaque string.
/// Format used internally: "{created_at_rfc3339}|{uuid}" then URL-safe base64 encoded.

pub fn encode(created_at: DateTime<Utc>, id: Uuid) -> String {
    let s = format!("{}|{}", created_at.to_rfc3339(), id);
    URL_SAFE_NO_PAD.encode(s)
}

pub fn decode(cursor: &str) -> Result<(DateTime<Utc>, Uuid), String> {
    let decoded = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| format!("base64 decode error: {}", e))?;
    let s = String::from_utf8(decoded).map_err(|e| format!("utf8 error: {}", e))?;
    let mut parts = s.splitn(2, '|');
    let ts_str = parts.next().ok_or_else(|| "missing timestamp in cursor".to_string())?;
    let id_str = parts.next().ok_or_else(|| "missing id in cursor".to_string())?;
    let ts = DateTime::parse_from_rfc3339(ts_str)
        .map_err(|e| format!("timestamp parse error: {}", e))?
        .with_timezone(&Utc);
    let id = Uuid::parse_str(id_str).map_err(|e| format!("uuid parse error: {}", e))?;
    Ok((ts, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_survives_encoding() {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let cursor = encode(now, id);
        assert!(!cursor.contains('='));
        assert_eq!(decode(&cursor).unwrap(), (now, id));
    }

    #[test]
    fn garbage_cursor_is_rejected() {
        assert!(decode("not a cursor").is_err());
        assert!(decode(&URL_SAFE_NO_PAD.encode("2024-01-01T00:00:00Z")).is_err());
    }
}
