//! Header redaction applied before events reach the buffer

use serde_json::{Map, Value};

pub const REDACTED: &str = "[redacted]";

/// Replace values of denied header names (case-insensitive) in place.
pub fn redact_headers(headers: &mut Map<String, Value>, deny: &[String]) {
    for (name, value) in headers.iter_mut() {
        let lower = name.to_ascii_lowercase();
        if deny.iter().any(|d| *d == lower) {
            *value = Value::String(REDACTED.to_string());
        }
    }
}

/// Convert a CDP headers object into a map, applying the deny list.
pub fn capture_headers(raw: &Value, deny: &[String]) -> Map<String, Value> {
    let mut map = raw.as_object().cloned().unwrap_or_default();
    redact_headers(&mut map, deny);
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn denied_headers_are_masked() {
        let deny = vec!["authorization".to_string(), "cookie".to_string()];
        let raw = json!({
            "Authorization": "Bearer abc123",
            "Content-Type": "application/json",
            "Cookie": "sid=1",
        });
        let captured = capture_headers(&raw, &deny);
        assert_eq!(captured["Authorization"], REDACTED);
        assert_eq!(captured["Cookie"], REDACTED);
        assert_eq!(captured["Content-Type"], "application/json");
    }

    #[test]
    fn empty_deny_list_passes_through() {
        let raw = json!({"Authorization": "Bearer abc123"});
        let captured = capture_headers(&raw, &[]);
        assert_eq!(captured["Authorization"], "Bearer abc123");
    }
}
