//! Secret redaction
//!
//! Replaces values of sensitive keys in JSON, recursively. Tool arguments
//! pass through here before they reach the session log; the redactor is the
//! only thing standing between a password typed into a tool call and a
//! plaintext file on disk.

use serde_json::Value;

/// Placeholder written over sensitive values.
pub const REDACTED: &str = "***REDACTED***";

/// Keys whose values are always redacted (matched case-insensitively).
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "api_key",
    "apikey",
    "access_token",
    "refresh_token",
    "private_key",
    "secret",
];

/// Redact a JSON text. Input that does not parse as JSON is returned
/// unchanged rather than guessed at.
pub fn redact_json_args(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => redact_value(value).to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Redact a parsed JSON value in place of sensitive keys, recursively
/// through objects and arrays.
pub fn redact_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    if is_sensitive(&key) {
                        (key, Value::String(REDACTED.to_string()))
                    } else {
                        (key, redact_value(val))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_value).collect()),
        other => other,
    }
}

fn is_sensitive(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEYS.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_sensitive_keys_case_insensitively() {
        let value = redact_value(json!({
            "password": "hunter2",
            "API_KEY": "sk-123",
            "Secret": "shh",
            "to": "0xabc"
        }));
        assert_eq!(value["password"], REDACTED);
        assert_eq!(value["API_KEY"], REDACTED);
        assert_eq!(value["Secret"], REDACTED);
        assert_eq!(value["to"], "0xabc");
    }

    #[test]
    fn test_recurses_through_objects_and_arrays() {
        let value = redact_value(json!({
            "outer": {"refresh_token": "rt", "keep": 1},
            "list": [{"private_key": "0xdead"}, {"ok": true}]
        }));
        assert_eq!(value["outer"]["refresh_token"], REDACTED);
        assert_eq!(value["outer"]["keep"], 1);
        assert_eq!(value["list"][0]["private_key"], REDACTED);
        assert_eq!(value["list"][1]["ok"], true);
    }

    #[test]
    fn test_structure_is_otherwise_unchanged() {
        let original = json!({"a": [1, 2, {"b": null}], "c": "x"});
        assert_eq!(redact_value(original.clone()), original);
    }

    #[test]
    fn test_non_json_passes_through() {
        assert_eq!(redact_json_args("not json"), "not json");
        assert_eq!(redact_json_args(""), "");
    }

    #[test]
    fn test_json_text_round_trip() {
        let out = redact_json_args(r#"{"password":"pw","to":"0xabc"}"#);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["password"], REDACTED);
        assert_eq!(parsed["to"], "0xabc");
    }
}
