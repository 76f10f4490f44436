//! Secret redaction for text that may end up in logs, checkpoints, or reports.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Patterns whose whole match is replaced.
static BARE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bsk-[A-Za-z0-9:_-]{16,}\b",
        r"\bpk-lf-[A-Za-z0-9:_-]{8,}\b",
        r"\bsk-lf-[A-Za-z0-9:_-]{8,}\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Patterns whose first capture group (the key/prefix) is kept.
static PREFIXED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(authorization\s*:\s*bearer\s+)[A-Za-z0-9._:-]+\b",
        r#"(?i)\b(api[-_ ]?key\s*[=:]\s*)["']?[A-Za-z0-9._:-]{8,}["']?"#,
        r#"(?i)\b(token\s*[=:]\s*)["']?[A-Za-z0-9._:-]{8,}["']?"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Replace anything that looks like a credential with `[REDACTED]`.
pub fn redact_text(value: &str) -> String {
    let mut redacted = value.to_string();
    for pattern in BARE_PATTERNS.iter() {
        redacted = pattern.replace_all(&redacted, REDACTED).into_owned();
    }
    let keep_prefix = format!("${{1}}{}", REDACTED);
    for pattern in PREFIXED_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, keep_prefix.as_str())
            .into_owned();
    }
    redacted
}

/// Recursively redact every string inside a JSON value.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact_text(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_openai_style_key() {
        let out = redact_text("call failed with key sk-abcdefghijklmnopqrstuvwxyz123456");
        assert!(!out.contains("sk-abcdefghijklmnop"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn test_redacts_langfuse_keys() {
        let out = redact_text("pk-lf-12345678abc and sk-lf-abcdefgh999");
        assert_eq!(out, format!("{} and {}", REDACTED, REDACTED));
    }

    #[test]
    fn test_keeps_bearer_prefix() {
        let out = redact_text("Authorization: Bearer abc.def.ghi");
        assert_eq!(out, format!("Authorization: Bearer {}", REDACTED));
    }

    #[test]
    fn test_keeps_assignment_key() {
        let out = redact_text("api_key=\"supersecretvalue\" token: 0123456789abcdef");
        assert!(out.starts_with("api_key="));
        assert!(!out.contains("supersecretvalue"));
        assert!(!out.contains("0123456789abcdef"));
        assert!(out.contains("token: "));
    }

    #[test]
    fn test_leaves_plain_text_alone() {
        let text = "security branch failed after 3 attempt(s): connection refused";
        assert_eq!(redact_text(text), text);
    }

    #[test]
    fn test_redact_value_recurses() {
        let value = json!({
            "error": "token=abcdefgh12345",
            "nested": [{"msg": "sk-aaaaaaaaaaaaaaaaaaaaaaaa"}],
            "count": 3
        });
        let out = redact_value(&value);
        assert_eq!(out["count"], 3);
        assert!(!out["error"].as_str().unwrap().contains("abcdefgh12345"));
        assert_eq!(out["nested"][0]["msg"], REDACTED);
    }
}
