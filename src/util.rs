//! Shared helpers: content digests and JSON extraction from model output.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the input.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First 16 hex characters of the SHA-256 of `parts` joined by `:`.
///
/// Used for finding and evidence ids so identical inputs always map to the
/// same id across runs.
pub fn stable_id(parts: &[&str]) -> String {
    sha256_hex(&parts.join(":"))[..16].to_string()
}

/// Extract the outermost JSON object from text that may contain other content.
///
/// Brace counting skips braces inside string literals, so a `}` in a finding
/// description does not end the object early.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
