/// Shared pieces for features that ask the LLM for a JSON object and fall back to a
/// computed answer when the reply is unusable.
use std::sync::LazyLock;

use regex::Regex;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Rejected request input. Rendered to HTTP callers as `{"error": "Invalid input"}`.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("Invalid input: {0}")]
pub struct InvalidInput(pub String);

/// The outermost `{...}` span of a reply, tolerating prose or code fences around it.
pub fn first_json_object(reply: &str) -> Option<&str> {
    JSON_OBJECT.find(reply).map(|m| m.as_str())
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_object_inside_fences() {
        let reply = "Here:\n```json\n{\"a\": {\"b\": 1}}\n```\nDone.";
        assert_eq!(first_json_object(reply), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(first_json_object("no json here"), None);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round2(16.3674), 16.37);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-1.005), -1.0);
    }
}
