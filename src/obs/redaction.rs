//! Log redaction.
//!
//! Scrubs sensitive material (emails, phone numbers, card numbers,
//! SSN-shaped digit groups, basic names, long opaque tokens, URLs) from
//! strings and whole JSON events before anything reaches disk. Enabled by
//! default; `REDACT_LOGS=0` disables it.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Environment switch; default on.
pub const REDACT_LOGS_VAR: &str = "REDACT_LOGS";

struct Pattern {
    regex: Regex,
    replacement: &'static str,
}

fn patterns() -> &'static Vec<Pattern> {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let make = |pattern: &str, replacement: &'static str| Pattern {
            regex: Regex::new(pattern).unwrap_or_else(|_| unreachable!()),
            replacement,
        };
        vec![
            make(
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                "[EMAIL_REDACTED]",
            ),
            make(r"\([0-9]{3}\)\s*[0-9]{3}[-.\s]?[0-9]{4}\b", "[PHONE_REDACTED]"),
            make(r"\b[0-9]{3}-[0-9]{3}-[0-9]{4}\b", "[PHONE_REDACTED]"),
            make(r"\b[0-9]{3}\.[0-9]{3}\.[0-9]{4}\b", "[PHONE_REDACTED]"),
            make(r"\b[0-9]{3}\s[0-9]{3}\s[0-9]{4}\b", "[PHONE_REDACTED]"),
            make(
                r"\+[0-9]{1,4}[-.\s]?[0-9]{1,4}[-.\s]?[0-9]{1,4}[-.\s]?[0-9]{1,4}\b",
                "[PHONE_REDACTED]",
            ),
            make(
                r"\b[0-9]{4}[-.\s]?[0-9]{4}[-.\s]?[0-9]{4}[-.\s]?[0-9]{4}\b",
                "[CARD_REDACTED]",
            ),
            // Separator-required form; the regex engine has no lookahead
            // to carve out the invalid-prefix cases.
            make(r"\b[0-9]{3}[-.\s][0-9]{2}[-.\s][0-9]{4}\b", "[SSN_REDACTED]"),
            make(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b", "[NAME_REDACTED]"),
            make(r"\b[A-Za-z0-9]{20,}\b", "[TOKEN_REDACTED]"),
            make(r"https?://[^\s]+", "[URL_REDACTED]"),
        ]
    })
}

/// Scrubs strings and recursive JSON values.
#[derive(Debug, Clone, Copy)]
pub struct Redactor {
    enabled: bool,
}

impl Redactor {
    /// Builds a redactor from `REDACT_LOGS` (default on; "0" disables).
    #[must_use]
    pub fn from_env() -> Self {
        let enabled = std::env::var(REDACT_LOGS_VAR)
            .map(|v| v.trim() != "0")
            .unwrap_or(true);
        Self { enabled }
    }

    /// A redactor with an explicit switch.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Whether redaction is active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Redacts one string.
    #[must_use]
    pub fn redact_text(&self, text: &str) -> String {
        if !self.enabled || text.is_empty() {
            return text.to_string();
        }

        let mut redacted = text.to_string();
        for pattern in patterns() {
            redacted = pattern
                .regex
                .replace_all(&redacted, pattern.replacement)
                .into_owned();
        }
        redacted
    }

    /// Recursively redacts every string in a JSON value.
    #[must_use]
    pub fn redact_value(&self, value: Value) -> Value {
        if !self.enabled {
            return value;
        }

        match value {
            Value::String(s) => Value::String(self.redact_text(&s)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.redact_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.redact_value(v)))
                    .collect(),
            ),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor() -> Redactor {
        Redactor::new(true)
    }

    #[test]
    fn test_email_redacted() {
        let out = redactor().redact_text("reach me at someone@example.com today");
        assert!(out.contains("[EMAIL_REDACTED]"));
        assert!(!out.contains("example.com"));
    }

    #[test]
    fn test_phone_formats_redacted() {
        let r = redactor();
        assert!(r.redact_text("call (555) 123 4567").contains("[PHONE_REDACTED]"));
        assert!(r.redact_text("call 555-123-4567").contains("[PHONE_REDACTED]"));
        assert!(r.redact_text("call +44 20 7946 0958").contains("[PHONE_REDACTED]"));
    }

    #[test]
    fn test_card_redacted() {
        let out = redactor().redact_text("card 4111 1111 1111 1111 on file");
        assert!(out.contains("[CARD_REDACTED]"));
    }

    #[test]
    fn test_name_redacted() {
        let out = redactor().redact_text("ask Jane Doe about it");
        assert!(out.contains("[NAME_REDACTED]"));
    }

    #[test]
    fn test_url_redacted() {
        let out = redactor().redact_text("see https://internal.example/path?q=1");
        assert!(out.contains("[URL_REDACTED]"));
    }

    #[test]
    fn test_long_token_redacted_short_slug_kept() {
        let r = redactor();
        let out = r.redact_text("token abcdefghijklmnopqrstuvwx and slug clean_edges_v2");
        assert!(out.contains("[TOKEN_REDACTED]"));
        assert!(out.contains("clean_edges_v2"));
    }

    #[test]
    fn test_disabled_passes_through() {
        let r = Redactor::new(false);
        let text = "someone@example.com";
        assert_eq!(r.redact_text(text), text);
    }

    #[test]
    fn test_redact_value_recursive() {
        let value = serde_json::json!({
            "query": "mail someone@example.com",
            "nested": {"list": ["https://example.com", 42]}
        });
        let out = redactor().redact_value(value);
        assert_eq!(out["query"], "mail [EMAIL_REDACTED]");
        assert_eq!(out["nested"]["list"][0], "[URL_REDACTED]");
        assert_eq!(out["nested"]["list"][1], 42);
    }
}
