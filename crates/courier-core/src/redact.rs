// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret redaction for channel logs.
//!
//! Two complementary mechanisms:
//! 1. **Regex-based**: catches credential formats that show up in HTTP traces.
//! 2. **Exact-match**: catches a channel's own configured secrets, including
//!    their URL-encoded and JSON-escaped forms.

use std::sync::LazyLock;

use regex::Regex;

static REDACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Authorization headers
        Regex::new(r"Bearer\s+[a-zA-Z0-9._\-]{10,}").expect("valid regex"),
        Regex::new(r"Basic\s+[a-zA-Z0-9+/=]{8,}").expect("valid regex"),
        // Telegram bot tokens, which end up in request URLs
        Regex::new(r"\d{8,10}:[a-zA-Z0-9_\-]{35}").expect("valid regex"),
    ]
});

/// The redaction placeholder.
pub const REDACTED: &str = "**********";

/// Redacts one channel's secrets from arbitrary text.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// Longest first, so a secret never leaves a partial match behind.
    values: Vec<String>,
}

impl Redactor {
    pub fn new(secrets: &[String]) -> Self {
        let mut values: Vec<String> = Vec::new();
        for secret in secrets.iter().filter(|s| !s.is_empty()) {
            let encoded: String = url::form_urlencoded::byte_serialize(secret.as_bytes()).collect();
            let escaped = serde_json::to_string(secret)
                .map(|s| s.trim_matches('"').to_string())
                .unwrap_or_default();
            for variant in [secret.clone(), encoded, escaped] {
                if !variant.is_empty() && !values.contains(&variant) {
                    values.push(variant);
                }
            }
        }
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));
        Self { values }
    }

    pub fn redact(&self, input: &str) -> String {
        redact(input, &self.values)
    }
}

/// Redact secrets from a string using the patterns and exact-match values.
pub fn redact(input: &str, values: &[String]) -> String {
    let mut result = input.to_string();

    for pattern in REDACTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, REDACTED).to_string();
    }

    let mut sorted_values: Vec<&String> = values.iter().collect();
    sorted_values.sort_by_key(|v| std::cmp::Reverse(v.len()));
    for value in sorted_values {
        if !value.is_empty() {
            result = result.replace(value.as_str(), REDACTED);
        }
    }

    result
}
