// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express. All failures are
//! collected so the operator sees every problem at once.

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    } else if host.parse::<std::net::IpAddr>().is_err()
        && !host.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        errors.push(ConfigError::validation(format!(
            "server.host `{host}` is not a valid IP address or hostname"
        )));
    }

    if config.server.port == 0 {
        errors.push(ConfigError::validation("server.port must be greater than 0"));
    }

    let mount = config.server.mount.trim_matches('/');
    if mount.is_empty() || mount.contains('/') || mount == "v1" {
        errors.push(ConfigError::validation(format!(
            "server.mount `{}` must be a single path segment other than `v1`",
            config.server.mount
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }

    if config.queue.poll_interval_ms == 0 {
        errors.push(ConfigError::validation("queue.poll_interval_ms must be greater than 0"));
    }

    if config.sender.max_workers == 0 {
        errors.push(ConfigError::validation("sender.max_workers must be at least 1"));
    }

    for (key, value) in [
        ("sender.send_timeout_secs", config.sender.send_timeout_secs),
        ("http.request_timeout_secs", config.http.request_timeout_secs),
        ("queue.dequeue_timeout_secs", config.queue.dequeue_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be greater than 0")));
        }
    }

    if config.sender.retry_backoff_secs > config.sender.max_backoff_secs {
        errors.push(ConfigError::validation(format!(
            "sender.retry_backoff_secs ({}) must not exceed sender.max_backoff_secs ({})",
            config.sender.retry_backoff_secs, config.sender.max_backoff_secs
        )));
    }

    if !matches!(
        config.logging.level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ConfigError::validation(format!(
            "logging.level `{}` must be one of trace, debug, info, warn, error",
            config.logging.level
        )));
    }

    for channel_type in &config.handlers.include {
        if config
            .handlers
            .exclude
            .iter()
            .any(|e| e.eq_ignore_ascii_case(channel_type))
        {
            errors.push(ConfigError::validation(format!(
                "handler `{channel_type}` is both included and excluded"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
