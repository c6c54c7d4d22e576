// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier check` command implementation.
//!
//! Verifies that the loaded configuration can actually start a server:
//! the database opens and migrates, the handler registry builds, and every
//! stored channel has an enabled handler.

use std::time::{Duration, Instant};

use courier_config::CourierConfig;
use courier_core::{Backend, CourierError, HandlerRegistry, HealthStatus};
use courier_storage::SqliteBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &'static str, started: Instant, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name,
            status,
            message: message.into(),
            duration: started.elapsed(),
        }
    }
}

/// Runs every check and returns the results in order.
pub async fn run_checks(config: &CourierConfig) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let started = Instant::now();
    let registry = match courier_handlers::build_registry(&config.handlers, &config.http) {
        Ok(registry) if registry.is_empty() => {
            results.push(CheckResult::new("handlers", started, CheckStatus::Fail, "no handlers enabled"));
            None
        }
        Ok(registry) => {
            let types: Vec<String> = registry.channel_types().iter().map(|t| t.to_string()).collect();
            results.push(CheckResult::new(
                "handlers",
                started,
                CheckStatus::Pass,
                format!("{} enabled ({})", types.len(), types.join(", ")),
            ));
            Some(registry)
        }
        Err(e) => {
            results.push(CheckResult::new("handlers", started, CheckStatus::Fail, e.to_string()));
            None
        }
    };

    let started = Instant::now();
    let backend = match SqliteBackend::open(&config.storage, &config.queue, &config.sender).await {
        Ok(backend) => backend,
        Err(e) => {
            results.push(CheckResult::new("database", started, CheckStatus::Fail, e.to_string()));
            return results;
        }
    };
    results.push(match backend.health().await {
        HealthStatus::Healthy => CheckResult::new(
            "database",
            started,
            CheckStatus::Pass,
            config.storage.database_path.clone(),
        ),
        HealthStatus::Degraded(reason) => CheckResult::new("database", started, CheckStatus::Warn, reason),
        HealthStatus::Unhealthy(reason) => CheckResult::new("database", started, CheckStatus::Fail, reason),
    });

    if let Some(registry) = &registry {
        results.push(check_channels(&backend, registry).await);
    }
    results
}

async fn check_channels(backend: &SqliteBackend, registry: &HandlerRegistry) -> CheckResult {
    let started = Instant::now();
    let channels = match backend.list_channels().await {
        Ok(channels) => channels,
        Err(e) => return CheckResult::new("channels", started, CheckStatus::Fail, e.to_string()),
    };
    let unhandled: Vec<String> = channels
        .iter()
        .filter(|c| registry.get(&c.channel_type).is_none())
        .map(|c| format!("{} ({})", c.uuid, c.channel_type))
        .collect();
    if unhandled.is_empty() {
        CheckResult::new(
            "channels",
            started,
            CheckStatus::Pass,
            format!("{} configured", channels.len()),
        )
    } else {
        CheckResult::new(
            "channels",
            started,
            CheckStatus::Warn,
            format!("no handler for {}", unhandled.join(", ")),
        )
    }
}

/// Runs the `courier check` command.
pub async fn run_check(config: &CourierConfig) -> Result<(), CourierError> {
    let results = run_checks(config).await;

    println!();
    println!("  courier check");
    println!("  {}", "-".repeat(50));
    println!("    [OK]   {:<12} loaded", "config");

    let mut failed = 0;
    for result in &results {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => {
                failed += 1;
                "[FAIL]"
            }
        };
        println!(
            "    {tag} {:<12} {} ({}ms)",
            result.name,
            result.message,
            result.duration.as_millis()
        );
    }
    println!();

    if failed > 0 {
        return Err(CourierError::Config(format!("{failed} check(s) failed")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> CourierConfig {
        let mut config = CourierConfig::default();
        config.storage.database_path = dir.path().join("courier.db").to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn fresh_install_passes() {
        let dir = tempfile::tempdir().unwrap();
        let results = run_checks(&config_in(&dir)).await;
        let names: Vec<_> = results.iter().map(|r| r.name).collect();
        assert_eq!(names, ["handlers", "database", "channels"]);
        assert!(results.iter().all(|r| r.status == CheckStatus::Pass), "{results:?}");
    }

    #[tokio::test]
    async fn disabling_every_handler_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.handlers.exclude = vec!["EX".into(), "TG".into()];
        let results = run_checks(&config).await;
        assert_eq!(results[0].status, CheckStatus::Fail);
        assert!(run_check(&config).await.is_err());
    }
}
