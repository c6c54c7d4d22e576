// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier channel` commands: import and list channel records.

use std::path::Path;

use courier_config::CourierConfig;
use courier_core::{Channel, CourierError, HandlerRegistry};
use courier_storage::SqliteBackend;

/// Counts from one import.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    /// Channels whose type has no enabled handler. Stored anyway.
    pub unhandled: Vec<String>,
}

/// Parses one channel object or an array of them.
pub fn parse_channels(content: &str) -> Result<Vec<Channel>, CourierError> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| CourierError::Config(format!("invalid channel JSON: {e}")))?;
    let channels = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Channel>, _>>(),
        single => serde_json::from_value(single).map(|c| vec![c]),
    }
    .map_err(|e| CourierError::Config(format!("invalid channel record: {e}")))?;

    for channel in &channels {
        if channel.channel_type.as_str().is_empty() {
            return Err(CourierError::Config(format!(
                "channel {} has an empty channel_type",
                channel.uuid
            )));
        }
    }
    Ok(channels)
}

/// Saves every channel, replacing existing records with the same UUID.
pub async fn import_channels(
    backend: &SqliteBackend,
    registry: &HandlerRegistry,
    channels: &[Channel],
) -> Result<ImportSummary, CourierError> {
    let mut summary = ImportSummary::default();
    for channel in channels {
        if registry.get(&channel.channel_type).is_none() {
            tracing::warn!(
                channel_uuid = %channel.uuid,
                channel_type = %channel.channel_type,
                "no enabled handler for channel type"
            );
            summary.unhandled.push(channel.uuid.to_string());
        }
        if backend.save_channel(channel).await? {
            summary.created += 1;
        } else {
            summary.updated += 1;
        }
    }
    Ok(summary)
}

/// Runs `courier channel import <file>`.
pub async fn run_import(config: &CourierConfig, file: &Path) -> Result<(), CourierError> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| CourierError::Config(format!("cannot read {}: {e}", file.display())))?;
    let channels = parse_channels(&content)?;

    let backend = SqliteBackend::open(&config.storage, &config.queue, &config.sender).await?;
    let registry = courier_handlers::build_registry(&config.handlers, &config.http)?;
    let summary = import_channels(&backend, &registry, &channels).await?;
    backend.checkpoint().await?;

    println!(
        "imported {} channel(s): {} created, {} updated",
        channels.len(),
        summary.created,
        summary.updated
    );
    for uuid in &summary.unhandled {
        println!("  warning: channel {uuid} has no enabled handler");
    }
    Ok(())
}

/// Runs `courier channel list`.
pub async fn run_list(config: &CourierConfig) -> Result<(), CourierError> {
    let backend = SqliteBackend::open(&config.storage, &config.queue, &config.sender).await?;
    let channels = backend.list_channels().await?;
    if channels.is_empty() {
        println!("no channels");
        return Ok(());
    }
    for channel in channels {
        println!(
            "{:<4} {}  {:<16} {:<3} {}",
            channel.channel_type.as_str(),
            channel.uuid,
            channel.address,
            channel.country.as_deref().unwrap_or("-"),
            channel.name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::model::{HandlersConfig, HttpConfig, QueueConfig, SenderConfig, StorageConfig};
    use courier_core::{ChannelType, ChannelUuid};

    const CHANNELS: &str = r#"[
        {"uuid": "dbc126ed-66bc-4e28-b67b-81dc3327c95d", "channel_type": "ex", "address": "2020", "country": "RW",
         "config": {"send_url": "https://example.com/send"}},
        {"uuid": "8eb23e93-5ecb-45ba-b726-3b064e0c56ab", "channel_type": "ZZ", "address": "bot"}
    ]"#;

    #[test]
    fn parses_arrays_and_single_objects() {
        let channels = parse_channels(CHANNELS).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].channel_type, ChannelType::new("EX"));
        assert_eq!(channels[0].config.string("send_url"), Some("https://example.com/send"));

        let single = parse_channels(r#"{"uuid": "dbc126ed-66bc-4e28-b67b-81dc3327c95d", "channel_type": "TG"}"#)
            .unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn rejects_malformed_records() {
        assert!(parse_channels("not json").is_err());
        assert!(parse_channels(r#"[{"channel_type": "EX"}]"#).is_err());
    }

    #[tokio::test]
    async fn import_creates_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            database_path: dir.path().join("courier.db").to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };
        let backend = SqliteBackend::open(&storage, &QueueConfig::default(), &SenderConfig::default())
            .await
            .unwrap();
        let registry = courier_handlers::build_registry(&HandlersConfig::default(), &HttpConfig::default())
            .unwrap();
        let channels = parse_channels(CHANNELS).unwrap();

        let first = import_channels(&backend, &registry, &channels).await.unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(first.unhandled, vec!["8eb23e93-5ecb-45ba-b726-3b064e0c56ab".to_string()]);

        let again = import_channels(&backend, &registry, &channels).await.unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.updated, 2);

        let stored = backend.list_channels().await.unwrap();
        assert_eq!(stored.len(), 2);
        let uuid = ChannelUuid::parse("dbc126ed-66bc-4e28-b67b-81dc3327c95d").unwrap();
        assert!(stored.iter().any(|c| c.uuid == uuid && c.country.as_deref() == Some("RW")));
    }
}
