// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel records.

use courier_core::{Channel, ChannelType, ChannelUuid, CourierError};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::{Database, map_tr_err};
use crate::models::{conversion_err, from_json_col, to_json_col};

const CHANNEL_COLUMNS: &str = "uuid, channel_type, name, address, country, schemes, config";

fn channel_from_row(row: &Row<'_>) -> Result<Channel, rusqlite::Error> {
    let uuid: String = row.get(0)?;
    let channel_type: String = row.get(1)?;
    let schemes: String = row.get(5)?;
    let config: String = row.get(6)?;
    Ok(Channel {
        uuid: ChannelUuid::parse(&uuid).map_err(|e| conversion_err(0, e))?,
        channel_type: ChannelType::new(channel_type),
        name: row.get(2)?,
        address: row.get(3)?,
        country: row.get(4)?,
        schemes: from_json_col(5, &schemes)?,
        config: from_json_col(6, &config)?,
    })
}

/// Inserts or replaces a channel. Returns true when it did not exist before.
pub async fn upsert(db: &Database, channel: &Channel) -> Result<bool, CourierError> {
    let channel = channel.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let existed: bool = conn
                .query_row(
                    "SELECT 1 FROM channels WHERE uuid = ?1",
                    params![channel.uuid.to_string()],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            conn.execute(
                "INSERT INTO channels (uuid, channel_type, name, address, country, schemes, config)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (uuid) DO UPDATE SET
                    channel_type = excluded.channel_type,
                    name = excluded.name,
                    address = excluded.address,
                    country = excluded.country,
                    schemes = excluded.schemes,
                    config = excluded.config,
                    modified_on = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    channel.uuid.to_string(),
                    channel.channel_type.as_str(),
                    channel.name,
                    channel.address,
                    channel.country,
                    to_json_col(&channel.schemes)?,
                    to_json_col(&channel.config)?,
                ],
            )?;
            Ok(!existed)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, uuid: &ChannelUuid) -> Result<Option<Channel>, CourierError> {
    let uuid = uuid.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Channel>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE uuid = ?1"),
                params![uuid],
                channel_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list(db: &Database) -> Result<Vec<Channel>, CourierError> {
    db.connection()
        .call(|conn| -> Result<Vec<Channel>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY channel_type, uuid"
            ))?;
            let rows = stmt.query_map([], channel_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn upsert_then_get() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("c.db").to_str().unwrap())
            .await
            .unwrap();

        let channel = Channel::new(ChannelUuid::new_v4(), ChannelType::new("TG"), "courierbot")
            .with_schemes(&["telegram"])
            .with_config("auth_token", "123:abc");
        assert!(upsert(&db, &channel).await.unwrap());

        let loaded = get(&db, &channel.uuid).await.unwrap().unwrap();
        assert_eq!(loaded, channel);

        let renamed = Channel {
            name: "Courier Bot".into(),
            ..channel.clone()
        };
        assert!(!upsert(&db, &renamed).await.unwrap());
        assert_eq!(list(&db).await.unwrap(), vec![renamed]);

        assert!(get(&db, &ChannelUuid::new_v4()).await.unwrap().is_none());
    }
}
