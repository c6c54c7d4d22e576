// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel log records. Logs arrive already redacted.

use courier_core::{ChannelLog, ChannelUuid, CourierError};
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::{from_json_col, to_db_time};

pub async fn insert(db: &Database, clog: &ChannelLog) -> Result<(), CourierError> {
    let uuid = clog.uuid.to_string();
    let log_type = clog.log_type.to_string();
    let channel_uuid = clog.channel_uuid.map(|c| c.to_string());
    let msg_id = clog.msg_id.map(|m| m.0);
    let http_logs = serde_json::to_string(&clog.http_logs).map_err(CourierError::storage)?;
    let errors = serde_json::to_string(&clog.errors).map_err(CourierError::storage)?;
    let is_error = clog.is_error();
    let elapsed_ms = i64::try_from(clog.elapsed_ms).unwrap_or(i64::MAX);
    let created_on = to_db_time(clog.created_on);

    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO channel_logs
                    (uuid, log_type, channel_uuid, msg_id, http_logs, errors, is_error, elapsed_ms, created_on)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![uuid, log_type, channel_uuid, msg_id, http_logs, errors, is_error, elapsed_ms, created_on],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// A stored log as read back for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLog {
    pub uuid: String,
    pub log_type: String,
    pub msg_id: Option<i64>,
    pub http_logs: serde_json::Value,
    pub errors: serde_json::Value,
    pub is_error: bool,
}

/// Most recent logs of a channel, newest first.
pub async fn recent_for_channel(
    db: &Database,
    channel_uuid: &ChannelUuid,
    limit: usize,
) -> Result<Vec<StoredLog>, CourierError> {
    let channel_uuid = channel_uuid.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<StoredLog>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT uuid, log_type, msg_id, http_logs, errors, is_error
                 FROM channel_logs WHERE channel_uuid = ?1
                 ORDER BY created_on DESC, rowid DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![channel_uuid, limit], |row| {
                let http_logs: String = row.get(3)?;
                let errors: String = row.get(4)?;
                Ok(StoredLog {
                    uuid: row.get(0)?,
                    log_type: row.get(1)?,
                    msg_id: row.get(2)?,
                    http_logs: from_json_col(3, &http_logs)?,
                    errors: from_json_col(4, &errors)?,
                    is_error: row.get(5)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
