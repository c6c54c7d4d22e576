// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message persistence and status transitions.

use chrono::Utc;
use courier_core::status::transition;
use courier_core::{
    ChannelType, ChannelUuid, CourierError, IncomingMsg, MsgId, MsgState, MsgStatus, OutgoingMsg,
    RetryPolicy, StatusUpdate, TaskEnvelope, Transition, Urn, WriteOutcome,
};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use uuid::Uuid;

use crate::database::{Database, map_tr_err};
use crate::models::{conversion_err, from_db_time, from_json_col, to_db_time, to_json_col};
use crate::queries::queue;

/// Stores an incoming message unless one with the same external id exists.
pub async fn insert_incoming(db: &Database, msg: &IncomingMsg) -> Result<WriteOutcome, CourierError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| -> Result<WriteOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let now = to_db_time(Utc::now());
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO msgs
                    (uuid, direction, channel_uuid, channel_type, urn, text, attachments, status,
                     external_id, contact_name, created_on, modified_on)
                 VALUES (?1, 'I', ?2, ?3, ?4, ?5, ?6, 'P', ?7, ?8, ?9, ?10)",
                params![
                    msg.uuid.to_string(),
                    msg.channel_uuid.to_string(),
                    msg.channel_type.as_str(),
                    msg.urn.to_string(),
                    msg.text,
                    to_json_col(&msg.attachments)?,
                    msg.external_id,
                    msg.contact_name,
                    to_db_time(msg.received_on),
                    now,
                ],
            )?;

            let outcome = if inserted == 1 {
                WriteOutcome::Written(MsgId(tx.last_insert_rowid()))
            } else {
                let existing: i64 = tx.query_row(
                    "SELECT id FROM msgs
                     WHERE direction = 'I' AND channel_uuid = ?1 AND external_id = ?2",
                    params![msg.channel_uuid.to_string(), msg.external_id],
                    |row| row.get(0),
                )?;
                WriteOutcome::Duplicate(MsgId(existing))
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Stores an outgoing message as queued and returns its id.
pub async fn insert_outgoing(db: &Database, msg: &OutgoingMsg) -> Result<MsgId, CourierError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| -> Result<MsgId, rusqlite::Error> { insert_outgoing_row(conn, &msg) })
        .await
        .map_err(map_tr_err)
}

/// Stores an outgoing message and pushes its send task in one transaction.
///
/// Either both the row and the task exist afterwards or neither does.
pub async fn insert_outgoing_queued(
    db: &Database,
    msg: &OutgoingMsg,
) -> Result<(MsgId, TaskEnvelope), CourierError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| -> Result<(MsgId, TaskEnvelope), rusqlite::Error> {
            let tx = conn.transaction()?;
            let id = insert_outgoing_row(&tx, &msg)?;
            let envelope = TaskEnvelope::send_msg(&msg.channel_uuid, id);
            let payload = envelope
                .encode()
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            queue::push_in(&tx, envelope.routing_key(), &payload, None)?;
            tx.commit()?;
            Ok((id, envelope))
        })
        .await
        .map_err(map_tr_err)
}

/// Removes an outgoing message that never made it onto a queue.
pub async fn delete_outgoing(db: &Database, id: MsgId) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "DELETE FROM msgs WHERE id = ?1 AND direction = 'O'",
                params![id.0],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn insert_outgoing_row(conn: &Connection, msg: &OutgoingMsg) -> Result<MsgId, rusqlite::Error> {
    let now = to_db_time(Utc::now());
    conn.execute(
        "INSERT INTO msgs
            (uuid, direction, channel_uuid, channel_type, urn, text, attachments, status,
             error_count, created_on, modified_on)
         VALUES (?1, 'O', ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)",
        params![
            msg.uuid.to_string(),
            msg.channel_uuid.to_string(),
            msg.channel_type.as_str(),
            msg.urn.to_string(),
            msg.text,
            to_json_col(&msg.attachments)?,
            MsgStatus::Queued.code(),
            to_db_time(msg.created_on),
            now,
        ],
    )?;
    Ok(MsgId(conn.last_insert_rowid()))
}

fn outgoing_from_row(row: &Row<'_>) -> Result<OutgoingMsg, rusqlite::Error> {
    let uuid: String = row.get(1)?;
    let channel_uuid: String = row.get(2)?;
    let channel_type: String = row.get(3)?;
    let urn: String = row.get(4)?;
    let attachments: String = row.get(6)?;
    let status: String = row.get(7)?;
    let created_on: String = row.get(10)?;
    Ok(OutgoingMsg {
        id: MsgId(row.get(0)?),
        uuid: Uuid::parse_str(&uuid).map_err(|e| conversion_err(1, e))?,
        channel_uuid: ChannelUuid::parse(&channel_uuid).map_err(|e| conversion_err(2, e))?,
        channel_type: ChannelType::new(channel_type),
        urn: Urn::parse(&urn).map_err(|e| conversion_err(4, e))?,
        text: row.get(5)?,
        attachments: from_json_col(6, &attachments)?,
        status: status.parse().map_err(|e| conversion_err(7, e))?,
        error_count: row.get(8)?,
        external_id: row.get(9)?,
        created_on: from_db_time(10, &created_on)?,
    })
}

pub async fn get_outgoing(db: &Database, id: MsgId) -> Result<Option<OutgoingMsg>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<OutgoingMsg>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, uuid, channel_uuid, channel_type, urn, text, attachments, status,
                        error_count, external_id, created_on
                 FROM msgs WHERE id = ?1 AND direction = 'O'",
                params![id.0],
                outgoing_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn was_sent(db: &Database, id: MsgId) -> Result<bool, CourierError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM msgs WHERE id = ?1 AND direction = 'O'",
                    params![id.0],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(status
                .and_then(|s| s.parse::<MsgStatus>().ok())
                .is_some_and(MsgStatus::was_sent))
        })
        .await
        .map_err(map_tr_err)
}

/// Locates the outgoing message an update refers to, with its current state.
fn find_target(
    tx: &Transaction<'_>,
    update: &StatusUpdate,
) -> Result<Option<(i64, MsgState)>, rusqlite::Error> {
    let map_row = |row: &Row<'_>| -> Result<(i64, String, u32), rusqlite::Error> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    };
    let found = match (&update.msg_id, &update.external_id) {
        (Some(id), _) => tx
            .query_row(
                "SELECT id, status, error_count FROM msgs
                 WHERE id = ?1 AND direction = 'O' AND channel_uuid = ?2",
                params![id.0, update.channel_uuid.to_string()],
                map_row,
            )
            .optional()?,
        (None, Some(external_id)) => tx
            .query_row(
                "SELECT id, status, error_count FROM msgs
                 WHERE direction = 'O' AND channel_uuid = ?1 AND external_id = ?2
                 ORDER BY id DESC LIMIT 1",
                params![update.channel_uuid.to_string(), external_id],
                map_row,
            )
            .optional()?,
        (None, None) => None,
    };

    found
        .map(|(id, status, error_count)| {
            let status = status.parse::<MsgStatus>().map_err(|e| conversion_err(1, e))?;
            Ok((id, MsgState { status, error_count }))
        })
        .transpose()
}

/// Applies a status update atomically. `None` when no message matches.
pub async fn apply_status(
    db: &Database,
    update: &StatusUpdate,
    policy: &RetryPolicy,
) -> Result<Option<Transition>, CourierError> {
    let update = update.clone();
    let policy = policy.clone();
    db.connection()
        .call(move |conn| -> Result<Option<Transition>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some((id, state)) = find_target(&tx, &update)? else {
                return Ok(None);
            };

            let result = transition(state, update.status, &policy);
            let now = Utc::now();
            if result.applied {
                let next_attempt = result
                    .retry_in
                    .and_then(|d| chrono::Duration::from_std(d).ok())
                    .map(|d| to_db_time(now + d));
                let sent = matches!(result.current.status, MsgStatus::Wired | MsgStatus::Sent);
                tx.execute(
                    "UPDATE msgs SET
                        status = ?1,
                        error_count = ?2,
                        next_attempt = ?3,
                        sent_on = CASE WHEN ?4 AND sent_on IS NULL THEN ?5 ELSE sent_on END,
                        external_id = COALESCE(?6, external_id),
                        modified_on = ?5
                     WHERE id = ?7",
                    params![
                        result.current.status.code(),
                        result.current.error_count,
                        next_attempt,
                        sent,
                        to_db_time(now),
                        update.new_external_id,
                        id,
                    ],
                )?;
            }
            if let Some(log_uuid) = update.log_uuid {
                tx.execute(
                    "UPDATE msgs SET log_uuids = json_insert(log_uuids, '$[#]', ?1) WHERE id = ?2",
                    params![log_uuid.to_string(), id],
                )?;
            }
            tx.commit()?;
            Ok(Some(result))
        })
        .await
        .map_err(map_tr_err)
}
