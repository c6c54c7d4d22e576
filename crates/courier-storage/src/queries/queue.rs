// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations for crash-safe task processing.
//!
//! An item is `pending` until leased. A lease marks it `leased` with a lock
//! deadline; acknowledging deletes it, and a lease whose deadline has passed
//! makes the item available again.

use chrono::{DateTime, Utc};
use courier_core::{CourierError, RawLease};
use rusqlite::{OptionalExtension, Transaction, params};

use crate::database::{Database, map_tr_err};
use crate::models::to_db_time;

/// Condition for an item that may be leased at the time bound to `now`.
fn available(now: &str) -> String {
    format!(
        "((status = 'pending' AND (not_before IS NULL OR not_before <= {now}))
          OR (status = 'leased' AND locked_until <= {now}))"
    )
}

/// Appends an item and records the queue binding in the same transaction.
pub async fn push(
    db: &Database,
    queue_name: &str,
    payload: String,
    not_before: Option<DateTime<Utc>>,
) -> Result<i64, CourierError> {
    let queue_name = queue_name.to_string();
    let not_before = not_before.map(to_db_time);
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            let tx = conn.transaction()?;
            let id = push_in(&tx, &queue_name, &payload, not_before.as_deref())?;
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

/// Appends an item inside a caller's transaction.
pub(crate) fn push_in(
    tx: &Transaction<'_>,
    queue_name: &str,
    payload: &str,
    not_before: Option<&str>,
) -> Result<i64, rusqlite::Error> {
    let now = to_db_time(Utc::now());
    tx.execute(
        "INSERT INTO queue_bindings (queue_name, created_at) VALUES (?1, ?2)
         ON CONFLICT (queue_name) DO NOTHING",
        params![queue_name, now],
    )?;
    tx.execute(
        "INSERT INTO queue (queue_name, payload, not_before, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![queue_name, payload, not_before, now],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Leases the oldest available item of `queue_name` until `locked_until`.
pub async fn lease(
    db: &Database,
    queue_name: &str,
    now: DateTime<Utc>,
    locked_until: DateTime<Utc>,
) -> Result<Option<RawLease>, CourierError> {
    let queue_name = queue_name.to_string();
    let now = to_db_time(now);
    let locked_until = to_db_time(locked_until);
    db.connection()
        .call(move |conn| -> Result<Option<RawLease>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let next: Option<(i64, String)> = tx
                .query_row(
                    &format!(
                        "SELECT id, payload FROM queue
                         WHERE queue_name = ?1 AND {}
                         ORDER BY id ASC LIMIT 1",
                        available("?2")
                    ),
                    params![queue_name, now],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((id, payload)) = next else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE queue SET status = 'leased', locked_until = ?1 WHERE id = ?2",
                params![locked_until, id],
            )?;
            tx.commit()?;
            Ok(Some(RawLease {
                lease_id: id,
                payload,
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes a leased item.
pub async fn ack(db: &Database, id: i64) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute("DELETE FROM queue WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Names of queues with available items, ordered by their oldest item.
pub async fn ready_queues(db: &Database, now: DateTime<Utc>) -> Result<Vec<String>, CourierError> {
    let now = to_db_time(now);
    db.connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT queue_name FROM queue WHERE {}
                 GROUP BY queue_name ORDER BY MIN(id)",
                available("?1")
            ))?;
            let rows = stmt.query_map(params![now], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn bindings(db: &Database) -> Result<Vec<String>, CourierError> {
    db.connection()
        .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT queue_name FROM queue_bindings ORDER BY queue_name")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn size(db: &Database, queue_name: &str) -> Result<usize, CourierError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM queue WHERE queue_name = ?1",
                params![queue_name],
                |row| row.get(0),
            )
        })
        .await
        .map(|count| usize::try_from(count).unwrap_or_default())
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn fifo_lease_and_ack() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        push(&db, "msgs:a", "one".into(), None).await.unwrap();
        push(&db, "msgs:a", "two".into(), None).await.unwrap();

        let first = lease(&db, "msgs:a", now, now + Duration::minutes(5)).await.unwrap().unwrap();
        assert_eq!(first.payload, "one");
        let second = lease(&db, "msgs:a", now, now + Duration::minutes(5)).await.unwrap().unwrap();
        assert_eq!(second.payload, "two");
        assert!(lease(&db, "msgs:a", now, now).await.unwrap().is_none());

        assert_eq!(size(&db, "msgs:a").await.unwrap(), 2);
        ack(&db, first.lease_id).await.unwrap();
        ack(&db, second.lease_id).await.unwrap();
        assert_eq!(size(&db, "msgs:a").await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_lease_is_redelivered() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        push(&db, "q", "payload".into(), None).await.unwrap();

        let leased = lease(&db, "q", now, now + Duration::seconds(30)).await.unwrap().unwrap();
        assert!(lease(&db, "q", now + Duration::seconds(10), now).await.unwrap().is_none());

        let again = lease(&db, "q", now + Duration::seconds(31), now + Duration::minutes(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.lease_id, leased.lease_id);
    }

    #[tokio::test]
    async fn not_before_delays_items() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        push(&db, "q", "later".into(), Some(now + Duration::minutes(5))).await.unwrap();
        push(&db, "q", "now".into(), None).await.unwrap();

        let got = lease(&db, "q", now, now + Duration::minutes(5)).await.unwrap().unwrap();
        assert_eq!(got.payload, "now");
        assert!(lease(&db, "q", now, now).await.unwrap().is_none());
        assert!(ready_queues(&db, now).await.unwrap().is_empty());

        let later = now + Duration::minutes(6);
        assert_eq!(ready_queues(&db, later).await.unwrap(), vec!["q".to_string()]);
    }

    #[tokio::test]
    async fn bindings_survive_empty_queues() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        push(&db, "msgs:b", "x".into(), None).await.unwrap();
        push(&db, "msgs:a", "y".into(), None).await.unwrap();
        assert_eq!(
            ready_queues(&db, now).await.unwrap(),
            vec!["msgs:b".to_string(), "msgs:a".to_string()]
        );

        let item = lease(&db, "msgs:b", now, now + Duration::minutes(5)).await.unwrap().unwrap();
        ack(&db, item.lease_id).await.unwrap();
        assert_eq!(
            bindings(&db).await.unwrap(),
            vec!["msgs:a".to_string(), "msgs:b".to_string()]
        );
    }
}
