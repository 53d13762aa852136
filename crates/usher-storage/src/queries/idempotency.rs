// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook idempotency keys.
//!
//! `check_and_record` is a single atomic step: the check inserts the marker,
//! so of two concurrent deliveries exactly one sees `Fresh`. Keys carry their
//! own TTL; expired rows are swept opportunistically on every check, keeping
//! the table bounded without a dedicated job.

use chrono::{Duration, Utc};
use rusqlite::params;

use usher_core::UsherError;

use crate::database::Database;
use crate::models::{now_iso, to_iso};

/// Outcome of an atomic key check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCheck {
    /// First sighting inside the TTL window; the marker is now recorded.
    Fresh,
    /// The key was already recorded by an earlier delivery.
    Duplicate,
}

/// Atomically record a key unless a live marker already holds it.
pub async fn check_and_record(
    db: &Database,
    key: &str,
    ttl_minutes: u32,
) -> Result<KeyCheck, UsherError> {
    let key = key.to_string();
    let now = now_iso();
    let expires_at = to_iso(Utc::now() + Duration::minutes(i64::from(ttl_minutes)));
    db.connection()
        .call(move |conn| -> Result<KeyCheck, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM idempotency_keys WHERE expires_at <= ?1",
                params![now],
            )?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO idempotency_keys (key, expires_at) VALUES (?1, ?2)",
                params![key, expires_at],
            )?;
            tx.commit()?;
            Ok(if inserted == 1 {
                KeyCheck::Fresh
            } else {
                KeyCheck::Duplicate
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete expired markers. Returns the number of rows removed.
pub async fn sweep_expired(db: &Database) -> Result<usize, UsherError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM idempotency_keys WHERE expires_at <= ?1",
                params![now],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}
