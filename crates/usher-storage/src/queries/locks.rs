// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Short-lived registration locks against concurrent duplicate submissions.
//!
//! A lock row claims an (event, email) and (event, phone) identity while a
//! submission is in flight. The unique indexes make acquisition race-free;
//! losing an acquisition race reads as "identity already claimed". Locks are
//! a fast-path courtesy only: the partial unique indexes on `registrations`
//! remain the authoritative duplicate backstop.

use chrono::{Duration, Utc};
use rusqlite::params;

use usher_core::UsherError;

use crate::database::Database;
use crate::models::{now_iso, to_iso};

/// Try to claim an identity for an in-flight submission.
///
/// Expired locks for the same identity are cleared first, so a crashed
/// submission never blocks a retry past the TTL. Returns `false` when a
/// live lock already holds the email or the phone.
pub async fn acquire(
    db: &Database,
    event_id: i64,
    email: &str,
    phone: &str,
    ttl_minutes: u32,
) -> Result<bool, UsherError> {
    let email = email.to_string();
    let phone = phone.to_string();
    let now = now_iso();
    let expires_at = to_iso(Utc::now() + Duration::minutes(i64::from(ttl_minutes)));

    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM registration_locks
                 WHERE event_id = ?1 AND (email = ?2 OR phone = ?3) AND expires_at <= ?4",
                params![event_id, email, phone, now],
            )?;
            let inserted = tx.execute(
                "INSERT INTO registration_locks (event_id, email, phone, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![event_id, email, phone, expires_at],
            );
            match inserted {
                Ok(_) => {
                    tx.commit()?;
                    Ok(true)
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    // Lost the race; the live lock stays untouched.
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Release the lock held for an identity, if any.
///
/// Returns the number of rows removed. Zero is normal on paths where the
/// submission transaction already cleared the lock.
pub async fn release(
    db: &Database,
    event_id: i64,
    email: &str,
    phone: &str,
) -> Result<usize, UsherError> {
    let email = email.to_string();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM registration_locks
                 WHERE event_id = ?1 AND (email = ?2 OR phone = ?3)",
                params![event_id, email, phone],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// True when a live lock holds the email or phone for this event.
pub async fn is_locked(
    db: &Database,
    event_id: i64,
    email: &str,
    phone: &str,
) -> Result<bool, UsherError> {
    let email = email.to_string();
    let phone = phone.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let count: i64 = conn.query_row(
                "SELECT count(*) FROM registration_locks
                 WHERE event_id = ?1 AND (email = ?2 OR phone = ?3) AND expires_at > ?4",
                params![event_id, email, phone, now],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete every expired lock. Returns the number of rows removed.
///
/// Runs at startup and from the background sweep so abandoned submissions
/// do not pin identities forever.
pub async fn sweep_expired(db: &Database) -> Result<usize, UsherError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM registration_locks WHERE expires_at <= ?1",
                params![now],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}
