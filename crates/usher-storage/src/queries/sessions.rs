// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment session rows.
//!
//! Rows are only ever created inside the registration submission transaction;
//! this module reads, extends, reopens, and deletes them. The attendee columns
//! are ciphertext at this layer.

use chrono::{Duration, Utc};
use rusqlite::params;

use usher_core::types::SessionToken;
use usher_core::UsherError;

use crate::database::Database;
use crate::models::{now_iso, parse_enum, parse_iso, to_iso, SessionRow};

/// Fetch a session row by token. Expiry is the caller's judgement.
pub async fn get(db: &Database, token: &SessionToken) -> Result<Option<SessionRow>, UsherError> {
    let token = token.0.clone();
    db.connection()
        .call(move |conn| -> Result<Option<SessionRow>, rusqlite::Error> {
            let result = conn.query_row(
                &format!("{SELECT_SESSION} WHERE token = ?1"),
                params![token],
                map_session_row,
            );
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch the session currently bound to a gateway invoice.
pub async fn find_by_invoice(
    db: &Database,
    invoice_id: &str,
) -> Result<Option<SessionRow>, UsherError> {
    let invoice_id = invoice_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<SessionRow>, rusqlite::Error> {
            let result = conn.query_row(
                &format!("{SELECT_SESSION} WHERE invoice_id = ?1"),
                params![invoice_id],
                map_session_row,
            );
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Bind a card attempt to the session and extend both expiry windows.
///
/// Card payments get a longer leash than the form-filling TTL; both
/// `expires_at` and `payment_expires_at` move to now + `card_ttl_minutes`
/// so the expiry sweeps keep a single rule.
pub async fn extend_for_card(
    db: &Database,
    token: &SessionToken,
    order_id: &str,
    invoice_id: &str,
    card_ttl_minutes: u32,
) -> Result<bool, UsherError> {
    let token = token.0.clone();
    let order_id = order_id.to_string();
    let invoice_id = invoice_id.to_string();
    let deadline = to_iso(Utc::now() + Duration::minutes(i64::from(card_ttl_minutes)));
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE payment_sessions
                 SET order_id = ?1, invoice_id = ?2,
                     payment_expires_at = ?3, expires_at = ?3
                 WHERE token = ?4",
                params![order_id, invoice_id, deadline, token],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record that a browser callback saw a non-terminal invoice and the
/// webhook is expected to finish the job.
pub async fn set_webhook_fallback(db: &Database, token: &SessionToken) -> Result<bool, UsherError> {
    let token = token.0.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE payment_sessions SET webhook_fallback = 1 WHERE token = ?1",
                params![token],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Clear the card sub-state after a failed attempt and re-extend the
/// session so the attendee can retry without re-entering their details.
///
/// Returns the refreshed row, or `None` when no session holds the invoice.
pub async fn reopen_for_retry(
    db: &Database,
    invoice_id: &str,
    ttl_minutes: u32,
) -> Result<Option<SessionRow>, UsherError> {
    let invoice_id = invoice_id.to_string();
    let fresh_expiry = to_iso(Utc::now() + Duration::minutes(i64::from(ttl_minutes)));
    db.connection()
        .call(move |conn| -> Result<Option<SessionRow>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let token: Option<String> = match tx.query_row(
                "SELECT token FROM payment_sessions WHERE invoice_id = ?1",
                params![invoice_id],
                |row| row.get(0),
            ) {
                Ok(token) => Some(token),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e),
            };
            let Some(token) = token else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE payment_sessions
                 SET order_id = NULL, invoice_id = NULL, payment_expires_at = NULL,
                     webhook_fallback = 0, expires_at = ?1
                 WHERE token = ?2",
                params![fresh_expiry, token],
            )?;
            let row = tx.query_row(
                &format!("{SELECT_SESSION} WHERE token = ?1"),
                params![token],
                map_session_row,
            )?;
            tx.commit()?;
            Ok(Some(row))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Destroy a session. Returns whether a row was removed.
pub async fn delete(db: &Database, token: &SessionToken) -> Result<bool, UsherError> {
    let token = token.0.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "DELETE FROM payment_sessions WHERE token = ?1",
                params![token],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete sessions whose form window and card window have both lapsed.
/// Returns the number of rows removed.
pub async fn purge_expired(db: &Database) -> Result<usize, UsherError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM payment_sessions
                 WHERE expires_at <= ?1
                   AND (payment_expires_at IS NULL OR payment_expires_at <= ?1)",
                params![now],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

const SELECT_SESSION: &str = "SELECT token, event_id, registration_id, attendee_sealed,
     attendee_nonce, ticket_selections, total_amount_cents, currency,
     preferred_method, order_id, invoice_id, payment_expires_at,
     webhook_fallback, created_at, expires_at
 FROM payment_sessions";

pub(crate) fn map_session_row(row: &rusqlite::Row<'_>) -> Result<SessionRow, rusqlite::Error> {
    let preferred_method: Option<String> = row.get(8)?;
    let payment_expires_at: Option<String> = row.get(11)?;
    let webhook_fallback: i64 = row.get(12)?;
    Ok(SessionRow {
        token: row.get(0)?,
        event_id: row.get(1)?,
        registration_id: row.get(2)?,
        attendee_sealed: row.get(3)?,
        attendee_nonce: row.get(4)?,
        ticket_selections_json: row.get(5)?,
        total_amount_cents: row.get(6)?,
        currency: row.get(7)?,
        preferred_method: preferred_method
            .as_deref()
            .map(|m| parse_enum(8, m))
            .transpose()?,
        order_id: row.get(9)?,
        invoice_id: row.get(10)?,
        payment_expires_at: payment_expires_at
            .as_deref()
            .map(|t| parse_iso(11, t))
            .transpose()?,
        webhook_fallback: webhook_fallback != 0,
        created_at: parse_iso(13, &row.get::<_, String>(13)?)?,
        expires_at: parse_iso(14, &row.get::<_, String>(14)?)?,
    })
}
