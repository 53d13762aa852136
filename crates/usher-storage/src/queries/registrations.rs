// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registration rows and their lifecycle transitions.
//!
//! Every transition runs as one SQLite transaction on the writer thread.
//! Inventory moves with the registration row: decremented on submission,
//! restored on cancellation (and on decline only when the caller asks).
//! The partial unique indexes on (event_id, email) and (event_id, phone)
//! over live rows are the authoritative duplicate backstop; application
//! level checks are a courtesy in front of them.

use chrono::{Duration, Utc};
use rusqlite::params;
use tracing::info;

use usher_core::types::{Attendee, PaymentMethod, Registration, RegistrationId, RegistrationStatus};
use usher_core::UsherError;

use crate::database::Database;
use crate::models::{
    now_iso, parse_enum, parse_iso, parse_json, to_iso, NewRegistration, SealedSession,
};

/// Result of the atomic submission transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Created,
    /// A live registration already holds this email or phone for the event.
    DuplicateIdentity,
    /// A selection referenced a ticket that does not belong to the event.
    UnknownTicket { ticket_id: i64 },
    /// Not enough availability left for a selection line.
    InsufficientInventory { ticket_id: i64 },
}

/// Result of a lifecycle transition keyed by registration id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The row exists but is no longer pending.
    NotPending { current: RegistrationStatus },
    NotFound,
}

/// Atomically create a registration: guarded inventory decrement, row
/// insert, optional sealed session insert, lock release.
///
/// Rolls back wholesale on any non-`Created` outcome; a partial submission
/// (tickets taken but no row, or a session without its registration) is
/// never visible.
pub async fn create_submission(
    db: &Database,
    reg: NewRegistration,
    session: Option<SealedSession>,
) -> Result<SubmissionOutcome, UsherError> {
    let selections_json = serde_json::to_string(&reg.selections)
        .map_err(|e| UsherError::Internal(format!("selection serialization: {e}")))?;
    let now = now_iso();

    let outcome = db
        .connection()
        .call(move |conn| -> Result<SubmissionOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;

            for line in &reg.selections {
                let changed = tx.execute(
                    "UPDATE tickets SET available = available - ?1
                     WHERE id = ?2 AND event_id = ?3 AND available >= ?1",
                    params![i64::from(line.quantity), line.ticket_id, reg.event_id],
                )?;
                if changed == 0 {
                    let exists: i64 = tx.query_row(
                        "SELECT count(*) FROM tickets WHERE id = ?1 AND event_id = ?2",
                        params![line.ticket_id, reg.event_id],
                        |row| row.get(0),
                    )?;
                    return Ok(if exists == 0 {
                        SubmissionOutcome::UnknownTicket {
                            ticket_id: line.ticket_id,
                        }
                    } else {
                        SubmissionOutcome::InsufficientInventory {
                            ticket_id: line.ticket_id,
                        }
                    });
                }
            }

            let inserted = tx.execute(
                "INSERT INTO registrations (id, event_id, attendee_name, email, phone,
                     ticket_selections, total_amount_cents, currency, status,
                     payment_status, payment_method, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
                params![
                    reg.id.0,
                    reg.event_id,
                    reg.attendee.name,
                    reg.attendee.email,
                    reg.attendee.phone,
                    selections_json,
                    reg.total_amount_cents,
                    reg.currency,
                    reg.status.to_string(),
                    reg.payment_status.to_string(),
                    reg.preferred_method.map(|m| m.to_string()),
                    now,
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    // Partial unique index tripped: the check->insert race
                    // lost to a concurrent live registration.
                    return Ok(SubmissionOutcome::DuplicateIdentity);
                }
                Err(e) => return Err(e),
            }

            if let Some(seal) = &session {
                tx.execute(
                    "INSERT INTO payment_sessions (token, event_id, registration_id,
                         attendee_sealed, attendee_nonce, ticket_selections,
                         total_amount_cents, currency, preferred_method, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        seal.token.0,
                        reg.event_id,
                        reg.id.0,
                        seal.attendee_sealed,
                        seal.attendee_nonce,
                        selections_json,
                        reg.total_amount_cents,
                        reg.currency,
                        reg.preferred_method.map(|m| m.to_string()),
                        to_iso(seal.expires_at),
                    ],
                )?;
            }

            // The live row now holds the identity; the in-flight lock has
            // done its job.
            tx.execute(
                "DELETE FROM registration_locks
                 WHERE event_id = ?1 AND (email = ?2 OR phone = ?3)",
                params![reg.event_id, reg.attendee.email, reg.attendee.phone],
            )?;

            tx.commit()?;
            Ok(SubmissionOutcome::Created)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if outcome == SubmissionOutcome::Created {
        info!("registration created");
    }
    Ok(outcome)
}

/// Fetch a registration by id.
pub async fn get(db: &Database, id: &RegistrationId) -> Result<Option<Registration>, UsherError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Option<Registration>, rusqlite::Error> {
            let result = conn.query_row(
                &format!("{SELECT_REGISTRATION} WHERE id = ?1"),
                params![id],
                map_registration,
            );
            match result {
                Ok(reg) => Ok(Some(reg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Find a live (pending or confirmed) registration holding this email.
pub async fn find_active_by_email(
    db: &Database,
    event_id: i64,
    email: &str,
) -> Result<Option<Registration>, UsherError> {
    let email = email.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Registration>, rusqlite::Error> {
            let result = conn.query_row(
                &format!(
                    "{SELECT_REGISTRATION}
                     WHERE event_id = ?1 AND email = ?2
                       AND status IN ('pending', 'confirmed')"
                ),
                params![event_id, email],
                map_registration,
            );
            match result {
                Ok(reg) => Ok(Some(reg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Find a live (pending or confirmed) registration holding this phone.
pub async fn find_active_by_phone(
    db: &Database,
    event_id: i64,
    phone: &str,
) -> Result<Option<Registration>, UsherError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Registration>, rusqlite::Error> {
            let result = conn.query_row(
                &format!(
                    "{SELECT_REGISTRATION}
                     WHERE event_id = ?1 AND phone = ?2
                       AND status IN ('pending', 'confirmed')"
                ),
                params![event_id, phone],
                map_registration,
            );
            match result {
                Ok(reg) => Ok(Some(reg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the chosen payment rail on a pending row.
///
/// Card attempts are stamped by the ledger insert instead, which also
/// carries the invoice id. Returns `false` when the row is not pending.
pub async fn set_payment_method(
    db: &Database,
    id: &RegistrationId,
    method: PaymentMethod,
) -> Result<bool, UsherError> {
    let id = id.0.clone();
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE registrations
                 SET payment_method = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'pending'",
                params![method.to_string(), now, id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Admin confirmation for payments settled outside the gateway (crypto).
///
/// Marks the registration confirmed and paid, and removes its open session.
pub async fn confirm_manual(
    db: &Database,
    id: &RegistrationId,
) -> Result<TransitionOutcome, UsherError> {
    let id = id.0.clone();
    let now = now_iso();
    let outcome = db
        .connection()
        .call(move |conn| -> Result<TransitionOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE registrations
                 SET status = 'confirmed', payment_status = 'completed',
                     confirmed_at = ?1, payment_completed_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                params![now, id],
            )?;
            if changed == 0 {
                return current_status(&tx, &id);
            }
            tx.execute(
                "DELETE FROM payment_sessions WHERE registration_id = ?1",
                params![id],
            )?;
            tx.commit()?;
            Ok(TransitionOutcome::Applied)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if outcome == TransitionOutcome::Applied {
        info!("registration manually confirmed");
    }
    Ok(outcome)
}

/// Admin decline. Releases the identity locks so the same email and phone
/// can register again; restocks availability only when asked to.
pub async fn decline(
    db: &Database,
    id: &RegistrationId,
    reason: &str,
    restock: bool,
) -> Result<TransitionOutcome, UsherError> {
    let id = id.0.clone();
    let reason = reason.to_string();
    let now = now_iso();
    let outcome = db
        .connection()
        .call(move |conn| -> Result<TransitionOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let row = tx.query_row(
                "SELECT event_id, email, phone, ticket_selections
                 FROM registrations WHERE id = ?1 AND status = 'pending'",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            );
            let (event_id, email, phone, selections_json) = match row {
                Ok(fields) => fields,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return current_status(&tx, &id);
                }
                Err(e) => return Err(e),
            };

            tx.execute(
                "UPDATE registrations
                 SET status = 'declined', decline_reason = ?1, declined_at = ?2,
                     updated_at = ?2
                 WHERE id = ?3",
                params![reason, now, id],
            )?;
            if restock {
                restock_selections(&tx, event_id, &selections_json)?;
            }
            tx.execute(
                "DELETE FROM registration_locks
                 WHERE event_id = ?1 AND (email = ?2 OR phone = ?3)",
                params![event_id, email, phone],
            )?;
            tx.execute(
                "DELETE FROM payment_sessions WHERE registration_id = ?1",
                params![id],
            )?;
            tx.commit()?;
            Ok(TransitionOutcome::Applied)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if outcome == TransitionOutcome::Applied {
        info!(restock, "registration declined");
    }
    Ok(outcome)
}

/// Attendee cancellation before payment. Restores availability and removes
/// the open session in the same transaction.
pub async fn cancel(db: &Database, id: &RegistrationId) -> Result<TransitionOutcome, UsherError> {
    let id = id.0.clone();
    let now = now_iso();
    let outcome = db
        .connection()
        .call(move |conn| -> Result<TransitionOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let row = tx.query_row(
                "SELECT event_id, ticket_selections
                 FROM registrations WHERE id = ?1 AND status = 'pending'",
                params![id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            );
            let (event_id, selections_json) = match row {
                Ok(fields) => fields,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return current_status(&tx, &id);
                }
                Err(e) => return Err(e),
            };

            tx.execute(
                "UPDATE registrations
                 SET status = 'cancelled', cancelled_at = ?1, updated_at = ?1
                 WHERE id = ?2",
                params![now, id],
            )?;
            restock_selections(&tx, event_id, &selections_json)?;
            tx.execute(
                "DELETE FROM payment_sessions WHERE registration_id = ?1",
                params![id],
            )?;
            tx.commit()?;
            Ok(TransitionOutcome::Applied)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if outcome == TransitionOutcome::Applied {
        info!("registration cancelled");
    }
    Ok(outcome)
}

/// Expire pending registrations whose session and card windows have both
/// lapsed. Returns the number of rows moved to expired.
///
/// Availability is deliberately NOT restored here; expiry mirrors decline,
/// where restocking is an explicit decision.
pub async fn expire_stale(db: &Database, grace_minutes: u32) -> Result<usize, UsherError> {
    let now = now_iso();
    let cutoff = to_iso(Utc::now() - Duration::minutes(i64::from(grace_minutes)));
    let expired = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let tx = conn.transaction()?;
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT r.id FROM registrations r
                     WHERE r.status = 'pending' AND r.created_at <= ?1
                       AND NOT EXISTS (
                           SELECT 1 FROM payment_sessions s
                           WHERE s.registration_id = r.id
                             AND (s.expires_at > ?2
                                  OR (s.payment_expires_at IS NOT NULL
                                      AND s.payment_expires_at > ?2))
                       )",
                )?;
                let rows = stmt.query_map(params![cutoff, now], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };

            for id in &ids {
                tx.execute(
                    "UPDATE registrations
                     SET status = 'expired',
                         payment_status = CASE payment_status
                             WHEN 'pending' THEN 'expired' ELSE payment_status END,
                         updated_at = ?1
                     WHERE id = ?2 AND status = 'pending'",
                    params![now, id],
                )?;
                tx.execute(
                    "DELETE FROM payment_sessions WHERE registration_id = ?1",
                    params![id],
                )?;
            }
            tx.commit()?;
            Ok(ids.len())
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if expired > 0 {
        info!(expired, "stale pending registrations expired");
    }
    Ok(expired)
}

const SELECT_REGISTRATION: &str = "SELECT id, event_id, attendee_name, email, phone,
     ticket_selections, total_amount_cents, currency, status, payment_status,
     payment_method, transaction_id, decline_reason, confirmed_at, declined_at,
     cancelled_at, payment_completed_at, created_at, updated_at
 FROM registrations";

pub(crate) fn map_registration(row: &rusqlite::Row<'_>) -> Result<Registration, rusqlite::Error> {
    let selections_json: String = row.get(5)?;
    let status: String = row.get(8)?;
    let payment_status: String = row.get(9)?;
    let payment_method: Option<String> = row.get(10)?;
    Ok(Registration {
        id: RegistrationId(row.get(0)?),
        event_id: row.get(1)?,
        attendee: Attendee {
            name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
        },
        ticket_selections: parse_json(5, &selections_json)?,
        total_amount_cents: row.get(6)?,
        currency: row.get(7)?,
        status: parse_enum(8, &status)?,
        payment_status: parse_enum(9, &payment_status)?,
        payment_method: payment_method
            .as_deref()
            .map(|m| parse_enum(10, m))
            .transpose()?,
        transaction_id: row.get(11)?,
        decline_reason: row.get(12)?,
        confirmed_at: opt_ts(row, 13)?,
        declined_at: opt_ts(row, 14)?,
        cancelled_at: opt_ts(row, 15)?,
        payment_completed_at: opt_ts(row, 16)?,
        created_at: parse_iso(17, &row.get::<_, String>(17)?)?,
        updated_at: parse_iso(18, &row.get::<_, String>(18)?)?,
    })
}

fn opt_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<Option<chrono::DateTime<Utc>>, rusqlite::Error> {
    let value: Option<String> = row.get(idx)?;
    value.as_deref().map(|t| parse_iso(idx, t)).transpose()
}

/// Resolve the outcome for a transition that matched no pending row.
fn current_status(
    tx: &rusqlite::Transaction<'_>,
    id: &str,
) -> Result<TransitionOutcome, rusqlite::Error> {
    let status: Result<String, _> = tx.query_row(
        "SELECT status FROM registrations WHERE id = ?1",
        params![id],
        |row| row.get(0),
    );
    match status {
        Ok(text) => Ok(TransitionOutcome::NotPending {
            current: parse_enum(0, &text)?,
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(TransitionOutcome::NotFound),
        Err(e) => Err(e),
    }
}

/// Put a registration's quantities back on the shelf.
fn restock_selections(
    tx: &rusqlite::Transaction<'_>,
    event_id: i64,
    selections_json: &str,
) -> Result<(), rusqlite::Error> {
    let selections: Vec<usher_core::types::TicketSelection> = parse_json(0, selections_json)?;
    for line in &selections {
        tx.execute(
            "UPDATE tickets SET available = available + ?1
             WHERE id = ?2 AND event_id = ?3",
            params![i64::from(line.quantity), line.ticket_id, event_id],
        )?;
    }
    Ok(())
}
