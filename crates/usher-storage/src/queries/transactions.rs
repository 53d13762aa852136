// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment transaction ledger rows.
//!
//! One row per gateway attempt, keyed by the gateway invoice id. Status
//! changes driven by webhooks and callbacks go through
//! `queries::outcomes::apply`, which owns the monotonicity rules; this
//! module covers insertion and reads.

use rusqlite::params;

use usher_core::types::{PaymentTransaction, RegistrationId};
use usher_core::UsherError;

use crate::database::Database;
use crate::models::{now_iso, parse_enum, parse_iso, parse_json, NewTransaction};

/// Insert the pending ledger row for a fresh invoice and stamp the
/// attempt onto the registration, as one transaction.
pub async fn insert_attempt(db: &Database, new: NewTransaction) -> Result<(), UsherError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO payment_transactions (id, registration_id, provider,
                     transaction_id, payment_method, amount_cents, currency,
                     status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
                params![
                    new.id,
                    new.registration_id.0,
                    new.provider,
                    new.transaction_id,
                    new.payment_method.to_string(),
                    new.amount_cents,
                    new.currency,
                    now,
                ],
            )?;
            tx.execute(
                "UPDATE registrations
                 SET transaction_id = ?1, payment_method = ?2, updated_at = ?3
                 WHERE id = ?4 AND status = 'pending'",
                params![
                    new.transaction_id,
                    new.payment_method.to_string(),
                    now,
                    new.registration_id.0
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a ledger row by gateway invoice id.
pub async fn get_by_invoice(
    db: &Database,
    invoice_id: &str,
) -> Result<Option<PaymentTransaction>, UsherError> {
    let invoice_id = invoice_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<PaymentTransaction>, rusqlite::Error> {
            let result = conn.query_row(
                &format!("{SELECT_TRANSACTION} WHERE transaction_id = ?1"),
                params![invoice_id],
                map_transaction,
            );
            match result {
                Ok(tx) => Ok(Some(tx)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List every attempt made for a registration, oldest first.
pub async fn list_by_registration(
    db: &Database,
    registration_id: &RegistrationId,
) -> Result<Vec<PaymentTransaction>, UsherError> {
    let registration_id = registration_id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Vec<PaymentTransaction>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_TRANSACTION} WHERE registration_id = ?1 ORDER BY created_at, id"
            ))?;
            let rows = stmt.query_map(params![registration_id], map_transaction)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

const SELECT_TRANSACTION: &str = "SELECT id, registration_id, provider, transaction_id,
     payment_method, amount_cents, currency, fee_cents, status, callback_data,
     processed_at, created_at, updated_at
 FROM payment_transactions";

pub(crate) fn map_transaction(
    row: &rusqlite::Row<'_>,
) -> Result<PaymentTransaction, rusqlite::Error> {
    let payment_method: String = row.get(4)?;
    let status: String = row.get(8)?;
    let callback_data: Option<String> = row.get(9)?;
    let processed_at: Option<String> = row.get(10)?;
    Ok(PaymentTransaction {
        id: row.get(0)?,
        registration_id: RegistrationId(row.get(1)?),
        provider: row.get(2)?,
        transaction_id: row.get(3)?,
        payment_method: parse_enum(4, &payment_method)?,
        amount_cents: row.get(5)?,
        currency: row.get(6)?,
        fee_cents: row.get(7)?,
        status: parse_enum(8, &status)?,
        callback_data: callback_data
            .as_deref()
            .map(|d| parse_json(9, d))
            .transpose()?,
        processed_at: processed_at
            .as_deref()
            .map(|t| parse_iso(10, t))
            .transpose()?,
        created_at: parse_iso(11, &row.get::<_, String>(11)?)?,
        updated_at: parse_iso(12, &row.get::<_, String>(12)?)?,
    })
}
