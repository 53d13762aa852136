// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage row types and column conversion helpers.
//!
//! The canonical domain types live in `usher-core::types` and are re-exported
//! here for convenience within the storage crate. Types that only exist at
//! the storage layer (sealed session rows, inventory rows) are defined here.

use chrono::{DateTime, SecondsFormat, Utc};

pub use usher_core::types::{
    PaymentMethod, PaymentStatus, PaymentTransaction, Registration, RegistrationId,
    RegistrationStatus, SessionToken, TransactionStatus,
};

/// An event open for registration.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub starts_at: DateTime<Utc>,
}

/// One ticket class of an event, with live inventory.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub price_cents: i64,
    pub available: i64,
}

/// A payment session exactly as stored: attendee identity is an opaque
/// AES-256-GCM ciphertext plus nonce, selections are a JSON string.
///
/// `usher-session` owns the key and turns this into the decrypted
/// `PaymentSession` view; nothing below that layer can read the attendee.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub token: String,
    pub event_id: i64,
    pub registration_id: String,
    pub attendee_sealed: Vec<u8>,
    pub attendee_nonce: Vec<u8>,
    pub ticket_selections_json: String,
    pub total_amount_cents: i64,
    pub currency: String,
    pub preferred_method: Option<PaymentMethod>,
    pub order_id: Option<String>,
    pub invoice_id: Option<String>,
    pub payment_expires_at: Option<DateTime<Utc>>,
    pub webhook_fallback: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Input for the atomic registration submission.
///
/// Selections must already be server-priced; storage trusts the totals it is
/// handed and only enforces inventory and identity uniqueness.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub id: RegistrationId,
    pub event_id: i64,
    pub attendee: usher_core::types::Attendee,
    pub selections: Vec<usher_core::types::TicketSelection>,
    pub total_amount_cents: i64,
    pub currency: String,
    pub status: RegistrationStatus,
    pub payment_status: PaymentStatus,
    pub preferred_method: Option<PaymentMethod>,
}

/// Encrypted session payload inserted alongside a pending registration.
///
/// Sealing happens above the storage layer; by the time a row reaches here
/// the attendee identity is ciphertext.
#[derive(Debug, Clone)]
pub struct SealedSession {
    pub token: SessionToken,
    pub attendee_sealed: Vec<u8>,
    pub attendee_nonce: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

/// Input for a new ledger row at invoice-creation time.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: String,
    pub registration_id: RegistrationId,
    pub provider: String,
    /// Gateway invoice id; unique across the ledger.
    pub transaction_id: String,
    pub payment_method: PaymentMethod,
    pub amount_cents: i64,
    pub currency: String,
}

/// Current UTC time in the canonical column format.
///
/// Matches SQLite's `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` defaults so rows
/// written from Rust and rows written by column defaults compare correctly.
pub fn now_iso() -> String {
    to_iso(Utc::now())
}

/// Format a timestamp in the canonical column format.
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp column, reporting malformed values as a column
/// conversion failure at `idx`.
pub fn parse_iso(idx: usize, value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                format!("bad timestamp {value:?}: {e}").into(),
            )
        })
}

/// Parse a status-style TEXT column into one of the strum-backed enums.
pub fn parse_enum<T>(idx: usize, value: &str) -> Result<T, rusqlite::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("bad enum value {value:?}: {e}").into(),
        )
    })
}

/// Parse a JSON TEXT column, reporting malformed payloads as a column
/// conversion failure at `idx`.
pub fn parse_json<T: serde::de::DeserializeOwned>(
    idx: usize,
    value: &str,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("bad JSON column: {e}").into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_round_trip_keeps_millisecond_precision() {
        let now = Utc::now();
        let text = to_iso(now);
        let back = parse_iso(0, &text).unwrap();
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn iso_format_matches_sqlite_strftime_shape() {
        let text = to_iso(Utc::now());
        // e.g. 2026-03-01T09:30:00.123Z
        assert_eq!(text.len(), 24);
        assert!(text.ends_with('Z'));
        assert_eq!(&text[10..11], "T");
    }

    #[test]
    fn parse_enum_surfaces_bad_values_as_conversion_failures() {
        let err = parse_enum::<RegistrationStatus>(3, "garbage").unwrap_err();
        match err {
            rusqlite::Error::FromSqlConversionFailure(idx, _, _) => assert_eq!(idx, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_iso_rejects_non_timestamps() {
        assert!(parse_iso(0, "not-a-date").is_err());
    }
}
