// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sealed payment-session lifecycle on top of the storage layer.
//!
//! A [`SessionStore`] seals attendee contact details with AES-256-GCM
//! before they reach SQLite and opens them again on validated reads.
//! Every failed validation purges the row: a token that was ever
//! rejected can never be replayed.

use chrono::{Duration, Utc};
use tracing::{debug, warn};
use usher_config::model::SessionConfig;
use usher_core::error::UsherError;
use usher_core::types::{Attendee, PaymentSession, SessionToken};
use usher_storage::models::{SealedSession, SessionRow};
use usher_storage::queries::sessions;
use usher_storage::Database;
use zeroize::Zeroizing;

use crate::crypto;

/// Why a token failed validation.
///
/// The messages are shown to attendees verbatim, so they say what to do
/// next rather than what went wrong internally.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no active session for this link; please start your registration again")]
    NotFound,
    #[error("your session has expired; please start your registration again")]
    Expired,
    #[error("your session could not be read; please start your registration again")]
    Malformed,
    #[error("this session belongs to a different event; please use the link you were sent")]
    EventMismatch,
    #[error(transparent)]
    Storage(#[from] UsherError),
}

/// Sealed-session store bound to one encryption key.
///
/// Holds the AES key in zeroizing memory. Not `Clone`; share it behind
/// an `Arc` so the key exists in exactly one allocation.
pub struct SessionStore {
    db: Database,
    key: Zeroizing<[u8; 32]>,
    ttl_minutes: u32,
    card_ttl_minutes: u32,
}

impl SessionStore {
    /// Builds a store from the session section of the config.
    ///
    /// Fails when the encryption key is absent or is not 64 hex chars;
    /// a server without a key must not accept registrations.
    pub fn new(db: Database, config: &SessionConfig) -> Result<Self, UsherError> {
        let hex_key = config
            .encryption_key
            .as_deref()
            .ok_or_else(|| UsherError::Config("session encryption key not configured".into()))?;
        let raw = hex::decode(hex_key)
            .map_err(|_| UsherError::Config("session encryption key is not valid hex".into()))?;
        let key: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
            UsherError::Config("session encryption key must be 32 bytes (64 hex chars)".into())
        })?;
        Ok(Self {
            db,
            key: Zeroizing::new(key),
            ttl_minutes: config.ttl_minutes.min(u64::from(u32::MAX)) as u32,
            card_ttl_minutes: config.card_ttl_minutes.min(u64::from(u32::MAX)) as u32,
        })
    }

    /// Seals attendee details into a new session envelope.
    ///
    /// The envelope is persisted atomically with its registration by
    /// the submission transaction, not here.
    pub fn prepare(&self, attendee: &Attendee) -> Result<SealedSession, UsherError> {
        let plaintext = serde_json::to_vec(attendee)
            .map_err(|e| UsherError::Internal(format!("attendee encode failed: {e}")))?;
        let (sealed, nonce) = crypto::seal(&self.key, &plaintext)?;
        Ok(SealedSession {
            token: SessionToken::generate(),
            attendee_sealed: sealed,
            attendee_nonce: nonce.to_vec(),
            expires_at: Utc::now() + Duration::minutes(i64::from(self.ttl_minutes)),
        })
    }

    /// Resolves a token for one event's payment routes.
    ///
    /// Checks expiry, event binding, and envelope integrity in that
    /// order. Any failure purges the stored row before returning, so a
    /// rejected token is gone for good.
    pub async fn validate(
        &self,
        token: &SessionToken,
        route_event_id: i64,
    ) -> Result<PaymentSession, SessionError> {
        let Some(row) = sessions::get(&self.db, token).await? else {
            return Err(SessionError::NotFound);
        };
        if Utc::now() > row.expires_at {
            self.purge(token, "expired").await;
            return Err(SessionError::Expired);
        }
        if row.event_id != route_event_id {
            self.purge(token, "event mismatch").await;
            return Err(SessionError::EventMismatch);
        }
        match self.open_row(&row) {
            Ok(session) => Ok(session),
            Err(e) => {
                self.purge(token, "unreadable envelope").await;
                Err(e)
            }
        }
    }

    /// Looks up the session holding a gateway invoice and opens it.
    ///
    /// Used by callback and reconciliation paths, which identify the
    /// session by invoice rather than by bearer token.
    pub async fn find_by_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<Option<PaymentSession>, SessionError> {
        match sessions::find_by_invoice(&self.db, invoice_id).await? {
            Some(row) => Ok(Some(self.open_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Decrypts and assembles a full [`PaymentSession`] from a stored row.
    pub fn open_row(&self, row: &SessionRow) -> Result<PaymentSession, SessionError> {
        let nonce: [u8; 12] = row
            .attendee_nonce
            .as_slice()
            .try_into()
            .map_err(|_| SessionError::Malformed)?;
        let plaintext = crypto::open(&self.key, &nonce, &row.attendee_sealed)
            .map_err(|_| SessionError::Malformed)?;
        let attendee: Attendee =
            serde_json::from_slice(&plaintext).map_err(|_| SessionError::Malformed)?;
        let ticket_selections = serde_json::from_str(&row.ticket_selections_json)
            .map_err(|_| SessionError::Malformed)?;
        Ok(PaymentSession {
            token: SessionToken(row.token.clone()),
            event_id: row.event_id,
            registration_id: usher_core::types::RegistrationId(row.registration_id.clone()),
            attendee,
            ticket_selections,
            total_amount_cents: row.total_amount_cents,
            currency: row.currency.clone(),
            preferred_method: row.preferred_method,
            order_id: row.order_id.clone(),
            invoice_id: row.invoice_id.clone(),
            payment_expires_at: row.payment_expires_at,
            webhook_fallback: row.webhook_fallback,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }

    /// Binds a card attempt and extends the session to the card TTL.
    pub async fn extend_for_card(
        &self,
        token: &SessionToken,
        order_id: &str,
        invoice_id: &str,
    ) -> Result<bool, UsherError> {
        sessions::extend_for_card(&self.db, token, order_id, invoice_id, self.card_ttl_minutes)
            .await
    }

    /// Flags that the browser callback left the outcome to the webhook.
    pub async fn set_webhook_fallback(&self, token: &SessionToken) -> Result<bool, UsherError> {
        sessions::set_webhook_fallback(&self.db, token).await
    }

    /// Clears the card sub-state after a failed attempt and re-extends
    /// the session at the base TTL so the attendee can retry.
    pub async fn reopen_for_retry(&self, invoice_id: &str) -> Result<bool, UsherError> {
        let reopened = sessions::reopen_for_retry(&self.db, invoice_id, self.ttl_minutes).await?;
        Ok(reopened.is_some())
    }

    /// Removes a session outright, e.g. after confirmation or decline.
    pub async fn destroy(&self, token: &SessionToken) -> Result<bool, UsherError> {
        sessions::delete(&self.db, token).await
    }

    /// Sweeps sessions past every applicable deadline.
    pub async fn purge_expired(&self) -> Result<usize, UsherError> {
        let purged = sessions::purge_expired(&self.db).await?;
        if purged > 0 {
            debug!(purged, "purged expired payment sessions");
        }
        Ok(purged)
    }

    /// Best-effort purge on a failed validation. A storage error here
    /// must not mask the validation verdict, so it is only logged.
    async fn purge(&self, token: &SessionToken, reason: &str) {
        match sessions::delete(&self.db, token).await {
            Ok(_) => debug!(token = %token.0, reason, "purged rejected session"),
            Err(e) => warn!(token = %token.0, reason, error = %e, "failed to purge rejected session"),
        }
    }
}
