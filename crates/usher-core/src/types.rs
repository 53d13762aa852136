// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Usher workspace.
//!
//! Status enums carry their legal-transition tables here so every crate that
//! mutates a registration or transaction consults the same rules. Money is
//! always integer minor units plus an ISO currency code; floats never touch
//! an amount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque browser-held token identifying a payment session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

impl SessionToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Unique identifier for a registration record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationId(pub String);

impl RegistrationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Attendee identity captured at submission time.
///
/// Stored encrypted inside payment sessions; stored in the clear on the
/// durable registration row (it is the registration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// One priced line of a ticket selection.
///
/// Unit prices are resolved server-side from the tickets table at session
/// creation; client-submitted amounts are never trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSelection {
    pub ticket_id: i64,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub subtotal_cents: i64,
}

/// Sums the subtotals of a selection.
pub fn selection_total(selections: &[TicketSelection]) -> i64 {
    selections.iter().map(|s| s.subtotal_cents).sum()
}

/// Formats minor units as a human-readable amount, e.g. `"12.50 USD"`.
///
/// Only for log lines and mail bodies; arithmetic stays in cents.
pub fn format_amount(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02} {currency}", abs / 100, abs % 100)
}

/// Lifecycle state of a registration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Declined,
    Cancelled,
    Expired,
}

impl RegistrationStatus {
    /// True for states a registration can never leave.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Legal-transition table: every non-pending state is a dead end.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(
                next,
                Self::Confirmed | Self::Declined | Self::Cancelled | Self::Expired
            ),
            Self::Confirmed | Self::Declined | Self::Cancelled | Self::Expired => false,
        }
    }
}

/// Payment state carried on the registration row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Partial,
    Expired,
    Refunded,
}

/// Lifecycle state of a single ledger transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Partial,
    Expired,
}

impl TransactionStatus {
    /// True once the gateway has given a final answer for this attempt.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Legal-transition table. `Completed` is sticky: nothing moves a
    /// transaction off it. Late settlements (failed/expired invoices the
    /// gateway later reports paid) are allowed through and flagged as
    /// anomalies by the caller.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(
                next,
                Self::Completed | Self::Failed | Self::Partial | Self::Expired
            ),
            Self::Partial => matches!(next, Self::Completed | Self::Expired),
            Self::Failed => matches!(next, Self::Completed | Self::Expired),
            Self::Expired => matches!(next, Self::Completed),
            Self::Completed => false,
        }
    }
}

/// Payment rail chosen by the attendee.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Crypto,
}

/// A durable registration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub event_id: i64,
    pub attendee: Attendee,
    pub ticket_selections: Vec<TicketSelection>,
    pub total_amount_cents: i64,
    pub currency: String,
    pub status: RegistrationStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    /// Gateway invoice id of the attempt currently associated with this row.
    pub transaction_id: Option<String>,
    pub decline_reason: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub payment_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A decrypted payment session as seen by the service layer.
///
/// The storage row keeps the attendee fields as an AES-256-GCM sealed blob;
/// this view exists only after a successful open.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub token: SessionToken,
    pub event_id: i64,
    pub registration_id: RegistrationId,
    pub attendee: Attendee,
    pub ticket_selections: Vec<TicketSelection>,
    pub total_amount_cents: i64,
    pub currency: String,
    pub preferred_method: Option<PaymentMethod>,
    /// Merchant-side order reference, set once a card attempt begins.
    pub order_id: Option<String>,
    /// Gateway invoice id, set once a card attempt begins.
    pub invoice_id: Option<String>,
    /// Extended deadline for in-flight card payments.
    pub payment_expires_at: Option<DateTime<Utc>>,
    /// Set when a browser callback saw a non-terminal invoice and the
    /// webhook is expected to finish the job.
    pub webhook_fallback: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A ledger entry for one payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: String,
    pub registration_id: RegistrationId,
    /// Gateway identifier, e.g. `"cardlink"`.
    pub provider: String,
    /// Gateway invoice id. Unique across the ledger; the natural
    /// idempotency key for status updates.
    pub transaction_id: String,
    pub payment_method: PaymentMethod,
    pub amount_cents: i64,
    pub currency: String,
    pub fee_cents: Option<i64>,
    pub status: TransactionStatus,
    /// Snapshot of the gateway payload that produced the latest status.
    pub callback_data: Option<serde_json::Value>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
