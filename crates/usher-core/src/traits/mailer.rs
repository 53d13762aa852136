// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mailer trait for attendee notifications.

use async_trait::async_trait;

use crate::error::UsherError;

/// A notification to an attendee.
///
/// Variants carry exactly the fields their template renders; the mailer has
/// no access to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    RegistrationConfirmed {
        to: String,
        attendee_name: String,
        event_name: String,
        registration_id: String,
        total_amount_cents: i64,
        currency: String,
    },
    RegistrationDeclined {
        to: String,
        attendee_name: String,
        event_name: String,
        reason: String,
    },
    PaymentFailed {
        to: String,
        attendee_name: String,
        event_name: String,
        retry_url: String,
    },
}

impl Notification {
    /// Recipient address, for logging.
    pub fn recipient(&self) -> &str {
        match self {
            Self::RegistrationConfirmed { to, .. }
            | Self::RegistrationDeclined { to, .. }
            | Self::PaymentFailed { to, .. } => to,
        }
    }
}

/// Adapter for outbound attendee mail.
///
/// Sends are fire-and-forget from the caller's point of view: payment and
/// registration flows spawn the send and never block or fail on it.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), UsherError>;
}
