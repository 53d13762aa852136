// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plain-text mail bodies for attendee notifications.
//!
//! Deliberately boring: no HTML, no templating engine. Every variant of
//! [`Notification`] carries exactly what its template needs, so rendering
//! is a pure function and testable without a transport.

use usher_core::traits::Notification;
use usher_core::types::format_amount;

/// Subject and body, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub subject: String,
    pub body: String,
}

pub fn render(notification: &Notification) -> RenderedMail {
    match notification {
        Notification::RegistrationConfirmed {
            attendee_name,
            event_name,
            registration_id,
            total_amount_cents,
            currency,
            ..
        } => RenderedMail {
            subject: format!("Your registration for {event_name} is confirmed"),
            body: format!(
                "Hello {attendee_name},\n\n\
                 Your registration for {event_name} is confirmed.\n\n\
                 Registration reference: {registration_id}\n\
                 Amount paid: {}\n\n\
                 Bring this reference with you; we look forward to seeing you there.\n",
                format_amount(*total_amount_cents, currency),
            ),
        },
        Notification::RegistrationDeclined {
            attendee_name,
            event_name,
            reason,
            ..
        } => RenderedMail {
            subject: format!("Your registration for {event_name} was declined"),
            body: format!(
                "Hello {attendee_name},\n\n\
                 We are sorry: your registration for {event_name} was declined.\n\n\
                 Reason: {reason}\n\n\
                 If you believe this is a mistake, reply to this mail and we will\n\
                 take another look.\n",
            ),
        },
        Notification::PaymentFailed {
            attendee_name,
            event_name,
            retry_url,
            ..
        } => RenderedMail {
            subject: format!("Payment for {event_name} did not go through"),
            body: format!(
                "Hello {attendee_name},\n\n\
                 Your payment for {event_name} did not go through. Your spot is\n\
                 still held for a short while.\n\n\
                 Retry here: {retry_url}\n\n\
                 If the card keeps failing, the checkout page also offers payment\n\
                 by transfer.\n",
            ),
        },
    }
}
