// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attendee notifications for the Usher registration platform.
//!
//! One real transport (SMTP with STARTTLS via lettre) and one null
//! transport for installations that run without mail. Callers treat
//! notifications as fire-and-forget; nothing in a payment or
//! registration flow ever blocks on these.

use std::sync::Arc;

use usher_config::model::MailerConfig;
use usher_core::error::UsherError;
use usher_core::traits::Mailer;

pub mod smtp;
pub mod templates;

pub use smtp::{NullMailer, SmtpMailer};
pub use templates::{render, RenderedMail};

/// Build the configured mailer: SMTP when enabled, the logging null
/// transport otherwise.
pub fn build_mailer(config: &MailerConfig) -> Result<Arc<dyn Mailer>, UsherError> {
    if config.enabled {
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        Ok(Arc::new(NullMailer))
    }
}
