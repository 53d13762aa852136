// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMTP transport for attendee notifications.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};
use usher_config::model::MailerConfig;
use usher_core::error::UsherError;
use usher_core::traits::{Mailer, Notification};

use crate::templates;

/// Mailer over a STARTTLS SMTP relay.
///
/// The transport pools connections internally; clone the wrapping `Arc`,
/// not this struct.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &MailerConfig) -> Result<Self, UsherError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| UsherError::Mailer {
                message: format!("invalid SMTP relay {:?}", config.smtp_host),
                source: Some(Box::new(e)),
            })?
            .port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, notification: Notification) -> Result<(), UsherError> {
        let rendered = templates::render(&notification);
        let message = Message::builder()
            .from(self.from.parse().map_err(|e| UsherError::Mailer {
                message: format!("invalid from address {:?}", self.from),
                source: Some(Box::new(e)),
            })?)
            .to(notification
                .recipient()
                .parse()
                .map_err(|e| UsherError::Mailer {
                    message: format!("invalid recipient {:?}", notification.recipient()),
                    source: Some(Box::new(e)),
                })?)
            .subject(rendered.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(rendered.body)
            .map_err(|e| UsherError::Mailer {
                message: "failed to assemble mail".into(),
                source: Some(Box::new(e)),
            })?;
        self.transport
            .send(message)
            .await
            .map_err(|e| UsherError::Mailer {
                message: format!("SMTP send to {} failed", notification.recipient()),
                source: Some(Box::new(e)),
            })?;
        debug!(recipient = notification.recipient(), "notification sent");
        Ok(())
    }
}

/// Mailer used when outbound mail is disabled: logs the would-be send and
/// drops it. Keeps every caller on the same code path in development.
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send(&self, notification: Notification) -> Result<(), UsherError> {
        let rendered = templates::render(&notification);
        info!(
            recipient = notification.recipient(),
            subject = rendered.subject,
            "mail disabled; notification dropped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_mailer_builds_with_and_without_credentials() {
        let mut config = MailerConfig::default();
        assert!(SmtpMailer::new(&config).is_ok());

        config.username = Some("tickets".into());
        config.password = Some("hunter2".into());
        assert!(SmtpMailer::new(&config).is_ok());
    }

    #[tokio::test]
    async fn null_mailer_accepts_everything() {
        let mailer = NullMailer;
        let result = mailer
            .send(Notification::PaymentFailed {
                to: "ada@example.com".into(),
                attendee_name: "Ada".into(),
                event_name: "Harbor Nights".into(),
                retry_url: "https://tickets.example/r/tok".into(),
            })
            .await;
        assert!(result.is_ok());
    }
}
