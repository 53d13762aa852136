// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook reconciler: turns at-least-once gateway notifications into
//! exactly-once ledger effects.
//!
//! The pipeline validates structure, suppresses duplicates through three
//! atomic idempotency keys, verifies the signature, and hands terminal
//! statuses to the guarded outcome apply in storage. Browser callbacks
//! and admin crypto confirmations funnel into the same apply, so arrival
//! order between the paths never matters; the ledger's monotonicity
//! rules decide what sticks.

use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use usher_config::model::WebhookConfig;
use usher_core::error::UsherError;
use usher_core::traits::{InvoiceState, InvoiceStatus, Mailer, Notification, PaymentGateway, SignatureVerdict};
use usher_core::types::{PaymentMethod, RegistrationId, TransactionStatus};
use usher_storage::queries::outcomes::{AppliedOutcome, ConfirmationContext, OutcomeEvidence};
use usher_storage::queries::{idempotency, registrations, transactions};
use usher_storage::queries::idempotency::KeyCheck;
use usher_storage::{Database, NewTransaction};

use crate::alerts::FailureWindow;
use crate::errors::WebhookErrorKind;
use crate::ledger::TransactionLedger;
use crate::metrics;

/// Final verdict on one webhook delivery.
///
/// The HTTP answer is a pure function of this value; handlers add headers
/// and nothing else.
#[derive(Debug)]
pub enum WebhookOutcome {
    /// A verified terminal status went through the guarded apply.
    Applied(AppliedOutcome),
    /// Verified, but the reported state is not one this system acts on.
    /// Acknowledged so the gateway stops redelivering it.
    Ignored { event_type: String },
    /// Suppressed by an idempotency key. Acknowledged with 200: gateways
    /// retry on anything else, and a duplicate is not their mistake.
    Duplicate,
    /// Rejected before any state could change.
    Rejected(WebhookErrorKind),
}

impl WebhookOutcome {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Applied(_) | Self::Ignored { .. } | Self::Duplicate => 200,
            Self::Rejected(kind) => kind.http_status(),
        }
    }

    /// Wire error type for the `x-error-type` header, when rejected.
    pub fn error_type(&self) -> Option<&'static str> {
        match self {
            Self::Rejected(kind) => Some(kind.as_str()),
            _ => None,
        }
    }

    /// Label recorded on the outcome counter.
    fn metric_label(&self) -> &'static str {
        match self {
            Self::Applied(AppliedOutcome::Confirmed { .. }) => "completed",
            Self::Applied(AppliedOutcome::MarkedPartial) => "partial",
            Self::Applied(AppliedOutcome::MarkedFailed { .. }) => "failed",
            Self::Applied(AppliedOutcome::MarkedExpired { .. }) => "expired",
            Self::Applied(AppliedOutcome::AlreadyApplied { .. })
            | Self::Applied(AppliedOutcome::Blocked { .. }) => "conflict",
            Self::Applied(AppliedOutcome::UntrackedInvoice) => "untracked",
            Self::Ignored { .. } => "ignored",
            Self::Duplicate => "duplicate",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// The fields this system reads from a gateway notification. Everything
/// else in the payload is kept only as the opaque evidence snapshot.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    invoice_id: Option<String>,
    /// Some gateway API versions call this `status`.
    #[serde(default, alias = "status")]
    event_type: Option<String>,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    paid_amount_cents: Option<i64>,
    #[serde(default)]
    fee_cents: Option<i64>,
}

/// Idempotent processor for gateway notifications.
pub struct WebhookReconciler {
    db: Database,
    gateway: Arc<dyn PaymentGateway>,
    ledger: TransactionLedger,
    mailer: Arc<dyn Mailer>,
    failures: FailureWindow,
    payload_window_minutes: u32,
    order_window_minutes: u32,
}

impl WebhookReconciler {
    pub fn new(
        db: Database,
        gateway: Arc<dyn PaymentGateway>,
        ledger: TransactionLedger,
        mailer: Arc<dyn Mailer>,
        config: &WebhookConfig,
    ) -> Self {
        Self {
            db,
            gateway,
            ledger,
            mailer,
            failures: FailureWindow::new(config.failure_alert_threshold),
            payload_window_minutes: config.payload_window_minutes.min(u64::from(u32::MAX)) as u32,
            order_window_minutes: config.order_window_minutes.min(u64::from(u32::MAX)) as u32,
        }
    }

    /// Runs the full pipeline for one delivery.
    ///
    /// `source_ip` and `user_agent` only feed the content-hash dedup key;
    /// they are never trusted for anything else.
    pub async fn process(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        source_ip: &str,
        user_agent: &str,
    ) -> WebhookOutcome {
        let outcome = self.run_pipeline(raw_body, signature, source_ip, user_agent).await;
        metrics::record_webhook(outcome.metric_label());
        if let WebhookOutcome::Rejected(kind) = &outcome {
            metrics::record_webhook_error(kind.as_str());
            let count = self.failures.record(kind.as_str());
            metrics::set_hourly_failures(count as f64);
        }
        outcome
    }

    async fn run_pipeline(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        source_ip: &str,
        user_agent: &str,
    ) -> WebhookOutcome {
        // Step 1: structure. Nothing below touches an unparsed body.
        if raw_body.is_empty() {
            return WebhookOutcome::Rejected(WebhookErrorKind::PayloadInvalid);
        }
        let value: serde_json::Value = match serde_json::from_slice(raw_body) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "webhook body is not JSON");
                return WebhookOutcome::Rejected(WebhookErrorKind::JsonInvalid);
            }
        };
        let payload: WebhookPayload = match serde_json::from_value(value.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "webhook fields have unexpected shapes");
                return WebhookOutcome::Rejected(WebhookErrorKind::PayloadInvalid);
            }
        };
        let (Some(invoice_id), Some(event_type)) = (
            payload.invoice_id.filter(|s| !s.is_empty()),
            payload.event_type.filter(|s| !s.is_empty()),
        ) else {
            return WebhookOutcome::Rejected(WebhookErrorKind::MissingRequiredFields);
        };

        // Step 2: idempotency. Checking records the marker atomically, so
        // a concurrent duplicate finds it immediately. First hit wins.
        let content_key = content_hash_key(raw_body, source_ip, user_agent);
        let invoice_key = format!("invoice:{invoice_id}:{event_type}");
        let keys = [
            (content_key.as_str(), self.payload_window_minutes),
            (invoice_key.as_str(), self.payload_window_minutes),
        ];
        for (key, ttl) in keys {
            match idempotency::check_and_record(&self.db, key, ttl).await {
                Ok(KeyCheck::Fresh) => {}
                Ok(KeyCheck::Duplicate) => {
                    info!(invoice_id, event_type, "duplicate webhook suppressed");
                    return WebhookOutcome::Duplicate;
                }
                Err(e) => {
                    // Fail open: blocking a real payment is worse than
                    // re-running the guarded apply once.
                    error!(invoice_id, error = %e, "idempotency check failed; processing anyway");
                }
            }
        }
        if let Some(order_id) = payload.order_id.as_deref().filter(|s| !s.is_empty()) {
            // Narrower window: one order legitimately walks pending ->
            // completed minutes apart, and those must not suppress each
            // other past the event-type split.
            let order_key = format!("order:{order_id}:{event_type}");
            match idempotency::check_and_record(&self.db, &order_key, self.order_window_minutes)
                .await
            {
                Ok(KeyCheck::Fresh) => {}
                Ok(KeyCheck::Duplicate) => {
                    info!(invoice_id, order_id, event_type, "duplicate webhook suppressed by order key");
                    return WebhookOutcome::Duplicate;
                }
                Err(e) => {
                    error!(invoice_id, error = %e, "order idempotency check failed; processing anyway");
                }
            }
        }

        // Step 3: signature. Unverified payloads never reach the apply.
        let Some(signature) = signature else {
            warn!(invoice_id, "webhook carried no signature header");
            return WebhookOutcome::Rejected(WebhookErrorKind::SignatureMissing);
        };
        if let SignatureVerdict::Unverified { reason } =
            self.gateway.verify_webhook(raw_body, signature)
        {
            warn!(invoice_id, reason, "webhook signature rejected");
            return WebhookOutcome::Rejected(WebhookErrorKind::SignatureInvalid);
        }

        // Step 4: act only on states this system tracks. Unknown event
        // types are acknowledged, not bounced; gateways add event types
        // without asking, and a 4xx would only stop future deliveries.
        let state = match event_type.parse::<InvoiceState>() {
            Ok(state) if state.is_terminal() => state,
            Ok(_) => {
                info!(invoice_id, event_type, "non-terminal webhook acknowledged");
                return WebhookOutcome::Ignored { event_type };
            }
            Err(_) => {
                warn!(invoice_id, event_type, "unrecognized webhook event type acknowledged");
                return WebhookOutcome::Ignored { event_type };
            }
        };

        let evidence = OutcomeEvidence {
            paid_amount_cents: payload.paid_amount_cents,
            fee_cents: payload.fee_cents,
            callback_data: Some(value),
        };
        match self.apply(&invoice_id, transaction_status(state), evidence).await {
            Ok(applied) => {
                if applied == AppliedOutcome::UntrackedInvoice {
                    // Answered 200 so the gateway stops, but this is an
                    // operator signal: an invoice this system never opened.
                    let count = self.failures.record("untracked_invoice");
                    metrics::set_hourly_failures(count as f64);
                }
                WebhookOutcome::Applied(applied)
            }
            Err(e) => {
                error!(invoice_id, error = %e, "outcome apply failed");
                WebhookOutcome::Rejected(WebhookErrorKind::DatabaseError)
            }
        }
    }

    /// Applies an authoritative invoice status fetched from the gateway's
    /// query API. The callback handler uses this instead of trusting its
    /// browser-supplied query parameters.
    pub async fn apply_invoice_status(
        &self,
        status: &InvoiceStatus,
    ) -> Result<AppliedOutcome, UsherError> {
        if !status.state.is_terminal() {
            return Err(UsherError::Internal(format!(
                "non-terminal invoice state {} handed to apply",
                status.state
            )));
        }
        let evidence = OutcomeEvidence {
            paid_amount_cents: status.paid_amount_cents,
            fee_cents: status.fee_cents,
            callback_data: None,
        };
        self.apply(&status.invoice_id, transaction_status(status.state), evidence)
            .await
    }

    /// Admin confirmation of a manual crypto transfer: records the attempt
    /// under the operator's reference and pushes it through the same
    /// guarded apply as any gateway settlement. A short transfer lands as
    /// partial, exactly like a short card capture.
    pub async fn confirm_manual_transfer(
        &self,
        registration_id: &RegistrationId,
        reference: &str,
        amount_cents: i64,
    ) -> Result<AppliedOutcome, UsherError> {
        let Some(reg) = registrations::get(&self.db, registration_id).await? else {
            return Err(UsherError::NotFound {
                entity: "registration",
                id: registration_id.0.clone(),
            });
        };
        // Re-submitting the same reference re-runs the guarded apply,
        // which answers AlreadyApplied instead of double-confirming.
        if transactions::get_by_invoice(&self.db, reference).await?.is_none() {
            transactions::insert_attempt(
                &self.db,
                NewTransaction {
                    id: uuid::Uuid::new_v4().to_string(),
                    registration_id: registration_id.clone(),
                    provider: "manual".into(),
                    transaction_id: reference.to_string(),
                    payment_method: PaymentMethod::Crypto,
                    amount_cents: reg.total_amount_cents,
                    currency: reg.currency.clone(),
                },
            )
            .await?;
        }
        self.apply(
            reference,
            TransactionStatus::Completed,
            OutcomeEvidence {
                paid_amount_cents: Some(amount_cents),
                fee_cents: None,
                callback_data: Some(serde_json::json!({
                    "source": "manual_transfer",
                    "reference": reference,
                })),
            },
        )
        .await
    }

    async fn apply(
        &self,
        invoice_id: &str,
        status: TransactionStatus,
        evidence: OutcomeEvidence,
    ) -> Result<AppliedOutcome, UsherError> {
        let applied = self.ledger.apply(invoice_id, status, evidence).await?;
        if let AppliedOutcome::Confirmed { mail: Some(ctx) } = &applied {
            self.send_confirmation(ctx.clone());
        }
        Ok(applied)
    }

    /// Confirmation mail, fire-and-forget. The apply transaction already
    /// committed; a mail failure is an operator problem, never a webhook
    /// failure.
    fn send_confirmation(&self, ctx: ConfirmationContext) {
        let mailer = Arc::clone(&self.mailer);
        metrics::record_notification("confirmation");
        tokio::spawn(async move {
            let note = Notification::RegistrationConfirmed {
                to: ctx.email.clone(),
                attendee_name: ctx.attendee_name,
                event_name: ctx.event_name,
                registration_id: ctx.registration_id.0,
                total_amount_cents: ctx.total_amount_cents,
                currency: ctx.currency,
            };
            if let Err(e) = mailer.send(note).await {
                warn!(recipient = %ctx.email, error = %e, "confirmation mail failed");
            }
        });
    }
}

fn transaction_status(state: InvoiceState) -> TransactionStatus {
    match state {
        InvoiceState::Completed => TransactionStatus::Completed,
        InvoiceState::Failed => TransactionStatus::Failed,
        InvoiceState::Expired => TransactionStatus::Expired,
        // Callers filter non-terminal states before mapping.
        InvoiceState::Pending => TransactionStatus::Pending,
    }
}

fn content_hash_key(raw_body: &[u8], source_ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_body);
    hasher.update(source_ip.as_bytes());
    hasher.update(user_agent.as_bytes());
    format!("payload:{}", hex::encode(hasher.finalize()))
}
