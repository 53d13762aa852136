// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registration lifecycle service.
//!
//! Owns the submission pipeline (price server-side, duplicate check,
//! identity lock, sealed session, atomic insert) and the admin and
//! attendee transitions out of pending. Prices always come from the
//! tickets table; client-submitted amounts are never trusted.

use std::sync::Arc;

use tracing::{info, warn};
use usher_config::model::RegistrationConfig;
use usher_core::error::UsherError;
use usher_core::traits::{Mailer, Notification};
use usher_core::types::{
    selection_total, Attendee, PaymentMethod, PaymentStatus, RegistrationId, RegistrationStatus,
    SessionToken, TicketSelection,
};
use usher_session::SessionStore;
use usher_storage::models::{NewRegistration, Ticket};
use usher_storage::queries::registrations::{self, SubmissionOutcome, TransitionOutcome};
use usher_storage::queries::{inventory, sessions as session_rows};
use usher_storage::Database;

use crate::dedup::{self, DuplicateReason};
use crate::locks::{self, LockError, LockToken};

/// One requested ticket line as it arrives from the form.
#[derive(Debug, Clone, Copy)]
pub struct RequestedLine {
    pub ticket_id: i64,
    pub quantity: u32,
}

/// A submission as it arrives from the form, before any server-side
/// validation.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub event_id: i64,
    pub attendee: Attendee,
    pub lines: Vec<RequestedLine>,
    pub preferred_method: Option<PaymentMethod>,
}

/// Result of a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Registration is pending; the attendee proceeds to payment with
    /// this session token.
    PendingPayment {
        registration_id: RegistrationId,
        token: SessionToken,
        total_amount_cents: i64,
    },
    /// Zero-total registration, confirmed immediately with no session.
    ConfirmedFree { registration_id: RegistrationId },
    /// The identity already holds a live registration or lock.
    Duplicate(DuplicateReason),
    /// The duplicate check itself failed; rejected rather than risking
    /// a double registration.
    Unverifiable,
    EventNotFound,
    EmptySelection,
    UnknownTicket { ticket_id: i64 },
    SoldOut { ticket_id: i64 },
}

/// Why a requested selection could not be priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingError {
    Empty,
    UnknownTicket(i64),
}

/// Prices requested lines from the tickets table.
///
/// Lines with zero quantity are dropped and repeated ticket ids are
/// merged. Availability is not checked here; the insert transaction is
/// the authority on stock.
pub fn price_selection(
    tickets: &[Ticket],
    lines: &[RequestedLine],
) -> Result<Vec<TicketSelection>, PricingError> {
    let mut selections: Vec<TicketSelection> = Vec::new();
    for line in lines {
        if line.quantity == 0 {
            continue;
        }
        let Some(ticket) = tickets.iter().find(|t| t.id == line.ticket_id) else {
            return Err(PricingError::UnknownTicket(line.ticket_id));
        };
        if let Some(existing) = selections.iter_mut().find(|s| s.ticket_id == line.ticket_id) {
            existing.quantity += line.quantity;
            existing.subtotal_cents =
                existing.unit_price_cents * i64::from(existing.quantity);
        } else {
            selections.push(TicketSelection {
                ticket_id: ticket.id,
                name: ticket.name.clone(),
                unit_price_cents: ticket.price_cents,
                quantity: line.quantity,
                subtotal_cents: ticket.price_cents * i64::from(line.quantity),
            });
        }
    }
    if selections.is_empty() {
        return Err(PricingError::Empty);
    }
    Ok(selections)
}

/// Registration lifecycle service wired to storage, sessions, and mail.
pub struct RegistrationService {
    db: Database,
    sessions: Arc<SessionStore>,
    mailer: Arc<dyn Mailer>,
    currency: String,
    lock_ttl_minutes: u32,
    pending_grace_minutes: u32,
    restock_on_decline: bool,
}

impl RegistrationService {
    pub fn new(
        db: Database,
        sessions: Arc<SessionStore>,
        mailer: Arc<dyn Mailer>,
        config: &RegistrationConfig,
        currency: &str,
    ) -> Self {
        Self {
            db,
            sessions,
            mailer,
            currency: currency.to_string(),
            lock_ttl_minutes: config.lock_ttl_minutes.min(u64::from(u32::MAX)) as u32,
            pending_grace_minutes: config.pending_grace_minutes.min(u64::from(u32::MAX)) as u32,
            restock_on_decline: config.restock_on_decline,
        }
    }

    /// Runs the submission pipeline.
    ///
    /// Order matters: price first (cheap rejections before any write),
    /// then duplicate check, identity lock, session seal, and the
    /// atomic insert that also decrements availability and clears the
    /// lock. Every early exit after the lock releases it.
    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmitOutcome, UsherError> {
        let Some(event) = inventory::get_event(&self.db, req.event_id).await? else {
            return Ok(SubmitOutcome::EventNotFound);
        };
        let tickets = inventory::list_tickets(&self.db, req.event_id).await?;
        let selections = match price_selection(&tickets, &req.lines) {
            Ok(selections) => selections,
            Err(PricingError::Empty) => return Ok(SubmitOutcome::EmptySelection),
            Err(PricingError::UnknownTicket(ticket_id)) => {
                return Ok(SubmitOutcome::UnknownTicket { ticket_id });
            }
        };
        let total = selection_total(&selections);

        match dedup::check(
            &self.db,
            req.event_id,
            &req.attendee.email,
            &req.attendee.phone,
            self.pending_grace_minutes,
        )
        .await
        {
            Ok(None) => {}
            Ok(Some(reason)) => {
                info!(event_id = req.event_id, ?reason, "submission rejected as duplicate");
                return Ok(SubmitOutcome::Duplicate(reason));
            }
            Err(e) => {
                warn!(event_id = req.event_id, error = %e, "duplicate check failed; rejecting");
                return Ok(SubmitOutcome::Unverifiable);
            }
        }

        let lock = match locks::acquire(
            &self.db,
            req.event_id,
            &req.attendee.email,
            &req.attendee.phone,
            self.lock_ttl_minutes,
        )
        .await
        {
            Ok(lock) => lock,
            Err(LockError::Held) => {
                return Ok(SubmitOutcome::Duplicate(DuplicateReason::CurrentlyProcessing));
            }
            Err(LockError::Storage(e)) => return Err(e),
        };

        let free = total == 0;
        let seal = if free {
            None
        } else {
            match self.sessions.prepare(&req.attendee) {
                Ok(seal) => Some(seal),
                Err(e) => {
                    self.abandon(&lock).await;
                    return Err(e);
                }
            }
        };
        let token = seal.as_ref().map(|s| s.token.clone());

        let registration = NewRegistration {
            id: RegistrationId::generate(),
            event_id: req.event_id,
            attendee: req.attendee.clone(),
            selections,
            total_amount_cents: total,
            currency: self.currency.clone(),
            status: if free {
                RegistrationStatus::Confirmed
            } else {
                RegistrationStatus::Pending
            },
            payment_status: if free {
                PaymentStatus::Completed
            } else {
                PaymentStatus::Pending
            },
            preferred_method: req.preferred_method,
        };
        let registration_id = registration.id.clone();

        let inserted = match registrations::create_submission(&self.db, registration, seal).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.abandon(&lock).await;
                return Err(e);
            }
        };
        match inserted {
            SubmissionOutcome::Created => {
                info!(
                    registration_id = %registration_id.0,
                    event_id = req.event_id,
                    total_cents = total,
                    free,
                    "registration created"
                );
                match token {
                    Some(token) => Ok(SubmitOutcome::PendingPayment {
                        registration_id,
                        token,
                        total_amount_cents: total,
                    }),
                    None => {
                        self.notify(Notification::RegistrationConfirmed {
                            to: req.attendee.email.clone(),
                            attendee_name: req.attendee.name.clone(),
                            event_name: event.name.clone(),
                            registration_id: registration_id.0.clone(),
                            total_amount_cents: 0,
                            currency: self.currency.clone(),
                        });
                        Ok(SubmitOutcome::ConfirmedFree { registration_id })
                    }
                }
            }
            SubmissionOutcome::DuplicateIdentity => {
                // Lost the check-to-insert race; the unique index is the
                // authoritative verdict.
                self.abandon(&lock).await;
                warn!(event_id = req.event_id, "insert rejected by active-identity index");
                Ok(SubmitOutcome::Duplicate(DuplicateReason::PendingInProgress))
            }
            SubmissionOutcome::UnknownTicket { ticket_id } => {
                self.abandon(&lock).await;
                Ok(SubmitOutcome::UnknownTicket { ticket_id })
            }
            SubmissionOutcome::InsufficientInventory { ticket_id } => {
                self.abandon(&lock).await;
                Ok(SubmitOutcome::SoldOut { ticket_id })
            }
        }
    }

    /// Attendee cancellation by session token, before payment.
    pub async fn cancel(&self, token: &SessionToken) -> Result<TransitionOutcome, UsherError> {
        let Some(row) = session_rows::get(&self.db, token).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        registrations::cancel(&self.db, &RegistrationId(row.registration_id)).await
    }

    /// Admin decline with a mandatory reason.
    ///
    /// Releases the identity locks so the same contact can register
    /// again; restocks availability only when configured. Sends the
    /// decline notice fire-and-forget.
    pub async fn decline(
        &self,
        id: &RegistrationId,
        reason: &str,
    ) -> Result<TransitionOutcome, UsherError> {
        let outcome =
            registrations::decline(&self.db, id, reason, self.restock_on_decline).await?;
        if outcome == TransitionOutcome::Applied
            && let Some(reg) = registrations::get(&self.db, id).await?
            && let Some(event) = inventory::get_event(&self.db, reg.event_id).await?
        {
            self.notify(Notification::RegistrationDeclined {
                to: reg.attendee.email,
                attendee_name: reg.attendee.name,
                event_name: event.name,
                reason: reason.to_string(),
            });
        }
        Ok(outcome)
    }

    /// Admin confirmation for rails settled outside the gateway, e.g. a
    /// crypto transfer verified by hand. Sends the confirmation notice.
    pub async fn confirm_manual(&self, id: &RegistrationId) -> Result<TransitionOutcome, UsherError> {
        let outcome = registrations::confirm_manual(&self.db, id).await?;
        if outcome == TransitionOutcome::Applied
            && let Some(reg) = registrations::get(&self.db, id).await?
            && let Some(event) = inventory::get_event(&self.db, reg.event_id).await?
        {
            self.notify(Notification::RegistrationConfirmed {
                to: reg.attendee.email,
                attendee_name: reg.attendee.name,
                event_name: event.name,
                registration_id: reg.id.0,
                total_amount_cents: reg.total_amount_cents,
                currency: reg.currency,
            });
        }
        Ok(outcome)
    }

    /// Records that the attendee chose the crypto rail. The registration
    /// stays pending until an admin confirms the transfer.
    pub async fn select_crypto(&self, id: &RegistrationId) -> Result<bool, UsherError> {
        registrations::set_payment_method(&self.db, id, PaymentMethod::Crypto).await
    }

    /// Moves pending registrations with no live payment window to
    /// expired. Run at startup and by the sweep command.
    pub async fn expire_stale(&self) -> Result<usize, UsherError> {
        registrations::expire_stale(&self.db, self.pending_grace_minutes).await
    }

    async fn abandon(&self, lock: &LockToken) {
        if let Err(e) = locks::release(&self.db, lock).await {
            warn!(error = %e, "failed to release identity lock");
        }
    }

    fn notify(&self, notification: Notification) {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            let recipient = notification.recipient().to_string();
            if let Err(e) = mailer.send(notification).await {
                warn!(recipient = %recipient, error = %e, "notification send failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use usher_config::model::SessionConfig;

    struct ChannelMailer {
        tx: mpsc::UnboundedSender<Notification>,
    }

    #[async_trait::async_trait]
    impl Mailer for ChannelMailer {
        async fn send(&self, notification: Notification) -> Result<(), UsherError> {
            let _ = self.tx.send(notification);
            Ok(())
        }
    }

    async fn setup() -> (
        RegistrationService,
        Database,
        mpsc::UnboundedReceiver<Notification>,
        tempfile::TempDir,
    ) {
        setup_with(RegistrationConfig::default()).await
    }

    async fn setup_with(
        config: RegistrationConfig,
    ) -> (
        RegistrationService,
        Database,
        mpsc::UnboundedReceiver<Notification>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let session_config = SessionConfig {
            ttl_minutes: 30,
            card_ttl_minutes: 120,
            encryption_key: Some(hex::encode([7u8; 32])),
        };
        let sessions = Arc::new(SessionStore::new(db.clone(), &session_config).unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let service = RegistrationService::new(
            db.clone(),
            sessions,
            Arc::new(ChannelMailer { tx }),
            &config,
            "EUR",
        );
        (service, db, rx, dir)
    }

    async fn seed_event(db: &Database, price_cents: i64, available: i64) -> (i64, i64) {
        let event_id = inventory::insert_event(db, "Harbor Nights", chrono::Utc::now())
            .await
            .unwrap();
        let ticket_id = inventory::insert_ticket(db, event_id, "Standard", price_cents, available)
            .await
            .unwrap();
        (event_id, ticket_id)
    }

    fn attendee(email: &str, phone: &str) -> Attendee {
        Attendee {
            name: "Ada Wexler".into(),
            email: email.into(),
            phone: phone.into(),
        }
    }

    fn request(event_id: i64, ticket_id: i64, quantity: u32, email: &str, phone: &str) -> SubmitRequest {
        SubmitRequest {
            event_id,
            attendee: attendee(email, phone),
            lines: vec![RequestedLine { ticket_id, quantity }],
            preferred_method: Some(PaymentMethod::Card),
        }
    }

    async fn available(db: &Database, ticket_id: i64) -> i64 {
        db.connection()
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT available FROM tickets WHERE id = ?1",
                    rusqlite::params![ticket_id],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap()
    }

    #[test]
    fn pricing_merges_lines_and_drops_zero_quantities() {
        let tickets = vec![
            Ticket {
                id: 1,
                event_id: 9,
                name: "Standard".into(),
                price_cents: 2500,
                available: 10,
            },
            Ticket {
                id: 2,
                event_id: 9,
                name: "VIP".into(),
                price_cents: 7000,
                available: 3,
            },
        ];
        let lines = vec![
            RequestedLine { ticket_id: 1, quantity: 1 },
            RequestedLine { ticket_id: 2, quantity: 0 },
            RequestedLine { ticket_id: 1, quantity: 2 },
        ];

        let priced = price_selection(&tickets, &lines).unwrap();
        assert_eq!(priced.len(), 1);
        assert_eq!(priced[0].quantity, 3);
        assert_eq!(priced[0].subtotal_cents, 7500);
        assert_eq!(selection_total(&priced), 7500);
    }

    #[test]
    fn pricing_rejects_unknown_and_empty() {
        let tickets = vec![Ticket {
            id: 1,
            event_id: 9,
            name: "Standard".into(),
            price_cents: 2500,
            available: 10,
        }];

        assert_eq!(
            price_selection(&tickets, &[RequestedLine { ticket_id: 5, quantity: 1 }]),
            Err(PricingError::UnknownTicket(5))
        );
        assert_eq!(price_selection(&tickets, &[]), Err(PricingError::Empty));
        assert_eq!(
            price_selection(&tickets, &[RequestedLine { ticket_id: 1, quantity: 0 }]),
            Err(PricingError::Empty)
        );
    }

    #[tokio::test]
    async fn paid_submission_creates_pending_registration_with_session() {
        let (service, db, _rx, _dir) = setup().await;
        let (event_id, ticket_id) = seed_event(&db, 2500, 10).await;

        let outcome = service
            .submit(request(event_id, ticket_id, 2, "ada@example.com", "+301"))
            .await
            .unwrap();
        let SubmitOutcome::PendingPayment { registration_id, token, total_amount_cents } = outcome
        else {
            panic!("expected PendingPayment");
        };
        assert_eq!(total_amount_cents, 5000);

        let reg = registrations::get(&db, &registration_id).await.unwrap().unwrap();
        assert_eq!(reg.status, RegistrationStatus::Pending);
        assert_eq!(reg.total_amount_cents, 5000);
        assert!(session_rows::get(&db, &token).await.unwrap().is_some());
        assert_eq!(available(&db, ticket_id).await, 8);
        // The insert transaction cleared the identity lock.
        assert!(!locks::is_locked(&db, event_id, "ada@example.com", "+301")
            .await
            .unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn free_submission_confirms_immediately_and_mails() {
        let (service, db, mut rx, _dir) = setup().await;
        let (event_id, ticket_id) = seed_event(&db, 0, 10).await;

        let outcome = service
            .submit(request(event_id, ticket_id, 1, "ada@example.com", "+301"))
            .await
            .unwrap();
        let SubmitOutcome::ConfirmedFree { registration_id } = outcome else {
            panic!("expected ConfirmedFree");
        };

        let reg = registrations::get(&db, &registration_id).await.unwrap().unwrap();
        assert_eq!(reg.status, RegistrationStatus::Confirmed);
        assert_eq!(reg.payment_status, PaymentStatus::Completed);

        let note = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            note,
            Notification::RegistrationConfirmed { total_amount_cents: 0, .. }
        ));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_submission_for_same_identity_is_rejected() {
        let (service, db, _rx, _dir) = setup().await;
        let (event_id, ticket_id) = seed_event(&db, 2500, 10).await;

        service
            .submit(request(event_id, ticket_id, 1, "ada@example.com", "+301"))
            .await
            .unwrap();
        let outcome = service
            .submit(request(event_id, ticket_id, 1, "ada@example.com", "+999"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Duplicate(DuplicateReason::PendingInProgress)
        );
        assert_eq!(available(&db, ticket_id).await, 9);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_event_ticket_and_empty_lines_are_rejected() {
        let (service, db, _rx, _dir) = setup().await;
        let (event_id, ticket_id) = seed_event(&db, 2500, 10).await;

        let outcome = service
            .submit(request(99, ticket_id, 1, "a@example.com", "+1"))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::EventNotFound);

        let outcome = service
            .submit(request(event_id, 777, 1, "a@example.com", "+1"))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::UnknownTicket { ticket_id: 777 });

        let mut req = request(event_id, ticket_id, 1, "a@example.com", "+1");
        req.lines.clear();
        let outcome = service.submit(req).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::EmptySelection);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn sold_out_rejection_releases_the_lock() {
        let (service, db, _rx, _dir) = setup().await;
        let (event_id, ticket_id) = seed_event(&db, 2500, 1).await;

        let outcome = service
            .submit(request(event_id, ticket_id, 2, "ada@example.com", "+301"))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::SoldOut { ticket_id });

        // Same identity can immediately retry with a smaller order.
        let outcome = service
            .submit(request(event_id, ticket_id, 1, "ada@example.com", "+301"))
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::PendingPayment { .. }));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_restocks_and_removes_the_session() {
        let (service, db, _rx, _dir) = setup().await;
        let (event_id, ticket_id) = seed_event(&db, 2500, 10).await;

        let outcome = service
            .submit(request(event_id, ticket_id, 2, "ada@example.com", "+301"))
            .await
            .unwrap();
        let SubmitOutcome::PendingPayment { token, .. } = outcome else {
            panic!("expected PendingPayment");
        };
        assert_eq!(available(&db, ticket_id).await, 8);

        let outcome = service.cancel(&token).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);
        assert_eq!(available(&db, ticket_id).await, 10);

        // Session went with the cancellation.
        let outcome = service.cancel(&token).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::NotFound);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn decline_frees_the_identity_and_mails_the_reason() {
        let (service, db, mut rx, _dir) = setup().await;
        let (event_id, ticket_id) = seed_event(&db, 2500, 10).await;

        let outcome = service
            .submit(request(event_id, ticket_id, 1, "ada@example.com", "+301"))
            .await
            .unwrap();
        let SubmitOutcome::PendingPayment { registration_id, .. } = outcome else {
            panic!("expected PendingPayment");
        };

        let outcome = service
            .decline(&registration_id, "payment evidence missing")
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);

        // Default policy keeps the tickets off the shelf.
        assert_eq!(available(&db, ticket_id).await, 9);

        let note = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let Notification::RegistrationDeclined { reason, .. } = note else {
            panic!("expected RegistrationDeclined");
        };
        assert_eq!(reason, "payment evidence missing");

        // Declined identities may register again at once.
        let outcome = service
            .submit(request(event_id, ticket_id, 1, "ada@example.com", "+301"))
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::PendingPayment { .. }));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn decline_restocks_when_configured() {
        let (service, db, _rx, _dir) = setup_with(RegistrationConfig {
            restock_on_decline: true,
            ..RegistrationConfig::default()
        })
        .await;
        let (event_id, ticket_id) = seed_event(&db, 2500, 10).await;

        let outcome = service
            .submit(request(event_id, ticket_id, 3, "ada@example.com", "+301"))
            .await
            .unwrap();
        let SubmitOutcome::PendingPayment { registration_id, .. } = outcome else {
            panic!("expected PendingPayment");
        };
        assert_eq!(available(&db, ticket_id).await, 7);

        service
            .decline(&registration_id, "test event over capacity")
            .await
            .unwrap();
        assert_eq!(available(&db, ticket_id).await, 10);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn manual_confirmation_applies_once_and_mails() {
        let (service, db, mut rx, _dir) = setup().await;
        let (event_id, ticket_id) = seed_event(&db, 2500, 10).await;

        let outcome = service
            .submit(request(event_id, ticket_id, 1, "ada@example.com", "+301"))
            .await
            .unwrap();
        let SubmitOutcome::PendingPayment { registration_id, .. } = outcome else {
            panic!("expected PendingPayment");
        };

        assert!(service.select_crypto(&registration_id).await.unwrap());
        assert_eq!(
            service.confirm_manual(&registration_id).await.unwrap(),
            TransitionOutcome::Applied
        );
        assert_eq!(
            service.confirm_manual(&registration_id).await.unwrap(),
            TransitionOutcome::NotPending {
                current: RegistrationStatus::Confirmed
            }
        );

        let note = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(note, Notification::RegistrationConfirmed { .. }));

        db.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_identity_submissions_admit_exactly_one() {
        let (service, db, _rx, _dir) = setup().await;
        let (event_id, ticket_id) = seed_event(&db, 2500, 10).await;
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for _ in 0..6 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .submit(request(event_id, ticket_id, 1, "ada@example.com", "+301"))
                    .await
                    .unwrap()
            }));
        }

        let mut admitted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                SubmitOutcome::PendingPayment { .. } => admitted += 1,
                SubmitOutcome::Duplicate(_) => rejected += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(rejected, 5);

        // One seat went out the door, not six.
        assert_eq!(available(&db, ticket_id).await, 9);

        db.close().await.unwrap();
    }
}
