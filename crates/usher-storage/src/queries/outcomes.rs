// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Guarded application of a verified payment outcome.
//!
//! Webhooks, browser callbacks, and admin actions all converge here; the
//! ledger's transition table, not arrival order, decides what sticks.
//! `completed` is sticky. Every effect of an outcome (ledger row,
//! registration row, session row) lands in one SQL transaction, so a crash
//! can never leave a paid-but-unconfirmed half-state.

use rusqlite::params;
use tracing::{info, warn};

use usher_core::types::{RegistrationId, TransactionStatus};
use usher_core::UsherError;

use crate::database::Database;
use crate::models::{now_iso, parse_enum, to_iso};

/// Evidence shipped with a verified gateway status.
#[derive(Debug, Clone, Default)]
pub struct OutcomeEvidence {
    /// Amount the gateway reports as actually paid, in minor units.
    pub paid_amount_cents: Option<i64>,
    pub fee_cents: Option<i64>,
    /// Snapshot of the payload that produced this status.
    pub callback_data: Option<serde_json::Value>,
}

/// Everything the confirmation mail needs, captured inside the transaction
/// that confirmed the registration. Returned at most once per registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationContext {
    pub registration_id: RegistrationId,
    pub attendee_name: String,
    pub email: String,
    pub event_name: String,
    pub total_amount_cents: i64,
    pub currency: String,
}

/// What the guarded apply did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedOutcome {
    /// Ledger row moved to completed. `mail` is `Some` exactly when this
    /// call moved the registration to confirmed.
    Confirmed { mail: Option<ConfirmationContext> },
    /// Paid amount fell short of the requested amount.
    MarkedPartial,
    MarkedFailed { session_reopened: bool },
    MarkedExpired { registration_expired: bool },
    /// The ledger already holds this (or a stickier) status; nothing changed.
    AlreadyApplied { current: TransactionStatus },
    /// The transition table forbids this change; nothing changed.
    Blocked { current: TransactionStatus },
    /// No ledger row holds this invoice id.
    UntrackedInvoice,
}

/// Apply a verified terminal status to the ledger row holding `invoice_id`
/// and propagate it to the registration and session, atomically.
///
/// `retry_ttl_minutes` is the fresh session window granted after a failed
/// attempt so the attendee can retry without re-entering details.
pub async fn apply(
    db: &Database,
    invoice_id: &str,
    reported: TransactionStatus,
    evidence: OutcomeEvidence,
    retry_ttl_minutes: u32,
) -> Result<AppliedOutcome, UsherError> {
    if !reported.is_terminal() {
        return Err(UsherError::Internal(format!(
            "non-terminal status {reported} handed to outcome apply"
        )));
    }
    let invoice = invoice_id.to_string();
    let now = now_iso();
    let retry_expiry = to_iso(
        chrono::Utc::now() + chrono::Duration::minutes(i64::from(retry_ttl_minutes)),
    );
    let callback_json = evidence.callback_data.map(|v| v.to_string());
    let paid = evidence.paid_amount_cents;
    let fee = evidence.fee_cents;

    let outcome = db
        .connection()
        .call(move |conn| -> Result<AppliedOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;

            let row = tx.query_row(
                "SELECT registration_id, amount_cents, status
                 FROM payment_transactions WHERE transaction_id = ?1",
                params![invoice],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            );
            let (registration_id, requested_cents, current_text) = match row {
                Ok(fields) => fields,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return Ok(AppliedOutcome::UntrackedInvoice);
                }
                Err(e) => return Err(e),
            };
            let current: TransactionStatus = parse_enum(2, &current_text)?;

            // A completed report that moved less money than requested is a
            // partial settlement, whatever the event called itself.
            let effective = match (reported, paid) {
                (TransactionStatus::Completed, Some(p)) if p < requested_cents => {
                    TransactionStatus::Partial
                }
                _ => reported,
            };

            if current == TransactionStatus::Completed || current == effective {
                return Ok(AppliedOutcome::AlreadyApplied { current });
            }
            if !current.can_transition_to(effective) {
                return Ok(AppliedOutcome::Blocked { current });
            }

            tx.execute(
                "UPDATE payment_transactions
                 SET status = ?1, fee_cents = COALESCE(?2, fee_cents),
                     callback_data = COALESCE(?3, callback_data),
                     processed_at = ?4, updated_at = ?4
                 WHERE transaction_id = ?5",
                params![effective.to_string(), fee, callback_json, now, invoice],
            )?;

            let applied = match effective {
                TransactionStatus::Completed => {
                    let changed = tx.execute(
                        "UPDATE registrations
                         SET status = 'confirmed', payment_status = 'completed',
                             confirmed_at = ?1, payment_completed_at = ?1,
                             updated_at = ?1
                         WHERE id = ?2 AND status = 'pending'",
                        params![now, registration_id],
                    )?;
                    let mail = if changed == 1 {
                        Some(tx.query_row(
                            "SELECT r.attendee_name, r.email, r.total_amount_cents,
                                    r.currency, e.name
                             FROM registrations r JOIN events e ON e.id = r.event_id
                             WHERE r.id = ?1",
                            params![registration_id],
                            |row| {
                                Ok(ConfirmationContext {
                                    registration_id: RegistrationId(registration_id.clone()),
                                    attendee_name: row.get(0)?,
                                    email: row.get(1)?,
                                    total_amount_cents: row.get(2)?,
                                    currency: row.get(3)?,
                                    event_name: row.get(4)?,
                                })
                            },
                        )?)
                    } else {
                        None
                    };
                    tx.execute(
                        "DELETE FROM payment_sessions WHERE registration_id = ?1",
                        params![registration_id],
                    )?;
                    AppliedOutcome::Confirmed { mail }
                }
                TransactionStatus::Partial => {
                    tx.execute(
                        "UPDATE registrations
                         SET payment_status = 'partial', updated_at = ?1
                         WHERE id = ?2 AND status = 'pending'",
                        params![now, registration_id],
                    )?;
                    AppliedOutcome::MarkedPartial
                }
                TransactionStatus::Failed => {
                    tx.execute(
                        "UPDATE registrations
                         SET payment_status = 'failed', updated_at = ?1
                         WHERE id = ?2 AND status = 'pending'",
                        params![now, registration_id],
                    )?;
                    let reopened = tx.execute(
                        "UPDATE payment_sessions
                         SET order_id = NULL, invoice_id = NULL,
                             payment_expires_at = NULL, webhook_fallback = 0,
                             expires_at = ?1
                         WHERE registration_id = ?2",
                        params![retry_expiry, registration_id],
                    )?;
                    AppliedOutcome::MarkedFailed {
                        session_reopened: reopened == 1,
                    }
                }
                TransactionStatus::Expired => {
                    let changed = tx.execute(
                        "UPDATE registrations
                         SET status = 'expired',
                             payment_status = CASE payment_status
                                 WHEN 'partial' THEN 'partial' ELSE 'expired' END,
                             updated_at = ?1
                         WHERE id = ?2 AND status = 'pending'",
                        params![now, registration_id],
                    )?;
                    tx.execute(
                        "DELETE FROM payment_sessions WHERE registration_id = ?1",
                        params![registration_id],
                    )?;
                    AppliedOutcome::MarkedExpired {
                        registration_expired: changed == 1,
                    }
                }
                TransactionStatus::Pending => unreachable!("guarded above"),
            };

            tx.commit()?;
            Ok(applied)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    match &outcome {
        AppliedOutcome::Confirmed { mail } => {
            info!(invoice_id, confirmed = mail.is_some(), "payment completed");
            if mail.is_none() {
                warn!(
                    invoice_id,
                    "completed payment for a registration no longer pending; manual review"
                );
            }
        }
        AppliedOutcome::AlreadyApplied { current } => {
            info!(invoice_id, %current, "outcome already applied");
        }
        AppliedOutcome::Blocked { current } => {
            warn!(invoice_id, %current, to = %reported, "outcome blocked by transition table");
        }
        AppliedOutcome::UntrackedInvoice => {
            warn!(invoice_id, "webhook for unknown invoice");
        }
        _ => {}
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRegistration, NewTransaction, SealedSession};
    use crate::queries::{inventory, registrations, sessions, transactions};
    use chrono::{Duration, Utc};
    use tempfile::tempdir;
    use usher_core::types::{
        Attendee, PaymentMethod, PaymentStatus, RegistrationStatus, SessionToken,
        TicketSelection,
    };

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    /// Full card-attempt fixture: event, pending registration with session,
    /// ledger row for invoice `inv`, session extended onto the invoice.
    async fn seed_attempt(db: &Database, inv: &str) -> (RegistrationId, SessionToken) {
        let event_id = inventory::insert_event(db, "Harbor Nights", Utc::now())
            .await
            .unwrap();
        let ticket_id = inventory::insert_ticket(db, event_id, "Standard", 2500, 50)
            .await
            .unwrap();
        let reg = NewRegistration {
            id: RegistrationId::generate(),
            event_id,
            attendee: Attendee {
                name: "Ada Wexler".into(),
                email: "ada@example.com".into(),
                phone: "+301".into(),
            },
            selections: vec![TicketSelection {
                ticket_id,
                name: "Standard".into(),
                unit_price_cents: 2500,
                quantity: 2,
                subtotal_cents: 5000,
            }],
            total_amount_cents: 5000,
            currency: "EUR".into(),
            status: RegistrationStatus::Pending,
            payment_status: PaymentStatus::Pending,
            preferred_method: Some(PaymentMethod::Card),
        };
        let reg_id = reg.id.clone();
        let seal = SealedSession {
            token: SessionToken::generate(),
            attendee_sealed: vec![1, 2, 3],
            attendee_nonce: vec![0; 12],
            expires_at: Utc::now() + Duration::minutes(30),
        };
        let token = seal.token.clone();
        registrations::create_submission(db, reg, Some(seal)).await.unwrap();
        transactions::insert_attempt(
            db,
            NewTransaction {
                id: uuid::Uuid::new_v4().to_string(),
                registration_id: reg_id.clone(),
                provider: "cardlink".into(),
                transaction_id: inv.into(),
                payment_method: PaymentMethod::Card,
                amount_cents: 5000,
                currency: "EUR".into(),
            },
        )
        .await
        .unwrap();
        sessions::extend_for_card(db, &token, "order-1", inv, 120)
            .await
            .unwrap();
        (reg_id, token)
    }

    fn paid(amount: i64) -> OutcomeEvidence {
        OutcomeEvidence {
            paid_amount_cents: Some(amount),
            fee_cents: Some(75),
            callback_data: Some(serde_json::json!({"status": "captured"})),
        }
    }

    #[tokio::test]
    async fn completed_confirms_registration_and_hands_out_mail_context() {
        let (db, _dir) = setup_db().await;
        let (reg_id, token) = seed_attempt(&db, "inv-1").await;

        let outcome = apply(&db, "inv-1", TransactionStatus::Completed, paid(5000), 30)
            .await
            .unwrap();
        let AppliedOutcome::Confirmed { mail: Some(ctx) } = outcome else {
            panic!("expected confirmation with mail context, got {outcome:?}");
        };
        assert_eq!(ctx.registration_id, reg_id);
        assert_eq!(ctx.email, "ada@example.com");
        assert_eq!(ctx.event_name, "Harbor Nights");
        assert_eq!(ctx.total_amount_cents, 5000);

        let reg = registrations::get(&db, &reg_id).await.unwrap().unwrap();
        assert_eq!(reg.status, RegistrationStatus::Confirmed);
        assert_eq!(reg.payment_status, PaymentStatus::Completed);
        assert!(reg.confirmed_at.is_some());
        assert!(reg.payment_completed_at.is_some());

        let ledger = transactions::get_by_invoice(&db, "inv-1").await.unwrap().unwrap();
        assert_eq!(ledger.status, TransactionStatus::Completed);
        assert_eq!(ledger.fee_cents, Some(75));
        assert!(ledger.processed_at.is_some());
        assert!(ledger.callback_data.is_some());

        assert!(sessions::get(&db, &token).await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn redelivered_completion_is_already_applied_with_no_second_mail() {
        let (db, _dir) = setup_db().await;
        seed_attempt(&db, "inv-1").await;

        apply(&db, "inv-1", TransactionStatus::Completed, paid(5000), 30)
            .await
            .unwrap();
        let second = apply(&db, "inv-1", TransactionStatus::Completed, paid(5000), 30)
            .await
            .unwrap();
        assert_eq!(
            second,
            AppliedOutcome::AlreadyApplied {
                current: TransactionStatus::Completed
            }
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn completed_is_sticky_against_late_failure() {
        let (db, _dir) = setup_db().await;
        let (reg_id, _) = seed_attempt(&db, "inv-1").await;

        apply(&db, "inv-1", TransactionStatus::Completed, paid(5000), 30)
            .await
            .unwrap();
        let late = apply(
            &db,
            "inv-1",
            TransactionStatus::Failed,
            OutcomeEvidence::default(),
            30,
        )
        .await
        .unwrap();
        assert_eq!(
            late,
            AppliedOutcome::AlreadyApplied {
                current: TransactionStatus::Completed
            }
        );

        let reg = registrations::get(&db, &reg_id).await.unwrap().unwrap();
        assert_eq!(reg.status, RegistrationStatus::Confirmed);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn short_payment_is_recorded_as_partial() {
        let (db, _dir) = setup_db().await;
        let (reg_id, token) = seed_attempt(&db, "inv-1").await;

        let outcome = apply(&db, "inv-1", TransactionStatus::Completed, paid(3000), 30)
            .await
            .unwrap();
        assert_eq!(outcome, AppliedOutcome::MarkedPartial);

        let ledger = transactions::get_by_invoice(&db, "inv-1").await.unwrap().unwrap();
        assert_eq!(ledger.status, TransactionStatus::Partial);
        // The requested amount stays on the row; the paid amount lives in
        // the payload snapshot.
        assert_eq!(ledger.amount_cents, 5000);

        let reg = registrations::get(&db, &reg_id).await.unwrap().unwrap();
        assert_eq!(reg.status, RegistrationStatus::Pending);
        assert_eq!(reg.payment_status, PaymentStatus::Partial);
        assert!(sessions::get(&db, &token).await.unwrap().is_some());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn partial_then_full_settlement_confirms() {
        let (db, _dir) = setup_db().await;
        let (reg_id, _) = seed_attempt(&db, "inv-1").await;

        apply(&db, "inv-1", TransactionStatus::Completed, paid(3000), 30)
            .await
            .unwrap();
        let outcome = apply(&db, "inv-1", TransactionStatus::Completed, paid(5000), 30)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AppliedOutcome::Confirmed { mail: Some(_) }
        ));
        assert_eq!(
            registrations::get(&db, &reg_id).await.unwrap().unwrap().status,
            RegistrationStatus::Confirmed
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failure_keeps_registration_pending_and_reopens_session() {
        let (db, _dir) = setup_db().await;
        let (reg_id, token) = seed_attempt(&db, "inv-1").await;

        let outcome = apply(
            &db,
            "inv-1",
            TransactionStatus::Failed,
            OutcomeEvidence::default(),
            30,
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            AppliedOutcome::MarkedFailed {
                session_reopened: true
            }
        );

        let reg = registrations::get(&db, &reg_id).await.unwrap().unwrap();
        assert_eq!(reg.status, RegistrationStatus::Pending);
        assert_eq!(reg.payment_status, PaymentStatus::Failed);

        let session = sessions::get(&db, &token).await.unwrap().unwrap();
        assert!(session.invoice_id.is_none());
        assert!(session.order_id.is_none());
        assert!(session.expires_at > Utc::now());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expiry_expires_the_pending_registration() {
        let (db, _dir) = setup_db().await;
        let (reg_id, token) = seed_attempt(&db, "inv-1").await;

        let outcome = apply(
            &db,
            "inv-1",
            TransactionStatus::Expired,
            OutcomeEvidence::default(),
            30,
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            AppliedOutcome::MarkedExpired {
                registration_expired: true
            }
        );

        let reg = registrations::get(&db, &reg_id).await.unwrap().unwrap();
        assert_eq!(reg.status, RegistrationStatus::Expired);
        assert_eq!(reg.payment_status, PaymentStatus::Expired);
        assert!(sessions::get(&db, &token).await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn late_settlement_after_expiry_flags_manual_review() {
        let (db, _dir) = setup_db().await;
        let (reg_id, _) = seed_attempt(&db, "inv-1").await;

        apply(
            &db,
            "inv-1",
            TransactionStatus::Expired,
            OutcomeEvidence::default(),
            30,
        )
        .await
        .unwrap();

        // The gateway settles anyway. Ledger takes the money; the expired
        // registration is not resurrected.
        let outcome = apply(&db, "inv-1", TransactionStatus::Completed, paid(5000), 30)
            .await
            .unwrap();
        assert_eq!(outcome, AppliedOutcome::Confirmed { mail: None });

        let ledger = transactions::get_by_invoice(&db, "inv-1").await.unwrap().unwrap();
        assert_eq!(ledger.status, TransactionStatus::Completed);
        assert_eq!(
            registrations::get(&db, &reg_id).await.unwrap().unwrap().status,
            RegistrationStatus::Expired
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn admin_confirmation_first_suppresses_webhook_mail() {
        let (db, _dir) = setup_db().await;
        let (reg_id, _) = seed_attempt(&db, "inv-1").await;

        registrations::confirm_manual(&db, &reg_id).await.unwrap();
        let outcome = apply(&db, "inv-1", TransactionStatus::Completed, paid(5000), 30)
            .await
            .unwrap();
        assert_eq!(outcome, AppliedOutcome::Confirmed { mail: None });

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn forbidden_transition_is_blocked() {
        let (db, _dir) = setup_db().await;
        seed_attempt(&db, "inv-1").await;

        apply(
            &db,
            "inv-1",
            TransactionStatus::Expired,
            OutcomeEvidence::default(),
            30,
        )
        .await
        .unwrap();
        let outcome = apply(
            &db,
            "inv-1",
            TransactionStatus::Failed,
            OutcomeEvidence::default(),
            30,
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            AppliedOutcome::Blocked {
                current: TransactionStatus::Expired
            }
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_invoice_is_untracked() {
        let (db, _dir) = setup_db().await;
        let outcome = apply(
            &db,
            "inv-ghost",
            TransactionStatus::Completed,
            OutcomeEvidence::default(),
            30,
        )
        .await
        .unwrap();
        assert_eq!(outcome, AppliedOutcome::UntrackedInvoice);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn non_terminal_status_is_refused() {
        let (db, _dir) = setup_db().await;
        let err = apply(
            &db,
            "inv-1",
            TransactionStatus::Pending,
            OutcomeEvidence::default(),
            30,
        )
        .await;
        assert!(err.is_err());
        db.close().await.unwrap();
    }
}
