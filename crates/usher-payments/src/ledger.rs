// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider-stamped facade over the transaction ledger.
//!
//! Checkout flows record attempts here; webhooks and callbacks apply
//! verified outcomes. The transition rules themselves live in storage so
//! every caller shares one guarded path.

use usher_core::error::UsherError;
use usher_core::types::{PaymentMethod, PaymentTransaction, RegistrationId, TransactionStatus};
use usher_storage::queries::outcomes::{self, AppliedOutcome, OutcomeEvidence};
use usher_storage::queries::transactions;
use usher_storage::{Database, NewTransaction};

#[derive(Clone)]
pub struct TransactionLedger {
    db: Database,
    provider: String,
    retry_ttl_minutes: u32,
}

impl TransactionLedger {
    /// `retry_ttl_minutes` is the fresh session window granted when a failed
    /// attempt reopens the payment session.
    pub fn new(db: Database, provider: &str, retry_ttl_minutes: u32) -> Self {
        Self {
            db,
            provider: provider.to_string(),
            retry_ttl_minutes,
        }
    }

    /// Inserts the pending ledger row for a freshly created invoice.
    pub async fn record_attempt(
        &self,
        registration_id: RegistrationId,
        invoice_id: &str,
        method: PaymentMethod,
        amount_cents: i64,
        currency: &str,
    ) -> Result<(), UsherError> {
        transactions::insert_attempt(
            &self.db,
            NewTransaction {
                id: uuid::Uuid::new_v4().to_string(),
                registration_id,
                provider: self.provider.clone(),
                transaction_id: invoice_id.to_string(),
                payment_method: method,
                amount_cents,
                currency: currency.to_string(),
            },
        )
        .await
    }

    /// Applies a verified terminal status to the row holding `invoice_id`.
    /// Completed stays sticky; forbidden transitions come back as
    /// [`AppliedOutcome::Blocked`] without touching any row.
    pub async fn apply(
        &self,
        invoice_id: &str,
        reported: TransactionStatus,
        evidence: OutcomeEvidence,
    ) -> Result<AppliedOutcome, UsherError> {
        outcomes::apply(
            &self.db,
            invoice_id,
            reported,
            evidence,
            self.retry_ttl_minutes,
        )
        .await
    }

    pub async fn find(&self, invoice_id: &str) -> Result<Option<PaymentTransaction>, UsherError> {
        transactions::get_by_invoice(&self.db, invoice_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;
    use usher_core::types::{
        Attendee, PaymentStatus, RegistrationStatus, TicketSelection,
    };
    use usher_storage::queries::{inventory, registrations};
    use usher_storage::NewRegistration;

    async fn setup() -> (TransactionLedger, Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (TransactionLedger::new(db.clone(), "cardlink", 30), db, dir)
    }

    async fn seed_registration(db: &Database) -> RegistrationId {
        let event_id = inventory::insert_event(db, "Test Event", Utc::now())
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
                email: "a@example.com".into(),
                phone: "+301".into(),
            },
            selections: vec![TicketSelection {
                ticket_id,
                name: "Standard".into(),
                unit_price_cents: 2500,
                quantity: 1,
                subtotal_cents: 2500,
            }],
            total_amount_cents: 2500,
            currency: "EUR".into(),
            status: RegistrationStatus::Pending,
            payment_status: PaymentStatus::Pending,
            preferred_method: Some(PaymentMethod::Card),
        };
        let id = reg.id.clone();
        registrations::create_submission(db, reg, None).await.unwrap();
        id
    }

    #[tokio::test]
    async fn recorded_attempts_carry_the_provider_tag() {
        let (ledger, db, _dir) = setup().await;
        let reg_id = seed_registration(&db).await;

        ledger
            .record_attempt(reg_id, "inv-1", PaymentMethod::Card, 2500, "EUR")
            .await
            .unwrap();

        let row = ledger.find("inv-1").await.unwrap().unwrap();
        assert_eq!(row.provider, "cardlink");
        assert_eq!(row.status, TransactionStatus::Pending);
        assert_eq!(row.amount_cents, 2500);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn apply_routes_through_the_guarded_outcome_path() {
        let (ledger, db, _dir) = setup().await;
        let reg_id = seed_registration(&db).await;
        ledger
            .record_attempt(reg_id.clone(), "inv-1", PaymentMethod::Card, 2500, "EUR")
            .await
            .unwrap();

        let outcome = ledger
            .apply(
                "inv-1",
                TransactionStatus::Completed,
                OutcomeEvidence {
                    paid_amount_cents: Some(2500),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, AppliedOutcome::Confirmed { .. }));
        assert_eq!(
            registrations::get(&db, &reg_id).await.unwrap().unwrap().status,
            RegistrationStatus::Confirmed
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_invoice_is_untracked() {
        let (ledger, db, _dir) = setup().await;
        let outcome = ledger
            .apply(
                "inv-ghost",
                TransactionStatus::Completed,
                OutcomeEvidence::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, AppliedOutcome::UntrackedInvoice);
        db.close().await.unwrap();
    }
}
