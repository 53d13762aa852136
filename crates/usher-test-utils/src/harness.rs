// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete registration-and-payments stack
//! over a temp SQLite database with mock gateway and mailer adapters, so
//! integration tests drive real submissions, checkouts, and webhook
//! deliveries without external services.

use std::sync::Arc;

use usher_config::model::UsherConfig;
use usher_core::error::UsherError;
use usher_payments::ledger::TransactionLedger;
use usher_payments::reconciler::WebhookReconciler;
use usher_registration::RegistrationService;
use usher_session::SessionStore;
use usher_storage::Database;
use usher_storage::queries::inventory;

use crate::mock_gateway::MockGateway;
use crate::mock_mailer::MockMailer;

// 32 bytes of hex; fine for tests, never for production.
const TEST_SESSION_KEY: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Builder for test environments with configurable options.
pub struct TestHarnessBuilder {
    configure: Option<Box<dyn FnOnce(&mut UsherConfig) + Send>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self { configure: None }
    }

    /// Adjust the config before the stack is built, e.g. to shrink TTLs
    /// or flip `restock_on_decline`.
    pub fn with_config(mut self, configure: impl FnOnce(&mut UsherConfig) + Send + 'static) -> Self {
        self.configure = Some(Box::new(configure));
        self
    }

    /// Build the harness, creating all subsystems over a temp database.
    pub async fn build(self) -> Result<TestHarness, UsherError> {
        let temp_dir = tempfile::TempDir::new()
            .map_err(|e| UsherError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = UsherConfig::default();
        config.storage.database_path = db_path.to_string_lossy().to_string();
        config.session.encryption_key = Some(TEST_SESSION_KEY.to_string());
        config.gateway.currency = "EUR".to_string();
        if let Some(configure) = self.configure {
            configure(&mut config);
        }

        let db = Database::open_with(&config.storage).await?;
        let sessions = Arc::new(SessionStore::new(db.clone(), &config.session)?);
        let gateway = Arc::new(MockGateway::new());
        let mailer = Arc::new(MockMailer::new());

        let registration = Arc::new(RegistrationService::new(
            db.clone(),
            Arc::clone(&sessions),
            mailer.clone(),
            &config.registration,
            &config.gateway.currency,
        ));
        let ledger = TransactionLedger::new(
            db.clone(),
            "mock",
            config.session.ttl_minutes.min(u64::from(u32::MAX)) as u32,
        );
        let reconciler = Arc::new(WebhookReconciler::new(
            db.clone(),
            gateway.clone(),
            ledger.clone(),
            mailer.clone(),
            &config.webhook,
        ));

        Ok(TestHarness {
            db,
            sessions,
            registration,
            ledger,
            reconciler,
            gateway,
            mailer,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// Temp SQLite database, migrated and WAL-enabled.
    pub db: Database,
    /// Session store over the temp database.
    pub sessions: Arc<SessionStore>,
    /// Registration intake service wired to the mock mailer.
    pub registration: Arc<RegistrationService>,
    /// Transaction ledger recording under the `"mock"` provider.
    pub ledger: TransactionLedger,
    /// Webhook reconciler wired to the mock gateway and mailer.
    pub reconciler: Arc<WebhookReconciler>,
    /// The mock payment gateway.
    pub gateway: Arc<MockGateway>,
    /// The mock mailer.
    pub mailer: Arc<MockMailer>,
    /// The configuration the stack was built from.
    pub config: UsherConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Build a harness with default configuration.
    pub async fn new() -> Result<Self, UsherError> {
        Self::builder().build().await
    }

    /// Insert an event with ticket classes `(name, price_cents, available)`,
    /// returning the event id and ticket ids in order.
    pub async fn seed_event(
        &self,
        name: &str,
        tickets: &[(&str, i64, i64)],
    ) -> Result<(i64, Vec<i64>), UsherError> {
        let event_id = inventory::insert_event(&self.db, name, chrono::Utc::now()).await?;
        let mut ticket_ids = Vec::with_capacity(tickets.len());
        for (ticket_name, price_cents, available) in tickets {
            ticket_ids.push(
                inventory::insert_ticket(&self.db, event_id, ticket_name, *price_cents, *available)
                    .await?,
            );
        }
        Ok((event_id, ticket_ids))
    }
}
