// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `usher serve` command implementation.
//!
//! Wires the full stack: SQLite storage with migrations, the session
//! store, the SMTP (or null) mailer, the card gateway client, the
//! registration service, ledger, and webhook reconciler, then serves the
//! HTTP surface until ctrl-c. A background task runs the expiry sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use usher_config::model::UsherConfig;
use usher_config::validation;
use usher_core::error::UsherError;
use usher_core::traits::PaymentGateway;
use usher_gateway::{start_server, GatewayState};
use usher_payments::client::HttpPaymentGateway;
use usher_payments::ledger::TransactionLedger;
use usher_payments::reconciler::WebhookReconciler;
use usher_payments::metrics;
use usher_registration::RegistrationService;
use usher_session::SessionStore;
use usher_storage::queries::{idempotency, locks};
use usher_storage::Database;

/// Runs the `usher serve` command.
pub async fn run_serve(config: UsherConfig) -> Result<(), UsherError> {
    init_tracing(&config.server.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting usher serve");

    let missing = validation::serve_requirements(&config);
    if !missing.is_empty() {
        for item in &missing {
            error!("{item}");
        }
        return Err(UsherError::Config(
            "configuration is incomplete for serving; see the errors above".into(),
        ));
    }

    // Metrics exporter first, so everything recorded from here on counts.
    if let Some(bind) = &config.server.metrics_bind {
        let addr: std::net::SocketAddr = bind
            .parse()
            .map_err(|e| UsherError::Config(format!("invalid server.metrics_bind {bind:?}: {e}")))?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| UsherError::Config(format!("metrics exporter failed to start: {e}")))?;
        metrics::register_metrics();
        info!(%addr, "prometheus metrics exporter listening");
    }

    let db = Database::open_with(&config.storage).await?;
    let sessions = Arc::new(SessionStore::new(db.clone(), &config.session)?);
    let mailer = usher_mailer::build_mailer(&config.mailer)?;
    let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(&config.gateway)?);

    let registration = Arc::new(RegistrationService::new(
        db.clone(),
        Arc::clone(&sessions),
        Arc::clone(&mailer),
        &config.registration,
        &config.gateway.currency,
    ));
    let ledger = TransactionLedger::new(
        db.clone(),
        gateway.provider(),
        config.session.ttl_minutes.min(u64::from(u32::MAX)) as u32,
    );
    let reconciler = Arc::new(WebhookReconciler::new(
        db.clone(),
        Arc::clone(&gateway),
        ledger.clone(),
        Arc::clone(&mailer),
        &config.webhook,
    ));

    // Startup sweeps: recover from whatever state a crash left behind.
    run_sweeps(&db, &registration, &sessions).await;

    let sweep_cancel = CancellationToken::new();
    let sweeper = tokio::spawn(sweep_loop(
        db.clone(),
        Arc::clone(&registration),
        Arc::clone(&sessions),
        sweep_cancel.clone(),
    ));

    let state = GatewayState {
        db: db.clone(),
        sessions,
        registration,
        gateway,
        ledger,
        reconciler,
        config: Arc::new(config.clone()),
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received; draining connections");
    };
    start_server(&config.server, state, shutdown).await?;

    sweep_cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "sweep task did not exit cleanly");
    }
    db.close().await?;
    info!("usher serve stopped");
    Ok(())
}

/// Periodic expiry sweeps. Failures are logged and retried next tick;
/// a broken sweep must not take the server down.
async fn sweep_loop(
    db: Database,
    registration: Arc<RegistrationService>,
    sessions: Arc<SessionStore>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => run_sweeps(&db, &registration, &sessions).await,
        }
    }
}

async fn run_sweeps(db: &Database, registration: &RegistrationService, sessions: &SessionStore) {
    match registration.expire_stale().await {
        Ok(expired) if expired > 0 => info!(expired, "expired stale registrations"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "registration expiry sweep failed"),
    }
    if let Err(e) = sessions.purge_expired().await {
        warn!(error = %e, "session purge sweep failed");
    }
    if let Err(e) = locks::sweep_expired(db).await {
        warn!(error = %e, "lock sweep failed");
    }
    if let Err(e) = idempotency::sweep_expired(db).await {
        warn!(error = %e, "idempotency sweep failed");
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("usher={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
