// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registration HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use usher_config::model::{ServerConfig, UsherConfig};
use usher_core::error::UsherError;
use usher_core::traits::PaymentGateway;
use usher_payments::ledger::TransactionLedger;
use usher_payments::reconciler::WebhookReconciler;
use usher_registration::RegistrationService;
use usher_session::SessionStore;
use usher_storage::Database;

use crate::auth::{admin_auth_middleware, AdminAuth};
use crate::correlation::correlation_middleware;
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Database,
    pub sessions: Arc<SessionStore>,
    pub registration: Arc<RegistrationService>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub ledger: TransactionLedger,
    pub reconciler: Arc<WebhookReconciler>,
    pub config: Arc<UsherConfig>,
}

/// Assembles the full application router.
///
/// Public routes carry no auth: submissions and checkouts are guarded by
/// session tokens, the webhook by its signature. Admin routes sit behind
/// the fail-closed bearer middleware.
pub fn build_router(state: GatewayState) -> Router {
    let admin_auth = AdminAuth {
        token: state.config.server.admin_token.clone(),
    };

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route(
            "/events/{event_id}/registrations",
            post(handlers::post_registration),
        )
        .route(
            "/registrations/{token}/checkout/card",
            post(handlers::post_checkout_card),
        )
        .route(
            "/registrations/{token}/checkout/crypto",
            post(handlers::post_checkout_crypto),
        )
        .route("/payment/webhook", post(handlers::post_webhook))
        .route("/payment/callback", get(handlers::get_callback))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(
            "/admin/registrations/{id}/decline",
            post(handlers::post_admin_decline),
        )
        .route(
            "/admin/registrations/{id}/confirm-crypto",
            post(handlers::post_admin_confirm_crypto),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            admin_auth,
            admin_auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(axum_middleware::from_fn(correlation_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds and serves the router until `shutdown` resolves.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), UsherError> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| UsherError::Config(format!("failed to bind {addr}: {e}")))?;

    tracing::info!(%addr, "registration server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| UsherError::Internal(format!("server error: {e}")))?;

    Ok(())
}
