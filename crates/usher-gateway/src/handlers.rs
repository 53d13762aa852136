// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the registration and payment API.
//!
//! Handlers translate between wire DTOs and the service layer and own
//! nothing else; every business decision lives below them. Error bodies
//! always carry a concrete next action for the attendee.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use usher_core::error::UsherError;
use usher_core::traits::InvoiceRequest;
use usher_core::types::{
    format_amount, PaymentMethod, PaymentSession, RegistrationId, SessionToken, TransactionStatus,
};
use usher_payments::metrics;
use usher_payments::reconciler::WebhookOutcome;
use usher_registration::{SubmitOutcome, SubmitRequest};
use usher_session::SessionError;
use usher_storage::queries::outcomes::AppliedOutcome;
use usher_storage::queries::registrations::TransitionOutcome;
use usher_storage::queries::sessions as session_rows;

use crate::correlation::ERROR_TYPE_HEADER;
use crate::server::GatewayState;

/// Request body for `POST /events/{event_id}/registrations`.
#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub tickets: Vec<TicketLine>,
    #[serde(default)]
    pub preferred_method: Option<PaymentMethod>,
}

/// One requested ticket line.
#[derive(Debug, Deserialize)]
pub struct TicketLine {
    pub ticket_id: i64,
    pub quantity: u32,
}

/// Response body for a successful submission.
#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub registration_id: String,
    /// Bearer token for the payment routes. Absent for free registrations,
    /// which are confirmed immediately.
    pub session_token: Option<String>,
    pub total_amount_cents: i64,
    pub currency: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub free: bool,
}

/// Response body for `POST /registrations/{token}/checkout/card`.
#[derive(Debug, Serialize)]
pub struct CardCheckoutResponse {
    /// Hosted checkout page to redirect the browser to.
    pub checkout_url: String,
    pub invoice_id: String,
    pub payment_expires_at: DateTime<Utc>,
}

/// Response body for `POST /registrations/{token}/checkout/crypto`.
#[derive(Debug, Serialize)]
pub struct CryptoCheckoutResponse {
    pub registration_id: String,
    /// Reference the attendee must put on the transfer so the operator
    /// can match it.
    pub transfer_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub instructions: String,
}

/// Query string on `GET /payment/callback`. Browser-supplied, untrusted;
/// only `invoice_id` is used, and only to ask the gateway.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Request body for `POST /admin/registrations/{id}/decline`.
#[derive(Debug, Deserialize)]
pub struct DeclineRequest {
    pub reason: String,
}

/// Request body for `POST /admin/registrations/{id}/confirm-crypto`.
#[derive(Debug, Deserialize)]
pub struct ConfirmCryptoRequest {
    /// Amount actually received, in minor units.
    pub amount_cents: i64,
    /// Bank-side reference of the transfer.
    pub reference: String,
}

/// Admin mutation result.
#[derive(Debug, Serialize)]
pub struct AdminOutcomeResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn internal_error(context: &str, e: &UsherError) -> Response {
    error!(error = %e, "{context}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "something went wrong on our side; please try again in a moment",
    )
}

/// GET /health
pub async fn get_health() -> Response {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}

/// POST /events/{event_id}/registrations
pub async fn post_registration(
    State(state): State<GatewayState>,
    Path(event_id): Path<i64>,
    Json(body): Json<RegistrationRequest>,
) -> Response {
    let request = SubmitRequest {
        event_id,
        attendee: usher_core::types::Attendee {
            name: body.name,
            email: body.email,
            phone: body.phone,
        },
        lines: body
            .tickets
            .into_iter()
            .map(|line| usher_registration::RequestedLine {
                ticket_id: line.ticket_id,
                quantity: line.quantity,
            })
            .collect(),
        preferred_method: body.preferred_method,
    };

    let outcome = match state.registration.submit(request).await {
        Ok(outcome) => outcome,
        Err(e) => return internal_error("submission failed", &e),
    };

    match outcome {
        SubmitOutcome::PendingPayment {
            registration_id,
            token,
            total_amount_cents,
        } => {
            metrics::record_registration("created");
            let ttl = state.config.session.ttl_minutes.min(i64::MAX as u64) as i64;
            (
                StatusCode::CREATED,
                Json(RegistrationResponse {
                    registration_id: registration_id.0,
                    session_token: Some(token.0),
                    total_amount_cents,
                    currency: state.config.gateway.currency.clone(),
                    expires_at: Some(Utc::now() + Duration::minutes(ttl)),
                    free: false,
                }),
            )
                .into_response()
        }
        SubmitOutcome::ConfirmedFree { registration_id } => {
            metrics::record_registration("confirmed_free");
            (
                StatusCode::CREATED,
                Json(RegistrationResponse {
                    registration_id: registration_id.0,
                    session_token: None,
                    total_amount_cents: 0,
                    currency: state.config.gateway.currency.clone(),
                    expires_at: None,
                    free: true,
                }),
            )
                .into_response()
        }
        SubmitOutcome::Duplicate(reason) => {
            metrics::record_registration("duplicate");
            error_response(StatusCode::CONFLICT, reason.user_message())
        }
        SubmitOutcome::Unverifiable => {
            metrics::record_registration("unverifiable");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "we could not verify your registration right now; please try again shortly",
            )
        }
        SubmitOutcome::EventNotFound => {
            error_response(StatusCode::NOT_FOUND, "this event does not exist")
        }
        SubmitOutcome::EmptySelection => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "select at least one ticket",
        ),
        SubmitOutcome::UnknownTicket { ticket_id } => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("ticket {ticket_id} does not belong to this event"),
        ),
        SubmitOutcome::SoldOut { ticket_id } => {
            metrics::record_registration("sold_out");
            error_response(
                StatusCode::CONFLICT,
                format!("ticket {ticket_id} is sold out; pick a different ticket class"),
            )
        }
    }
}

/// Maps a session failure to its distinct status. The store has already
/// purged the rejected row; the message tells the attendee what to do.
fn session_error_response(e: SessionError) -> Response {
    let status = match &e {
        SessionError::NotFound => StatusCode::NOT_FOUND,
        SessionError::Expired => StatusCode::GONE,
        SessionError::Malformed => StatusCode::BAD_REQUEST,
        SessionError::EventMismatch => StatusCode::CONFLICT,
        SessionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if let SessionError::Storage(inner) = &e {
        error!(error = %inner, "session lookup failed");
    }
    error_response(status, e.to_string())
}

/// Resolves a checkout token to its live session.
async fn resolve_session(
    state: &GatewayState,
    token: &SessionToken,
) -> Result<PaymentSession, Response> {
    // The checkout routes carry no event id, so the binding check is
    // against the session's own event. Expiry and envelope integrity
    // are what matter here.
    let row = match session_rows::get(&state.db, token).await {
        Ok(Some(row)) => row,
        Ok(None) => return Err(session_error_response(SessionError::NotFound)),
        Err(e) => return Err(session_error_response(SessionError::Storage(e))),
    };
    state
        .sessions
        .validate(token, row.event_id)
        .await
        .map_err(session_error_response)
}

fn describe_selections(session: &PaymentSession) -> String {
    let lines: Vec<String> = session
        .ticket_selections
        .iter()
        .map(|s| format!("{}x {}", s.quantity, s.name))
        .collect();
    lines.join(", ")
}

/// POST /registrations/{token}/checkout/card
pub async fn post_checkout_card(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
) -> Response {
    let token = SessionToken(token);
    let session = match resolve_session(&state, &token).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    // Bounds first: an amount the gateway will refuse anyway must not
    // open an invoice. The session survives this rejection.
    match state.gateway.limits().await {
        Ok(limits) => {
            if !limits.allows(session.total_amount_cents, &session.currency) {
                info!(
                    registration_id = %session.registration_id.0,
                    amount = session.total_amount_cents,
                    "amount outside gateway limits"
                );
                return error_response(
                    StatusCode::CONFLICT,
                    format!(
                        "{} cannot be paid by card; please use the transfer option instead",
                        format_amount(session.total_amount_cents, &session.currency)
                    ),
                );
            }
        }
        Err(e) => return gateway_unavailable("limits query failed", &e),
    }

    let order_id = session
        .order_id
        .clone()
        .unwrap_or_else(|| format!("ord-{}", uuid::Uuid::new_v4().simple()));
    let request = InvoiceRequest {
        amount_cents: session.total_amount_cents,
        currency: session.currency.clone(),
        order_id: order_id.clone(),
        description: describe_selections(&session),
        callback_url: format!("{}/payment/callback", state.config.server.public_base_url),
        webhook_url: format!("{}/payment/webhook", state.config.server.public_base_url),
    };

    let invoice = match state.gateway.create_invoice(request).await {
        Ok(invoice) => invoice,
        Err(e) => return gateway_unavailable("invoice creation failed", &e),
    };

    if let Err(e) = state
        .ledger
        .record_attempt(
            session.registration_id.clone(),
            &invoice.invoice_id,
            PaymentMethod::Card,
            session.total_amount_cents,
            &session.currency,
        )
        .await
    {
        return internal_error("ledger record failed", &e);
    }
    match state
        .sessions
        .extend_for_card(&token, &order_id, &invoice.invoice_id)
        .await
    {
        Ok(true) => {}
        Ok(false) => warn!(token = %token.0, "session vanished while binding card attempt"),
        Err(e) => return internal_error("session extend failed", &e),
    }

    metrics::record_invoice_created("card");
    let card_ttl = state.config.session.card_ttl_minutes.min(i64::MAX as u64) as i64;
    Json(CardCheckoutResponse {
        checkout_url: invoice.checkout_url,
        invoice_id: invoice.invoice_id,
        payment_expires_at: Utc::now() + Duration::minutes(card_ttl),
    })
    .into_response()
}

/// Gateway trouble answers 502 and points at the other rail; the session
/// is untouched so the attendee can come back.
fn gateway_unavailable(context: &str, e: &UsherError) -> Response {
    error!(error = %e, "{context}");
    error_response(
        StatusCode::BAD_GATEWAY,
        "card payments are temporarily unavailable; you can pay by transfer instead, or retry in a few minutes",
    )
}

/// POST /registrations/{token}/checkout/crypto
pub async fn post_checkout_crypto(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
) -> Response {
    let token = SessionToken(token);
    let session = match resolve_session(&state, &token).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match state.registration.select_crypto(&session.registration_id).await {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                StatusCode::CONFLICT,
                "this registration is no longer awaiting payment",
            );
        }
        Err(e) => return internal_error("crypto selection failed", &e),
    }

    // The registration row holds everything reconciliation needs; the
    // session has no further purpose once the attendee leaves for their
    // banking app.
    if let Err(e) = state.sessions.destroy(&token).await {
        warn!(token = %token.0, error = %e, "failed to drop session after crypto selection");
    }

    metrics::record_invoice_created("crypto");
    Json(CryptoCheckoutResponse {
        registration_id: session.registration_id.0.clone(),
        transfer_reference: session.registration_id.0,
        amount_cents: session.total_amount_cents,
        currency: session.currency.clone(),
        instructions: format!(
            "transfer {} and put the reference in the payment note; your registration is confirmed once the transfer arrives",
            format_amount(session.total_amount_cents, &session.currency)
        ),
    })
    .into_response()
}

/// POST /payment/webhook
pub async fn post_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());
    let source_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .unwrap_or("direct")
        .trim();
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let outcome = state
        .reconciler
        .process(&body, signature, source_ip, user_agent)
        .await;

    let status = StatusCode::from_u16(outcome.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = match &outcome {
        WebhookOutcome::Rejected(kind) => (
            status,
            Json(ErrorResponse {
                error: kind.to_string(),
            }),
        )
            .into_response(),
        _ => (status, Json(serde_json::json!({ "status": "ok" }))).into_response(),
    };
    if let Some(error_type) = outcome.error_type()
        && let Ok(value) = axum::http::HeaderValue::from_str(error_type)
    {
        response.headers_mut().insert(ERROR_TYPE_HEADER, value);
    }
    response
}

/// GET /payment/callback
///
/// The browser's return leg. Query parameters are attacker-controlled,
/// so the outcome is decided by re-querying the gateway, never by
/// `status` in the URL.
pub async fn get_callback(
    State(state): State<GatewayState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let paths = &state.config.server;
    let Some(invoice_id) = query.invoice_id.filter(|s| !s.is_empty()) else {
        return Redirect::to(&paths.failure_path).into_response();
    };

    let status = match state.gateway.invoice_status(&invoice_id).await {
        Ok(status) => status,
        Err(e) => {
            // Can't know yet; the webhook will settle it.
            warn!(invoice_id, error = %e, "status query failed on callback; deferring to webhook");
            defer_to_webhook(&state, &invoice_id).await;
            return Redirect::to(&paths.pending_path).into_response();
        }
    };

    if !status.state.is_terminal() {
        defer_to_webhook(&state, &invoice_id).await;
        return Redirect::to(&paths.pending_path).into_response();
    }

    match state.reconciler.apply_invoice_status(&status).await {
        Ok(AppliedOutcome::Confirmed { .. })
        | Ok(AppliedOutcome::AlreadyApplied {
            current: TransactionStatus::Completed,
        }) => Redirect::to(&paths.success_path).into_response(),
        Ok(AppliedOutcome::MarkedPartial) => Redirect::to(&paths.pending_path).into_response(),
        Ok(outcome) => {
            info!(invoice_id, ?outcome, "callback landed on a non-success outcome");
            Redirect::to(&paths.failure_path).into_response()
        }
        Err(e) => {
            error!(invoice_id, error = %e, "callback apply failed; deferring to webhook");
            defer_to_webhook(&state, &invoice_id).await;
            Redirect::to(&paths.pending_path).into_response()
        }
    }
}

/// Marks the session so the sweep knows the webhook owns this outcome.
async fn defer_to_webhook(state: &GatewayState, invoice_id: &str) {
    match state.sessions.find_by_invoice(invoice_id).await {
        Ok(Some(session)) => {
            if let Err(e) = state.sessions.set_webhook_fallback(&session.token).await {
                warn!(invoice_id, error = %e, "failed to flag webhook fallback");
            }
        }
        Ok(None) => {}
        Err(e) => warn!(invoice_id, error = %e, "session lookup failed on callback"),
    }
}

/// POST /admin/registrations/{id}/decline
pub async fn post_admin_decline(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<DeclineRequest>,
) -> Response {
    if body.reason.trim().is_empty() {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "a decline reason is required");
    }
    let id = RegistrationId(id);
    match state.registration.decline(&id, body.reason.trim()).await {
        Ok(TransitionOutcome::Applied) => Json(AdminOutcomeResponse {
            status: "declined".into(),
            detail: None,
        })
        .into_response(),
        Ok(TransitionOutcome::NotPending { current }) => error_response(
            StatusCode::CONFLICT,
            format!("registration is already {current}"),
        ),
        Ok(TransitionOutcome::NotFound) => {
            error_response(StatusCode::NOT_FOUND, "no such registration")
        }
        Err(e) => internal_error("decline failed", &e),
    }
}

/// POST /admin/registrations/{id}/confirm-crypto
pub async fn post_admin_confirm_crypto(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<ConfirmCryptoRequest>,
) -> Response {
    if body.reference.trim().is_empty() {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "the transfer reference is required",
        );
    }
    let id = RegistrationId(id);
    match state
        .reconciler
        .confirm_manual_transfer(&id, body.reference.trim(), body.amount_cents)
        .await
    {
        Ok(AppliedOutcome::Confirmed { .. }) => Json(AdminOutcomeResponse {
            status: "confirmed".into(),
            detail: None,
        })
        .into_response(),
        Ok(AppliedOutcome::MarkedPartial) => (
            StatusCode::ACCEPTED,
            Json(AdminOutcomeResponse {
                status: "partial".into(),
                detail: Some(
                    "transfer is short of the total; registration left pending".into(),
                ),
            }),
        )
            .into_response(),
        Ok(AppliedOutcome::AlreadyApplied { current })
        | Ok(AppliedOutcome::Blocked { current }) => error_response(
            StatusCode::CONFLICT,
            format!("a {current} payment is already recorded for this registration"),
        ),
        Ok(outcome) => {
            warn!(registration_id = %id.0, ?outcome, "unexpected manual-confirm outcome");
            error_response(StatusCode::CONFLICT, "the transfer could not be applied")
        }
        Err(UsherError::NotFound { .. }) => {
            error_response(StatusCode::NOT_FOUND, "no such registration")
        }
        Err(e) => internal_error("manual confirmation failed", &e),
    }
}
