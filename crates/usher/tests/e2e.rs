// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end journeys over the full HTTP surface and a real temp
//! database: submission, checkout, webhook settlement, the browser
//! callback, and the admin transfer flow.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use usher_core::traits::{InvoiceState, InvoiceStatus, Notification};
use usher_gateway::{build_router, GatewayState};
use usher_test_utils::{TestHarness, ACCEPTED_SIGNATURE};

const ADMIN_TOKEN: &str = "e2e-admin-token";

async fn harness() -> TestHarness {
    TestHarness::builder()
        .with_config(|config| {
            config.server.admin_token = Some(ADMIN_TOKEN.to_string());
            config.server.public_base_url = "https://tickets.example".to_string();
        })
        .build()
        .await
        .unwrap()
}

fn router(h: &TestHarness) -> Router {
    build_router(GatewayState {
        db: h.db.clone(),
        sessions: h.sessions.clone(),
        registration: h.registration.clone(),
        gateway: h.gateway.clone(),
        ledger: h.ledger.clone(),
        reconciler: h.reconciler.clone(),
        config: Arc::new(h.config.clone()),
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn signed_webhook(body: Value) -> Request<Body> {
    Request::post("/payment/webhook")
        .header("content-type", "application/json")
        .header("x-signature", ACCEPTED_SIGNATURE)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn submit(app: &Router, event_id: i64, ticket_id: i64, email: &str, phone: &str) -> Value {
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/events/{event_id}/registrations"),
            json!({
                "name": "Ada Wexler",
                "email": email,
                "phone": phone,
                "tickets": [{"ticket_id": ticket_id, "quantity": 2}],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

async fn checkout_card(app: &Router, token: &str) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/registrations/{token}/checkout/card"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["invoice_id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn card_journey_from_submission_to_confirmation_mail() {
    let h = harness().await;
    let (event_id, tickets) = h
        .seed_event("Harbor Nights", &[("Standard", 2500, 10)])
        .await
        .unwrap();
    let app = router(&h);

    let submission = submit(&app, event_id, tickets[0], "ada@example.com", "+301").await;
    let token = submission["session_token"].as_str().unwrap();
    let invoice_id = checkout_card(&app, token).await;

    let response = app
        .clone()
        .oneshot(signed_webhook(json!({
            "invoice_id": invoice_id,
            "event_type": "completed",
            "paid_amount_cents": 5000,
            "fee_cents": 85,
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mails = h.mailer.wait_for(1).await;
    match &mails[0] {
        Notification::RegistrationConfirmed {
            to,
            total_amount_cents,
            ..
        } => {
            assert_eq!(to, "ada@example.com");
            assert_eq!(*total_amount_cents, 5000);
        }
        other => panic!("expected a confirmation, got {other:?}"),
    }

    // Gateway redelivers; nothing changes and no second mail goes out.
    let response = app
        .oneshot(signed_webhook(json!({
            "invoice_id": invoice_id,
            "event_type": "completed",
            "paid_amount_cents": 5000,
            "fee_cents": 85,
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.mailer.sent().len(), 1);

    h.db.close().await.unwrap();
}

#[tokio::test]
async fn failed_payment_reopens_the_session_for_a_second_attempt() {
    let h = harness().await;
    let (event_id, tickets) = h
        .seed_event("Harbor Nights", &[("Standard", 2500, 10)])
        .await
        .unwrap();
    let app = router(&h);

    let submission = submit(&app, event_id, tickets[0], "ada@example.com", "+301").await;
    let token = submission["session_token"].as_str().unwrap().to_string();
    let first_invoice = checkout_card(&app, &token).await;

    let response = app
        .clone()
        .oneshot(signed_webhook(json!({
            "invoice_id": first_invoice,
            "event_type": "failed",
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Same token, fresh invoice, and this one settles.
    let second_invoice = checkout_card(&app, &token).await;
    assert_ne!(first_invoice, second_invoice);

    let response = app
        .oneshot(signed_webhook(json!({
            "invoice_id": second_invoice,
            "event_type": "completed",
            "paid_amount_cents": 5000,
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.mailer.wait_for(1).await.len(), 1);

    h.db.close().await.unwrap();
}

#[tokio::test]
async fn callback_and_webhook_agree_on_a_single_confirmation() {
    let h = harness().await;
    let (event_id, tickets) = h
        .seed_event("Harbor Nights", &[("Standard", 2500, 10)])
        .await
        .unwrap();
    let app = router(&h);

    let submission = submit(&app, event_id, tickets[0], "ada@example.com", "+301").await;
    let token = submission["session_token"].as_str().unwrap();
    let invoice_id = checkout_card(&app, token).await;

    // The browser comes back first and the gateway confirms on query.
    h.gateway.set_status(InvoiceStatus {
        invoice_id: invoice_id.clone(),
        state: InvoiceState::Completed,
        paid_amount_cents: Some(5000),
        fee_cents: None,
    });
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/payment/callback?invoice_id={invoice_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get("location").unwrap(),
        h.config.server.success_path.as_str()
    );

    // The webhook lands afterwards; the ledger blocks a second apply.
    let response = app
        .oneshot(signed_webhook(json!({
            "invoice_id": invoice_id,
            "event_type": "completed",
            "paid_amount_cents": 5000,
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.mailer.sent().len(), 1);

    h.db.close().await.unwrap();
}

#[tokio::test]
async fn crypto_journey_through_the_admin_confirmation() {
    let h = harness().await;
    let (event_id, tickets) = h
        .seed_event("Harbor Nights", &[("Standard", 2500, 10)])
        .await
        .unwrap();
    let app = router(&h);

    let submission = submit(&app, event_id, tickets[0], "ada@example.com", "+301").await;
    let token = submission["session_token"].as_str().unwrap();
    let reg_id = submission["registration_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/registrations/{token}/checkout/crypto"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The session is gone, but the registration survives for the
    // operator to settle.
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/registrations/{token}/checkout/card"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let confirm = |reference: &str| {
        Request::post(format!("/admin/registrations/{reg_id}/confirm-crypto"))
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
            .body(Body::from(
                json!({"amount_cents": 5000, "reference": reference}).to_string(),
            ))
            .unwrap()
    };

    let response = app.clone().oneshot(confirm("bank-xfer-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.mailer.wait_for(1).await.len(), 1);

    // A second confirmation of the same transfer is a conflict, not a
    // second ticket.
    let response = app.oneshot(confirm("bank-xfer-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.mailer.sent().len(), 1);

    h.db.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_for_one_identity_yield_one_registration() {
    let h = harness().await;
    let (event_id, tickets) = h
        .seed_event("Harbor Nights", &[("Standard", 2500, 50)])
        .await
        .unwrap();
    let app = router(&h);

    let ticket_id = tickets[0];
    let mut handles = Vec::new();
    for _ in 0..5 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            app.oneshot(post_json(
                &format!("/events/{event_id}/registrations"),
                json!({
                    "name": "Ada Wexler",
                    "email": "ada@example.com",
                    "phone": "+30123456",
                    "tickets": [{"ticket_id": ticket_id, "quantity": 1}],
                }),
            ))
            .await
            .unwrap()
            .status()
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 4);

    h.db.close().await.unwrap();
}

#[tokio::test]
async fn free_registrations_confirm_without_a_payment_leg() {
    let h = harness().await;
    let (event_id, tickets) = h
        .seed_event("Community Day", &[("Free Entry", 0, 100)])
        .await
        .unwrap();
    let app = router(&h);

    let response = app
        .oneshot(post_json(
            &format!("/events/{event_id}/registrations"),
            json!({
                "name": "Ada Wexler",
                "email": "ada@example.com",
                "phone": "+301",
                "tickets": [{"ticket_id": tickets[0], "quantity": 1}],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["free"], true);
    assert!(body["session_token"].is_null());
    assert_eq!(h.mailer.wait_for(1).await.len(), 1);

    h.db.close().await.unwrap();
}
