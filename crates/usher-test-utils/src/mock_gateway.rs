// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock payment gateway with scripted responses.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use usher_core::error::UsherError;
use usher_core::traits::{
    GatewayLimits, Invoice, InvoiceRequest, InvoiceState, InvoiceStatus, PaymentGateway,
    SignatureVerdict,
};

/// The one signature header [`MockGateway::verify_webhook`] accepts.
pub const ACCEPTED_SIGNATURE: &str = "t=0,v1=mock-accepted";

/// A [`PaymentGateway`] that serves queued responses and records what was
/// asked of it.
///
/// `create_invoice` pops the response queue; with the queue empty it
/// falls back to a generated `mock-inv-{n}` invoice so most tests never
/// script anything. Status lookups read a map the test populates; unknown
/// invoices report pending, the same answer a real gateway gives for an
/// invoice nobody has paid.
pub struct MockGateway {
    invoice_responses: Mutex<VecDeque<Result<Invoice, UsherError>>>,
    statuses: Mutex<HashMap<String, InvoiceStatus>>,
    limits: Mutex<GatewayLimits>,
    requests: Mutex<Vec<InvoiceRequest>>,
    counter: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            invoice_responses: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            limits: Mutex::new(GatewayLimits {
                min_amount_cents: 100,
                max_amount_cents: 1_000_000,
                currencies: vec!["EUR".into(), "USD".into()],
            }),
            requests: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Queue the next `create_invoice` response.
    pub fn queue_invoice(&self, invoice: Invoice) {
        self.invoice_responses.lock().unwrap().push_back(Ok(invoice));
    }

    /// Queue a `create_invoice` failure.
    pub fn queue_invoice_error(&self, error: UsherError) {
        self.invoice_responses.lock().unwrap().push_back(Err(error));
    }

    /// Set the status served for an invoice id.
    pub fn set_status(&self, status: InvoiceStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(status.invoice_id.clone(), status);
    }

    /// Replace the advertised amount limits.
    pub fn set_limits(&self, limits: GatewayLimits) {
        *self.limits.lock().unwrap() = limits;
    }

    /// Every `InvoiceRequest` this mock has received, in order.
    pub fn created_requests(&self) -> Vec<InvoiceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, UsherError> {
        self.requests.lock().unwrap().push(request);
        if let Some(scripted) = self.invoice_responses.lock().unwrap().pop_front() {
            return scripted;
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(Invoice {
            invoice_id: format!("mock-inv-{n}"),
            checkout_url: format!("https://pay.mock.example/checkout/mock-inv-{n}"),
        })
    }

    async fn invoice_status(&self, invoice_id: &str) -> Result<InvoiceStatus, UsherError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(invoice_id)
            .cloned()
            .unwrap_or(InvoiceStatus {
                invoice_id: invoice_id.to_string(),
                state: InvoiceState::Pending,
                paid_amount_cents: None,
                fee_cents: None,
            }))
    }

    fn verify_webhook(&self, _body: &[u8], signature_header: &str) -> SignatureVerdict {
        if signature_header == ACCEPTED_SIGNATURE {
            SignatureVerdict::Verified
        } else {
            SignatureVerdict::Unverified {
                reason: "signature does not match the mock secret".into(),
            }
        }
    }

    async fn limits(&self) -> Result<GatewayLimits, UsherError> {
        Ok(self.limits.lock().unwrap().clone())
    }
}
