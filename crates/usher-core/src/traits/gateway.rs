// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment gateway trait for card-invoice providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::UsherError;

/// Request to open a hosted-checkout invoice.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRequest {
    /// Amount in minor units.
    pub amount_cents: i64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Merchant-side order reference, echoed back in webhooks.
    pub order_id: String,
    /// Human-readable line shown on the hosted checkout page.
    pub description: String,
    /// Browser return URL after the hosted flow finishes.
    pub callback_url: String,
    /// Server-to-server notification URL.
    pub webhook_url: String,
}

/// A freshly created invoice.
#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub invoice_id: String,
    /// Hosted checkout page the browser is redirected to.
    pub checkout_url: String,
}

/// Gateway-side lifecycle state of an invoice.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Pending,
    Completed,
    Failed,
    Expired,
}

impl InvoiceState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Authoritative invoice status as reported by the gateway query API.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceStatus {
    pub invoice_id: String,
    pub state: InvoiceState,
    /// Amount actually captured, when the gateway reports one.
    pub paid_amount_cents: Option<i64>,
    pub fee_cents: Option<i64>,
}

/// Amount bounds and currencies the gateway accepts.
///
/// Queried, never hardcoded; providers change these without notice.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayLimits {
    pub min_amount_cents: i64,
    pub max_amount_cents: i64,
    pub currencies: Vec<String>,
}

impl GatewayLimits {
    /// Whether an amount/currency pair can be invoiced at all.
    pub fn allows(&self, amount_cents: i64, currency: &str) -> bool {
        amount_cents >= self.min_amount_cents
            && amount_cents <= self.max_amount_cents
            && self.currencies.iter().any(|c| c.eq_ignore_ascii_case(currency))
    }
}

/// Outcome of webhook signature verification.
///
/// Verification never errors out of the adapter: any internal failure is an
/// `Unverified` verdict, and unverified payloads never mutate state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureVerdict {
    Verified,
    Unverified { reason: String },
}

impl SignatureVerdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Adapter for the remote card-payment gateway.
///
/// The core never sees provider SDK types; everything crosses this boundary
/// as the request/response structs above.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short provider tag recorded on ledger rows, e.g. `"cardlink"`.
    fn provider(&self) -> &str;

    /// Opens a hosted-checkout invoice.
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, UsherError>;

    /// Queries the authoritative status of an invoice.
    async fn invoice_status(&self, invoice_id: &str) -> Result<InvoiceStatus, UsherError>;

    /// Verifies a webhook signature header against the raw request body.
    fn verify_webhook(&self, body: &[u8], signature_header: &str) -> SignatureVerdict;

    /// Current amount bounds and supported currencies.
    async fn limits(&self) -> Result<GatewayLimits, UsherError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> GatewayLimits {
        GatewayLimits {
            min_amount_cents: 100,
            max_amount_cents: 500_000,
            currencies: vec!["EUR".into(), "USD".into()],
        }
    }

    #[test]
    fn limits_reject_out_of_bounds_amounts() {
        let l = limits();
        assert!(l.allows(100, "EUR"));
        assert!(l.allows(500_000, "usd"));
        assert!(!l.allows(99, "EUR"));
        assert!(!l.allows(500_001, "EUR"));
        assert!(!l.allows(1000, "GBP"));
    }

    #[test]
    fn invoice_state_parses_gateway_strings() {
        use std::str::FromStr;
        assert_eq!(InvoiceState::from_str("completed").unwrap(), InvoiceState::Completed);
        assert!(!InvoiceState::Pending.is_terminal());
        assert!(InvoiceState::Expired.is_terminal());
    }

    #[test]
    fn invoice_status_deserializes_from_gateway_json() {
        let status: InvoiceStatus = serde_json::from_str(
            r#"{"invoice_id":"inv_1","state":"completed","paid_amount_cents":2500,"fee_cents":87}"#,
        )
        .unwrap();
        assert_eq!(status.state, InvoiceState::Completed);
        assert_eq!(status.paid_amount_cents, Some(2500));
    }
}
