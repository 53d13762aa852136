// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP adapter for the hosted-checkout card gateway.
//!
//! Provides [`HttpPaymentGateway`], which handles invoice creation,
//! status queries, limits discovery with a short in-process cache, and
//! webhook signature verification. Transient gateway statuses are
//! retried once after a short delay.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use usher_config::model::GatewayConfig;
use usher_core::error::UsherError;
use usher_core::traits::{
    GatewayLimits, Invoice, InvoiceRequest, InvoiceStatus, PaymentGateway, SignatureVerdict,
};

type HmacSha256 = Hmac<Sha256>;

/// Production API base, overridable through config for staging.
const API_BASE_URL: &str = "https://api.cardlink.gr";

/// Card gateway client over reqwest.
///
/// Cheap to share behind an `Arc`; the reqwest client pools connections
/// internally.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    webhook_secret: Vec<u8>,
    signature_tolerance_secs: u64,
    limits_cache_secs: u64,
    limits_cache: Mutex<Option<(Instant, GatewayLimits)>>,
    max_retries: u32,
}

impl HttpPaymentGateway {
    /// Builds the client from the gateway section of the config.
    ///
    /// Requires both the API key and the webhook secret; a server that
    /// cannot verify webhooks must not create invoices.
    pub fn new(config: &GatewayConfig) -> Result<Self, UsherError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| UsherError::Config("gateway api key not configured".into()))?;
        let webhook_secret = config
            .webhook_secret
            .as_deref()
            .ok_or_else(|| UsherError::Config("gateway webhook secret not configured".into()))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| UsherError::Config(format!("invalid gateway api key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert("authorization", auth);
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UsherError::Gateway {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| API_BASE_URL.to_string()),
            webhook_secret: webhook_secret.as_bytes().to_vec(),
            signature_tolerance_secs: config.signature_tolerance_secs,
            limits_cache_secs: config.limits_cache_secs,
            limits_cache: Mutex::new(None),
            max_retries: 1,
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, UsherError> {
        let url = format!("{}{path}", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, path, "retrying gateway request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self.client.get(&url).send().await.map_err(map_transport)?;
            let status = response.status();
            debug!(status = %status, path, attempt, "gateway response received");

            if status.is_success() {
                return response.json::<T>().await.map_err(|e| UsherError::Gateway {
                    message: format!("failed to parse gateway response: {e}"),
                    source: Some(Box::new(e)),
                });
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                let id = path.rsplit('/').next().unwrap_or(path).to_string();
                return Err(UsherError::NotFound { entity: "invoice", id });
            }
            let body = response.text().await.unwrap_or_default();
            let err = UsherError::Gateway {
                message: format!("gateway returned {status}: {body}"),
                source: None,
            };
            if is_transient(status) && attempt < self.max_retries {
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_error.unwrap_or_else(|| UsherError::Gateway {
            message: "gateway request failed after retries".into(),
            source: None,
        }))
    }
}

#[async_trait::async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn provider(&self) -> &str {
        "cardlink"
    }

    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, UsherError> {
        let url = format!("{}/v1/invoices", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying invoice creation after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(map_transport)?;
            let status = response.status();
            debug!(status = %status, order_id = %request.order_id, attempt, "invoice response received");

            if status.is_success() {
                return response
                    .json::<Invoice>()
                    .await
                    .map_err(|e| UsherError::Gateway {
                        message: format!("failed to parse invoice response: {e}"),
                        source: Some(Box::new(e)),
                    });
            }
            let body = response.text().await.unwrap_or_default();
            let err = UsherError::Gateway {
                message: format!("invoice creation returned {status}: {body}"),
                source: None,
            };
            if is_transient(status) && attempt < self.max_retries {
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_error.unwrap_or_else(|| UsherError::Gateway {
            message: "invoice creation failed after retries".into(),
            source: None,
        }))
    }

    async fn invoice_status(&self, invoice_id: &str) -> Result<InvoiceStatus, UsherError> {
        self.get_json(&format!("/v1/invoices/{invoice_id}")).await
    }

    /// Verifies `v1=<hex hmac>` over `"{timestamp}.{body}"` from a
    /// `t=<unix>,v1=<hex>` header. Any defect in the header is an
    /// `Unverified` verdict, never an error; unverified payloads must not
    /// mutate state.
    fn verify_webhook(&self, body: &[u8], signature_header: &str) -> SignatureVerdict {
        let mut timestamp = None;
        let mut signature = None;
        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signature = hex::decode(value).ok(),
                _ => {}
            }
        }
        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            return SignatureVerdict::Unverified {
                reason: "malformed signature header".into(),
            };
        };

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        if (now - timestamp).unsigned_abs() > self.signature_tolerance_secs {
            return SignatureVerdict::Unverified {
                reason: "timestamp outside tolerance".into(),
            };
        }

        // Key length is unrestricted for HMAC; new_from_slice cannot fail.
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.webhook_secret) else {
            return SignatureVerdict::Unverified {
                reason: "verifier initialization failed".into(),
            };
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        match mac.verify_slice(&signature) {
            Ok(()) => SignatureVerdict::Verified,
            Err(_) => SignatureVerdict::Unverified {
                reason: "signature mismatch".into(),
            },
        }
    }

    async fn limits(&self) -> Result<GatewayLimits, UsherError> {
        let mut cache = self.limits_cache.lock().await;
        if let Some((fetched_at, limits)) = cache.as_ref()
            && fetched_at.elapsed() < Duration::from_secs(self.limits_cache_secs)
        {
            return Ok(limits.clone());
        }
        let limits: GatewayLimits = self.get_json("/v1/limits").await?;
        *cache = Some((Instant::now(), limits.clone()));
        Ok(limits)
    }
}

fn map_transport(e: reqwest::Error) -> UsherError {
    let message = if e.is_timeout() {
        format!("gateway request timed out: {e}")
    } else {
        format!("gateway request failed: {e}")
    };
    UsherError::Gateway {
        message,
        source: Some(Box::new(e)),
    }
}

fn is_transient(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "whsec_test";

    fn test_config(base_url: Option<String>) -> GatewayConfig {
        GatewayConfig {
            api_key: Some("sk_test_123".into()),
            webhook_secret: Some(SECRET.into()),
            base_url,
            ..GatewayConfig::default()
        }
    }

    fn test_client(base_url: &str) -> HttpPaymentGateway {
        HttpPaymentGateway::new(&test_config(None))
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn now_unix() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn invoice_request() -> InvoiceRequest {
        InvoiceRequest {
            amount_cents: 5000,
            currency: "EUR".into(),
            order_id: "ord-1".into(),
            description: "Harbor Nights x2".into(),
            callback_url: "https://tickets.example/payment/callback".into(),
            webhook_url: "https://tickets.example/payment/webhook".into(),
        }
    }

    #[test]
    fn new_requires_key_and_secret() {
        let mut config = test_config(None);
        config.api_key = None;
        assert!(matches!(
            HttpPaymentGateway::new(&config),
            Err(UsherError::Config(_))
        ));

        let mut config = test_config(None);
        config.webhook_secret = None;
        assert!(matches!(
            HttpPaymentGateway::new(&config),
            Err(UsherError::Config(_))
        ));
    }

    #[tokio::test]
    async fn create_invoice_sends_bearer_auth_and_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/invoices"))
            .and(header("authorization", "Bearer sk_test_123"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "invoice_id": "inv_42",
                "checkout_url": "https://pay.example/inv_42"
            })))
            .mount(&server)
            .await;

        let invoice = test_client(&server.uri())
            .create_invoice(invoice_request())
            .await
            .unwrap();
        assert_eq!(invoice.invoice_id, "inv_42");
        assert_eq!(invoice.checkout_url, "https://pay.example/inv_42");
    }

    #[tokio::test]
    async fn create_invoice_retries_once_on_transient_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/invoices"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/invoices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "invoice_id": "inv_retry",
                "checkout_url": "https://pay.example/inv_retry"
            })))
            .mount(&server)
            .await;

        let invoice = test_client(&server.uri())
            .create_invoice(invoice_request())
            .await
            .unwrap();
        assert_eq!(invoice.invoice_id, "inv_retry");
    }

    #[tokio::test]
    async fn create_invoice_gives_up_on_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/invoices"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"amount_too_small"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .create_invoice(invoice_request())
            .await
            .unwrap_err();
        let UsherError::Gateway { message, .. } = err else {
            panic!("expected Gateway error");
        };
        assert!(message.contains("amount_too_small"));
    }

    #[tokio::test]
    async fn invoice_status_maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/invoices/inv_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "invoice_id": "inv_1",
                "state": "completed",
                "paid_amount_cents": 5000,
                "fee_cents": 120
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/invoices/inv_missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let status = client.invoice_status("inv_1").await.unwrap();
        assert_eq!(status.paid_amount_cents, Some(5000));
        assert!(matches!(
            client.invoice_status("inv_missing").await,
            Err(UsherError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn limits_are_cached_between_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/limits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "min_amount_cents": 100,
                "max_amount_cents": 1_000_000,
                "currencies": ["EUR"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let first = client.limits().await.unwrap();
        let second = client.limits().await.unwrap();
        assert_eq!(first.min_amount_cents, second.min_amount_cents);
        assert!(second.allows(5000, "EUR"));
        assert!(!second.allows(50, "EUR"));
    }

    #[test]
    fn verify_accepts_a_fresh_signed_payload() {
        let client = test_client("http://unused");
        let body = br#"{"invoice_id":"inv_1","event_type":"completed"}"#;
        let header = sign(SECRET, now_unix(), body);
        assert_eq!(client.verify_webhook(body, &header), SignatureVerdict::Verified);
    }

    #[test]
    fn verify_rejects_tampered_bodies_and_wrong_secrets() {
        let client = test_client("http://unused");
        let body = br#"{"invoice_id":"inv_1","event_type":"completed"}"#;

        let header = sign(SECRET, now_unix(), body);
        let tampered = br#"{"invoice_id":"inv_1","event_type":"failed"}"#;
        assert!(!client.verify_webhook(tampered, &header).is_verified());

        let wrong_secret = sign("whsec_other", now_unix(), body);
        assert!(!client.verify_webhook(body, &wrong_secret).is_verified());
    }

    #[test]
    fn verify_rejects_stale_timestamps_and_malformed_headers() {
        let client = test_client("http://unused");
        let body = b"{}";

        let stale = sign(SECRET, now_unix() - 600, body);
        let SignatureVerdict::Unverified { reason } = client.verify_webhook(body, &stale) else {
            panic!("expected Unverified");
        };
        assert!(reason.contains("timestamp"));

        assert!(!client.verify_webhook(body, "v1=deadbeef").is_verified());
        assert!(!client.verify_webhook(body, "t=abc,v1=zz").is_verified());
        assert!(!client.verify_webhook(body, "").is_verified());
    }
}
