// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Usher registration service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Usher configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values; secrets
/// (gateway credentials, session key) have no defaults and must be supplied.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UsherConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Registration dedup and lock settings.
    #[serde(default)]
    pub registration: RegistrationConfig,

    /// Payment session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Card payment gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Webhook idempotency and alerting settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Outbound mail settings.
    #[serde(default)]
    pub mailer: MailerConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the server to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, used to build gateway callback and
    /// webhook URLs and retry links in mail. No trailing slash.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Bearer token protecting `/admin` routes. `None` disables admin routes.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Address for the Prometheus metrics exporter. `None` disables it.
    #[serde(default)]
    pub metrics_bind: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Browser redirect path after a completed payment.
    #[serde(default = "default_success_path")]
    pub success_path: String,

    /// Browser redirect path while a payment is still settling.
    #[serde(default = "default_pending_path")]
    pub pending_path: String,

    /// Browser redirect path after a failed or expired payment.
    #[serde(default = "default_failure_path")]
    pub failure_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            public_base_url: default_public_base_url(),
            admin_token: None,
            metrics_bind: None,
            log_level: default_log_level(),
            success_path: default_success_path(),
            pending_path: default_pending_path(),
            failure_path: default_failure_path(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8580
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8580".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_success_path() -> String {
    "/payment/success".to_string()
}

fn default_pending_path() -> String {
    "/payment/pending".to_string()
}

fn default_failure_path() -> String {
    "/payment/failure".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("usher").join("usher.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("usher.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Registration dedup and lock configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrationConfig {
    /// Lifetime of a registration lock in minutes. Locks are a crash safety
    /// net; the happy path releases them within one request.
    #[serde(default = "default_lock_ttl_minutes")]
    pub lock_ttl_minutes: u64,

    /// Age in minutes past which a pending registration is reported to the
    /// attendee as possibly expired rather than in progress.
    #[serde(default = "default_pending_grace_minutes")]
    pub pending_grace_minutes: u64,

    /// Return declined registrations' tickets to availability.
    #[serde(default)]
    pub restock_on_decline: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            lock_ttl_minutes: default_lock_ttl_minutes(),
            pending_grace_minutes: default_pending_grace_minutes(),
            restock_on_decline: false,
        }
    }
}

fn default_lock_ttl_minutes() -> u64 {
    30
}

fn default_pending_grace_minutes() -> u64 {
    30
}

/// Payment session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Base session lifetime in minutes.
    #[serde(default = "default_session_ttl_minutes")]
    pub ttl_minutes: u64,

    /// Extended lifetime in minutes once a card payment is in flight.
    /// Covers 3-D Secure round trips and slow bank pages.
    #[serde(default = "default_card_ttl_minutes")]
    pub card_ttl_minutes: u64,

    /// Hex-encoded 32-byte AES-256-GCM key sealing attendee fields at rest.
    /// Required to serve; `None` only passes `config check`.
    #[serde(default)]
    pub encryption_key: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_session_ttl_minutes(),
            card_ttl_minutes: default_card_ttl_minutes(),
            encryption_key: None,
        }
    }
}

fn default_session_ttl_minutes() -> u64 {
    30
}

fn default_card_ttl_minutes() -> u64 {
    120
}

/// Card payment gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway API key. `None` requires environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Shared secret for webhook HMAC signatures.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Override for the gateway API base URL. `None` uses the production URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// ISO 4217 currency all tickets are priced in.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,

    /// Accepted clock skew for webhook signature timestamps, in seconds.
    #[serde(default = "default_signature_tolerance_secs")]
    pub signature_tolerance_secs: u64,

    /// How long queried gateway limits stay cached, in seconds.
    #[serde(default = "default_limits_cache_secs")]
    pub limits_cache_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            webhook_secret: None,
            base_url: None,
            currency: default_currency(),
            timeout_secs: default_gateway_timeout_secs(),
            signature_tolerance_secs: default_signature_tolerance_secs(),
            limits_cache_secs: default_limits_cache_secs(),
        }
    }
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

fn default_signature_tolerance_secs() -> u64 {
    300
}

fn default_limits_cache_secs() -> u64 {
    300
}

/// Webhook idempotency and alerting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Suppression window in minutes for identical payloads and for
    /// (invoice, event-type) pairs.
    #[serde(default = "default_payload_window_minutes")]
    pub payload_window_minutes: u64,

    /// Suppression window in minutes for (order, event-type) pairs. Narrower
    /// than the payload window: one order legitimately emits a pending and a
    /// completed event minutes apart.
    #[serde(default = "default_order_window_minutes")]
    pub order_window_minutes: u64,

    /// Processing failures per hour that trigger an operator alert.
    #[serde(default = "default_failure_alert_threshold")]
    pub failure_alert_threshold: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            payload_window_minutes: default_payload_window_minutes(),
            order_window_minutes: default_order_window_minutes(),
            failure_alert_threshold: default_failure_alert_threshold(),
        }
    }
}

fn default_payload_window_minutes() -> u64 {
    10
}

fn default_order_window_minutes() -> u64 {
    2
}

fn default_failure_alert_threshold() -> u64 {
    10
}

/// Outbound mail configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MailerConfig {
    /// Enable outbound mail. When false, notifications are logged and dropped.
    #[serde(default)]
    pub enabled: bool,

    /// SMTP relay hostname.
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    /// SMTP relay port (STARTTLS).
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP username. `None` sends unauthenticated.
    #[serde(default)]
    pub username: Option<String>,

    /// SMTP password.
    #[serde(default)]
    pub password: Option<String>,

    /// From address on attendee notifications.
    #[serde(default = "default_mail_from")]
    pub from: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from: default_mail_from(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from() -> String {
    "tickets@localhost".to_string()
}
