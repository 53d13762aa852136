// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed webhook error vocabulary.
//!
//! Every webhook rejection carries exactly one of these kinds, and the
//! HTTP status is a pure function of the kind. The mapping deliberately
//! shapes the gateway's retry behavior: 5xx and 429 make it retry,
//! 4xx makes it give up.

use strum::{Display, EnumString};

/// Why a webhook was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum WebhookErrorKind {
    SignatureInvalid,
    SignatureMissing,
    PayloadInvalid,
    JsonInvalid,
    MissingRequiredFields,
    InvoiceNotFound,
    OrderNotFound,
    DuplicateWebhook,
    RateLimitExceeded,
    ServiceUnavailable,
    DatabaseError,
    Timeout,
    NetworkError,
    Unknown,
}

impl WebhookErrorKind {
    /// Stable wire name, used in the `x-error-type` response header.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignatureInvalid => "signature_invalid",
            Self::SignatureMissing => "signature_missing",
            Self::PayloadInvalid => "payload_invalid",
            Self::JsonInvalid => "json_invalid",
            Self::MissingRequiredFields => "missing_required_fields",
            Self::InvoiceNotFound => "invoice_not_found",
            Self::OrderNotFound => "order_not_found",
            Self::DuplicateWebhook => "duplicate_webhook",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ServiceUnavailable => "service_unavailable",
            Self::DatabaseError => "database_error",
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::Unknown => "unknown",
        }
    }

    /// HTTP status answered for this kind.
    pub fn http_status(self) -> u16 {
        match self {
            Self::SignatureInvalid | Self::SignatureMissing => 401,
            Self::PayloadInvalid | Self::JsonInvalid | Self::MissingRequiredFields => 400,
            Self::InvoiceNotFound | Self::OrderNotFound => 404,
            Self::DuplicateWebhook => 409,
            Self::RateLimitExceeded => 429,
            Self::ServiceUnavailable | Self::DatabaseError => 503,
            Self::Timeout | Self::NetworkError => 502,
            Self::Unknown => 500,
        }
    }

    /// Whether the mapped status invites the gateway to retry.
    pub fn is_retryable(self) -> bool {
        matches!(self.http_status(), 429 | 500..=599)
    }
}
