// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_gauge};

/// Register all Usher metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "usher_webhooks_total",
        "Webhook deliveries by processing outcome"
    );
    describe_counter!(
        "usher_webhook_errors_total",
        "Rejected webhook deliveries by error type"
    );
    describe_counter!("usher_invoices_created_total", "Hosted invoices opened");
    describe_counter!(
        "usher_registrations_total",
        "Registration submissions by outcome"
    );
    describe_counter!(
        "usher_notifications_total",
        "Notification mails handed to the mailer"
    );
    describe_gauge!(
        "usher_webhook_failures_this_hour",
        "Failed webhook deliveries in the current hour bucket"
    );
}

/// Record one processed webhook delivery.
pub fn record_webhook(outcome: &str) {
    metrics::counter!("usher_webhooks_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a rejected webhook by wire error type.
pub fn record_webhook_error(error_type: &str) {
    metrics::counter!("usher_webhook_errors_total", "type" => error_type.to_string())
        .increment(1);
}

/// Record a freshly opened invoice.
pub fn record_invoice_created(method: &str) {
    metrics::counter!("usher_invoices_created_total", "method" => method.to_string())
        .increment(1);
}

/// Record a notification handed to the mailer.
pub fn record_notification(kind: &str) {
    metrics::counter!("usher_notifications_total", "kind" => kind.to_string()).increment(1);
}

/// Record a registration submission outcome.
pub fn record_registration(outcome: &str) {
    metrics::counter!("usher_registrations_total", "outcome" => outcome.to_string())
        .increment(1);
}

/// Track the failure watchdog's current-hour count.
pub fn set_hourly_failures(count: f64) {
    metrics::gauge!("usher_webhook_failures_this_hour").set(count);
}
