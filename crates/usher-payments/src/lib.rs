// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment rail for the Usher registration platform.
//!
//! This crate owns everything between "attendee clicked pay" and "the
//! ledger knows what happened": the hosted-invoice gateway client, the
//! transaction ledger with its monotonic status rules, and the webhook
//! reconciler that folds at-least-once gateway deliveries, browser
//! callbacks, and manual admin confirmations into a single guarded
//! apply. A failure-rate watchdog and the payment metrics live here too.

pub mod alerts;
pub mod client;
pub mod errors;
pub mod ledger;
pub mod metrics;
pub mod reconciler;

pub use alerts::FailureWindow;
pub use client::HttpPaymentGateway;
pub use errors::WebhookErrorKind;
pub use ledger::TransactionLedger;
pub use reconciler::{WebhookOutcome, WebhookReconciler};
