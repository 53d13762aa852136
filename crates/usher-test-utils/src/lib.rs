// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Usher integration tests.
//!
//! Provides mock adapters and harness infrastructure for fast,
//! deterministic, CI-runnable tests without a payment gateway or an SMTP
//! relay.
//!
//! # Components
//!
//! - [`MockGateway`] - scripted payment gateway with request capture
//! - [`MockMailer`] - mailer that records notifications
//! - [`TestHarness`] - the full stack over a temp SQLite database

pub mod harness;
pub mod mock_gateway;
pub mod mock_mailer;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_gateway::{MockGateway, ACCEPTED_SIGNATURE};
pub use mock_mailer::MockMailer;
