// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! The payment gateway and the mailer are external systems the core only
//! ever touches through these traits; production adapters live in their own
//! crates and tests substitute mocks.

pub mod gateway;
pub mod mailer;

pub use gateway::{
    GatewayLimits, Invoice, InvoiceRequest, InvoiceState, InvoiceStatus, PaymentGateway,
    SignatureVerdict,
};
pub use mailer::{Mailer, Notification};
