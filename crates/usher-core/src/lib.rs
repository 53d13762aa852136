// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Usher event-registration service.
//!
//! This crate provides the shared error type, domain types with their
//! legal-transition tables, and the collaborator traits (payment gateway,
//! mailer) the rest of the workspace builds on.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::UsherError;
pub use types::{
    Attendee, PaymentMethod, PaymentSession, PaymentStatus, PaymentTransaction, Registration,
    RegistrationId, RegistrationStatus, SessionToken, TicketSelection, TransactionStatus,
};

pub use traits::{
    GatewayLimits, Invoice, InvoiceRequest, InvoiceState, InvoiceStatus, Mailer, Notification,
    PaymentGateway, SignatureVerdict,
};
