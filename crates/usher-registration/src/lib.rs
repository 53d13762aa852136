// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registration intake for the Usher registration platform.
//!
//! Three layers guard every new registration: the duplicate detector
//! (read-path checks against live registrations and locks), the identity
//! lock manager (best-effort fast path for concurrent submitters), and
//! the lifecycle service that runs the submission pipeline and the
//! transitions out of pending. The unique index on active registrations
//! is the authoritative duplicate backstop underneath all three.

pub mod dedup;
pub mod locks;
pub mod service;

pub use dedup::DuplicateReason;
pub use locks::{LockError, LockToken};
pub use service::{
    price_selection, PricingError, RegistrationService, RequestedLine, SubmitOutcome,
    SubmitRequest,
};
