// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sealed payment sessions for the Usher registration platform.
//!
//! Attendee contact details are sealed with AES-256-GCM before they are
//! persisted; the bearer token handed to the browser is the only way to
//! reach them. The store validates tokens against expiry and event
//! binding, and purges any session that fails validation so rejected
//! tokens cannot be replayed.

pub mod crypto;
pub mod store;

pub use store::{SessionError, SessionStore};
