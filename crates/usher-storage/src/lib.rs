// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Usher registration service.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed query modules for
//! registrations, payment sessions, the transaction ledger, duplicate locks,
//! and webhook idempotency keys.
//!
//! Multi-statement invariants (inventory decrement plus registration insert,
//! webhook outcome application) always run inside one `call` closure as a
//! single SQLite transaction; partial states are never visible.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
