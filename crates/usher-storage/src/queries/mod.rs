// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the storage entities.
//!
//! Each function takes `&Database`, runs its statements inside a single
//! `call` closure on the writer thread, and maps transport errors through
//! `database::map_tr_err`.

pub mod idempotency;
pub mod inventory;
pub mod locks;
pub mod outcomes;
pub mod registrations;
pub mod sessions;
pub mod transactions;
