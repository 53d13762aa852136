// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface for the Usher registration platform.
//!
//! Routes: attendee submission and checkout, the gateway webhook and
//! browser callback, the bearer-guarded admin mutations, and `/health`.
//! Handlers are stateless; every response carries `x-correlation-id`.

pub mod auth;
pub mod correlation;
pub mod handlers;
pub mod server;

pub use auth::AdminAuth;
pub use server::{build_router, start_server, GatewayState};
