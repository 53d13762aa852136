// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplicate detector consulted before any new registration proceeds.
//!
//! Checks run in a fixed order and short-circuit on the first hit:
//! expired-lock sweep, live registration by email, live registration by
//! phone, then active locks. Callers treat a storage error as a
//! rejection; a duplicate is never let through on error.

use chrono::{Duration, Utc};
use usher_core::error::UsherError;
use usher_core::types::{Registration, RegistrationStatus};
use usher_storage::queries::{locks as lock_rows, registrations};
use usher_storage::Database;

/// What blocked a submission, with a user-facing message per case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    /// A confirmed registration already holds this contact.
    AlreadyRegistered,
    /// A pending registration exists but is old enough that its payment
    /// window has likely lapsed.
    PendingMaybeExpired,
    /// A pending registration exists and is still inside its window.
    PendingInProgress,
    /// A concurrent submission holds the identity lock right now.
    CurrentlyProcessing,
}

impl DuplicateReason {
    /// Message shown to the attendee. Says what to do next, not what
    /// the system found.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered => {
                "this contact is already registered for this event"
            }
            Self::PendingMaybeExpired => {
                "a previous registration for this contact may have expired; \
                 please contact support before trying again"
            }
            Self::PendingInProgress => {
                "a registration for this contact is already in progress; \
                 check your email or try again in a few minutes"
            }
            Self::CurrentlyProcessing => {
                "a registration for this contact is currently being processed; \
                 please wait a moment"
            }
        }
    }
}

/// Runs the duplicate checks for one identity against one event.
///
/// Sweeps expired locks first so a crashed submission from last week
/// cannot block anyone. Returns `None` when the identity is clear.
pub async fn check(
    db: &Database,
    event_id: i64,
    email: &str,
    phone: &str,
    pending_grace_minutes: u32,
) -> Result<Option<DuplicateReason>, UsherError> {
    lock_rows::sweep_expired(db).await?;

    if let Some(reg) = registrations::find_active_by_email(db, event_id, email).await? {
        return Ok(Some(classify(&reg, pending_grace_minutes)));
    }
    if let Some(reg) = registrations::find_active_by_phone(db, event_id, phone).await? {
        return Ok(Some(classify(&reg, pending_grace_minutes)));
    }
    if lock_rows::is_locked(db, event_id, email, phone).await? {
        return Ok(Some(DuplicateReason::CurrentlyProcessing));
    }
    Ok(None)
}

fn classify(reg: &Registration, grace_minutes: u32) -> DuplicateReason {
    if reg.status == RegistrationStatus::Confirmed {
        return DuplicateReason::AlreadyRegistered;
    }
    let age = Utc::now().signed_duration_since(reg.created_at);
    if age > Duration::minutes(i64::from(grace_minutes)) {
        DuplicateReason::PendingMaybeExpired
    } else {
        DuplicateReason::PendingInProgress
    }
}
