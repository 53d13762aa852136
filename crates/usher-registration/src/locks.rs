// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity locks covering the window between duplicate check and
//! registration insert.
//!
//! A lock is a best-effort fast path: it gives concurrent submitters a
//! clean "being processed" answer instead of a constraint error. The
//! unique index on active registrations remains the authoritative
//! backstop; losing the lock race is never a correctness problem.

use usher_core::error::UsherError;
use usher_storage::queries::locks as lock_rows;
use usher_storage::Database;

/// Why a lock could not be taken.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("a registration for this contact is currently being processed; please wait a moment")]
    Held,
    #[error(transparent)]
    Storage(#[from] UsherError),
}

/// Proof of a held lock. Carries the identity so failure paths can
/// release exactly what they acquired.
#[derive(Debug, Clone)]
pub struct LockToken {
    pub event_id: i64,
    pub email: String,
    pub phone: String,
}

/// Sweeps stale rows for this identity, then takes the lock.
///
/// Call only after a clean duplicate check; the insert races are settled
/// by the unique index underneath.
pub async fn acquire(
    db: &Database,
    event_id: i64,
    email: &str,
    phone: &str,
    ttl_minutes: u32,
) -> Result<LockToken, LockError> {
    if lock_rows::acquire(db, event_id, email, phone, ttl_minutes).await? {
        Ok(LockToken {
            event_id,
            email: email.to_string(),
            phone: phone.to_string(),
        })
    } else {
        Err(LockError::Held)
    }
}

/// Releases a held lock. Returns the rows removed; zero is normal when
/// the submission transaction already cleared it.
pub async fn release(db: &Database, token: &LockToken) -> Result<usize, UsherError> {
    lock_rows::release(db, token.event_id, &token.email, &token.phone).await
}

/// True when a live lock covers the email or phone for this event.
pub async fn is_locked(
    db: &Database,
    event_id: i64,
    email: &str,
    phone: &str,
) -> Result<bool, UsherError> {
    lock_rows::is_locked(db, event_id, email, phone).await
}

/// Removes every expired lock. Run at startup and by the sweep command.
pub async fn sweep_expired(db: &Database) -> Result<usize, UsherError> {
    lock_rows::sweep_expired(db).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn second_acquire_reports_held() {
        let (db, _dir) = setup_db().await;

        let token = acquire(&db, 1, "a@example.com", "+301", 30).await.unwrap();
        assert!(matches!(
            acquire(&db, 1, "a@example.com", "+301", 30).await,
            Err(LockError::Held)
        ));

        assert_eq!(release(&db, &token).await.unwrap(), 1);
        acquire(&db, 1, "a@example.com", "+301", 30).await.unwrap();

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn locks_are_scoped_to_the_event() {
        let (db, _dir) = setup_db().await;

        acquire(&db, 1, "a@example.com", "+301", 30).await.unwrap();
        acquire(&db, 2, "a@example.com", "+301", 30).await.unwrap();
        assert!(is_locked(&db, 1, "a@example.com", "+301").await.unwrap());
        assert!(!is_locked(&db, 3, "a@example.com", "+301").await.unwrap());

        db.close().await.unwrap();
    }
}
