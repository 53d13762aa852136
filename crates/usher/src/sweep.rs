// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `usher sweep` command implementation.
//!
//! One-shot expiry sweeps for cron-style deployments that prefer an
//! external scheduler over the in-process loop. Works straight on the
//! storage queries, so it needs no gateway credentials or session key.

use usher_config::model::UsherConfig;
use usher_core::error::UsherError;
use usher_storage::queries::{idempotency, locks, registrations, sessions};
use usher_storage::Database;

/// Runs the `usher sweep` command.
pub async fn run_sweep(config: UsherConfig) -> Result<(), UsherError> {
    let db = Database::open_with(&config.storage).await?;

    let grace = config
        .registration
        .pending_grace_minutes
        .min(u64::from(u32::MAX)) as u32;
    let expired = registrations::expire_stale(&db, grace).await?;
    let purged = sessions::purge_expired(&db).await?;
    let locks = locks::sweep_expired(&db).await?;
    let keys = idempotency::sweep_expired(&db).await?;

    println!("expired registrations: {expired}");
    println!("purged sessions:       {purged}");
    println!("released locks:        {locks}");
    println!("dropped webhook keys:  {keys}");

    db.close().await?;
    Ok(())
}
