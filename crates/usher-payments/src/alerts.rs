// SPDX-FileCopyrightText: 2026 Usher Contributors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hourly failure-rate watchdog for webhook processing.
//!
//! Every rejected or failed-to-apply webhook lands in the current hour's
//! bucket; crossing the configured threshold logs one operator alert for
//! that hour. Unsigned junk probing the endpoint counts too, which is the
//! point: a surge of bad signatures is exactly what a key rotation gone
//! wrong looks like.

use dashmap::DashMap;
use tracing::warn;

pub struct FailureWindow {
    buckets: DashMap<i64, u64>,
    threshold: u64,
}

impl FailureWindow {
    pub fn new(threshold: u64) -> Self {
        Self {
            buckets: DashMap::new(),
            // A zero threshold would alert on every failure forever.
            threshold: threshold.max(1),
        }
    }

    /// Counts one failure against the current hour. Returns the bucket's
    /// new total; the alert fires exactly when the total reaches the
    /// threshold, so redeliveries past it stay quiet until the next hour.
    pub fn record(&self, error_type: &str) -> u64 {
        let hour = hour_bucket(chrono::Utc::now().timestamp());
        let count = {
            let mut entry = self.buckets.entry(hour).or_insert(0);
            *entry += 1;
            *entry
        };
        if count == self.threshold {
            warn!(
                failures = count,
                last_error_type = error_type,
                "webhook failures this hour reached the alert threshold"
            );
        }
        // Keep the current and previous hour; older buckets are dead weight.
        if self.buckets.len() > 2 {
            self.buckets.retain(|h, _| *h >= hour - 1);
        }
        count
    }

    /// Failures counted in the current hour.
    pub fn current(&self) -> u64 {
        let hour = hour_bucket(chrono::Utc::now().timestamp());
        self.buckets.get(&hour).map(|c| *c).unwrap_or(0)
    }
}

fn hour_bucket(unix_secs: i64) -> i64 {
    unix_secs.div_euclid(3600)
}
