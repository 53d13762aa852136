// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock mailer that records every notification.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use usher_core::error::UsherError;
use usher_core::traits::{Mailer, Notification};

/// A [`Mailer`] that captures notifications for assertions.
///
/// Senders spawn mail fire-and-forget, so tests generally go through
/// [`MockMailer::wait_for`] rather than asserting on `sent()` right away.
pub struct MockMailer {
    sent: Mutex<Vec<Notification>>,
    fail: Mutex<bool>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
        }
    }

    /// Make subsequent sends fail, for exercising the fire-and-forget
    /// error path.
    pub fn fail_sends(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `count` notifications have arrived, or panic
    /// after two seconds.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("expected {count} notifications, saw {}", sent.len());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for MockMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, notification: Notification) -> Result<(), UsherError> {
        if *self.fail.lock().unwrap() {
            return Err(UsherError::Mailer {
                message: "scripted send failure".into(),
                source: None,
            });
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}
