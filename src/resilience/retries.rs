//! Bounded fixed-delay retry.
//!
//! # Responsibilities
//! - Re-run a lookup that can lose a race with another code path
//! - Bound both the wait between attempts and the number of attempts
//!
//! # Design Decisions
//! - Fixed spacing, no exponential growth and no jitter
//! - The wait is an async sleep, so other connections keep running

use std::time::Duration;

/// How often, and how far apart, a failed lookup is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Run `attempt` until it yields a value or the retries are used up.
    pub async fn run<T, F>(&self, mut attempt: F) -> Option<T>
    where
        F: FnMut(u32) -> Option<T>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            if let Some(value) = attempt(attempts) {
                return Some(value);
            }
            if attempts >= self.max_attempts() {
                return None;
            }
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}
