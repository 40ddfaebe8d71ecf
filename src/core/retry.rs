//! Fixed-delay retry policy shared by the capture supervisor and the
//! delivery loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy: wait `delay` between attempts, forever unless bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay between attempts in milliseconds
    pub delay_ms: u64,

    /// Maximum number of attempts including the first (None = unbounded)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever with a fixed delay
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
            max_attempts: None,
        }
    }

    /// Stop after `max_attempts` attempts
    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
            max_attempts: Some(max_attempts),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Check if another attempt is allowed after `attempt` (1-indexed) attempts
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none()
    }
}
