//! Reconnection policy for resumable event sources

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    2000
}

/// Bounded retry with a fixed delay between attempts
///
/// `max_attempts` counts every connection attempt, the first one included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Single attempt, never retry
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}
