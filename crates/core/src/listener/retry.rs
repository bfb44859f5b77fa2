//! Bounded fixed-delay reconnection shared by resumable sources

use log::{debug, error, info, warn};
use rg_bar_types::RetryPolicy;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs connection attempts under a [`RetryPolicy`]
///
/// Every attempt that follows a failure (a failed attempt or a dropped
/// connection) waits the policy delay first and counts as a reconnection.
pub struct Retry {
    policy: RetryPolicy,
    reconnects: Arc<AtomicU64>,
}

impl Retry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_counter(policy, Arc::new(AtomicU64::new(0)))
    }

    /// Share the reconnection counter with an observer
    pub fn with_counter(policy: RetryPolicy, reconnects: Arc<AtomicU64>) -> Self {
        Self { policy, reconnects }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Total reconnections performed so far
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Attempt to connect until success, exhaustion or cancellation
    ///
    /// `after_failure` is set when the previous connection just dropped, so
    /// even the first attempt of this cycle is delayed. Returns `None` when
    /// the cycle gave up or was cancelled.
    pub async fn connect<T, E, F, Fut>(
        &self,
        token: &CancellationToken,
        target: &str,
        after_failure: bool,
        mut attempt: F,
    ) -> Option<T>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let delay = self.policy.delay();
        let mut made = 0u32;

        loop {
            if made >= max_attempts {
                error!(
                    "Giving up on {} after {} failed attempt(s)",
                    target, made
                );
                return None;
            }

            if after_failure || made > 0 {
                debug!("Reconnecting to {} in {:?}", target, delay);
                tokio::select! {
                    _ = token.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
                self.reconnects.fetch_add(1, Ordering::SeqCst);
            }

            if token.is_cancelled() {
                return None;
            }

            made += 1;
            match attempt().await {
                Ok(value) => {
                    info!("Connected to {} (attempt {}/{})", target, made, max_attempts);
                    return Some(value);
                }
                Err(e) => {
                    warn!(
                        "Connection attempt {}/{} to {} failed: {}",
                        made, max_attempts, target, e
                    );
                }
            }
        }
    }
}
