//! Fixed-interval tick listener

use super::{EventListener, ListenerCallback, ListenerCore};
use crate::error::ListenerError;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Ticks every `interval`, starting one interval after `start`
pub struct TimerListener {
    core: ListenerCore,
    interval: Duration,
    handler: Arc<dyn Fn() + Send + Sync>,
}

impl TimerListener {
    pub fn new(name: &str, interval: Duration, handler: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            core: ListenerCore::new(name),
            interval: interval.max(Duration::from_millis(1)),
            handler,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl EventListener for TimerListener {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn start(&self, callback: ListenerCallback) -> Result<(), ListenerError> {
        let name = self.core.name().to_string();
        let period = self.interval;
        let handler = Arc::clone(&self.handler);

        self.core.spawn(|token| async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!("Timer listener {} ticking every {:?}", name, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {
                        handler();
                        callback().await;
                    }
                }
            }
            debug!("Timer listener {} stopped", name);
        })
    }

    fn stop(&self) {
        self.core.stop();
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }
}
