//! OS signal listener

use super::{EventListener, ListenerCallback, ListenerCore};
use crate::error::ListenerError;
use log::{debug, trace};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

/// Receives the number of the delivered signal
pub type SignalHandler = Arc<dyn Fn(i32) + Send + Sync>;

/// Fires once per delivery of a single OS signal
pub struct SignalListener {
    core: ListenerCore,
    signum: i32,
    handler: SignalHandler,
}

impl SignalListener {
    pub fn new(name: &str, signum: i32, handler: SignalHandler) -> Self {
        Self {
            core: ListenerCore::new(name),
            signum,
            handler,
        }
    }

    pub fn signum(&self) -> i32 {
        self.signum
    }
}

impl EventListener for SignalListener {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn start(&self, callback: ListenerCallback) -> Result<(), ListenerError> {
        let handle = self.core.runtime()?;
        let token = self.core.begin()?;

        // The subscription must be registered with the reactor of the runtime
        // the worker runs on.
        let subscription = {
            let _guard = handle.enter();
            signal(SignalKind::from_raw(self.signum))
        };
        let mut stream = match subscription {
            Ok(stream) => stream,
            Err(source) => {
                token.cancel();
                return Err(ListenerError::Subscribe {
                    target: format!("signal {}", self.signum),
                    source,
                });
            }
        };

        let name = self.core.name().to_string();
        let signum = self.signum;
        let handler = Arc::clone(&self.handler);
        handle.spawn(async move {
            debug!("Signal listener {} waiting for signal {}", name, signum);
            loop {
                let delivered = tokio::select! {
                    _ = token.cancelled() => break,
                    delivered = stream.recv() => delivered,
                };
                if delivered.is_none() {
                    break;
                }
                trace!("Signal listener {} got signal {}", name, signum);
                handler(signum);
                callback().await;
            }
            token.cancel();
            debug!("Signal listener {} stopped", name);
        });
        Ok(())
    }

    fn stop(&self) {
        self.core.stop();
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }
}
