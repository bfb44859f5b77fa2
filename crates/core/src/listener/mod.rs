//! Restartable background event sources
//!
//! Every listener shares the same contract: `start` spawns a worker on the
//! current tokio runtime, the worker invokes the callback after each event it
//! processed, `stop` cancels the worker, and `cleanup` releases whatever the
//! worker holds (socket, signal subscription, queue) before stopping.
//!
//! - **socket**: Unix domain socket reader with bounded reconnection
//! - **channel**: in-process bounded message queue
//! - **signal**: OS signal subscription
//! - **timer**: fixed-interval ticks

mod channel;
mod retry;
mod signal;
mod socket;
mod timer;

pub use channel::{ChannelListener, MessageSender};
pub use retry::Retry;
pub use signal::{SignalHandler, SignalListener};
pub use socket::{Framing, SocketConnector, SocketListener, SocketStream, UnixConnector};
pub use timer::TimerListener;

use crate::error::ListenerError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Invoked by a listener after each processed event
pub type ListenerCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Receives the raw payload of socket and channel events
pub type PayloadHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Shared, type-erased listener
pub type SharedListener = Arc<dyn EventListener>;

/// Build a [`ListenerCallback`] from an async closure
pub fn callback<F, Fut>(f: F) -> ListenerCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Callback that does nothing
pub fn noop_callback() -> ListenerCallback {
    Arc::new(|| async {}.boxed())
}

/// Common contract of all event sources
pub trait EventListener: Send + Sync {
    /// Human-readable identifier used in logs
    fn name(&self) -> &str;

    /// Begin producing events; fails if already running
    fn start(&self, callback: ListenerCallback) -> Result<(), ListenerError>;

    /// Request shutdown; safe to call repeatedly
    fn stop(&self);

    /// Release the underlying resource, then stop
    fn cleanup(&self) -> Result<(), ListenerError> {
        self.stop();
        Ok(())
    }

    fn is_running(&self) -> bool;
}

/// Stopped/Running state shared by every listener variant
///
/// Running means "a worker run exists whose token is not cancelled". A worker
/// that gives up cancels its own token, so a later restart never races with
/// an exiting worker.
pub struct ListenerCore {
    name: String,
    run: Mutex<Option<CancellationToken>>,
}

impl ListenerCore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            run: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runtime the worker will be spawned on
    pub fn runtime(&self) -> Result<Handle, ListenerError> {
        Handle::try_current().map_err(|_| ListenerError::NoRuntime(self.name.clone()))
    }

    /// Transition Stopped → Running, returning the token for the new run
    pub fn begin(&self) -> Result<CancellationToken, ListenerError> {
        let mut run = self.run.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = run.as_ref() {
            if !token.is_cancelled() {
                return Err(ListenerError::AlreadyRunning(self.name.clone()));
            }
        }
        let token = CancellationToken::new();
        *run = Some(token.clone());
        Ok(token)
    }

    /// Transition Running → Stopped; returns whether a run was active
    pub fn stop(&self) -> bool {
        let token = self.run.lock().unwrap_or_else(|e| e.into_inner()).take();
        match token {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|token| !token.is_cancelled())
            .unwrap_or(false)
    }

    /// Begin a run and spawn its worker on the current runtime
    pub fn spawn<F, Fut>(&self, worker: F) -> Result<(), ListenerError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.runtime()?;
        let token = self.begin()?;
        handle.spawn(worker(token));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_core_state_machine() {
        let core = ListenerCore::new("test");
        assert!(!core.is_running());

        let token = core.begin().unwrap();
        assert!(core.is_running());
        assert!(matches!(core.begin(), Err(ListenerError::AlreadyRunning(_))));

        assert!(core.stop());
        assert!(token.is_cancelled());
        assert!(!core.is_running());
        assert!(!core.stop(), "second stop is a no-op");

        let token = core.begin().unwrap();
        token.cancel();
        assert!(!core.is_running(), "a worker giving up reads as stopped");
        assert!(core.begin().is_ok());
    }

    #[test]
    fn test_spawn_requires_runtime() {
        let core = ListenerCore::new("outside");
        let result = core.spawn(|_token| async {});
        assert!(matches!(result, Err(ListenerError::NoRuntime(_))));
        assert!(!core.is_running());
    }
}
