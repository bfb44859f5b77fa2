//! In-process message queue listener

use super::{EventListener, ListenerCallback, ListenerCore, PayloadHandler};
use crate::constants::DEFAULT_CHANNEL_CAPACITY;
use crate::error::ListenerError;
use log::{debug, trace, warn};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

/// Producer side of a [`ChannelListener`]
///
/// Sending never blocks: when the queue is full the message is dropped.
#[derive(Clone)]
pub struct MessageSender {
    name: Arc<str>,
    tx: mpsc::Sender<String>,
}

impl MessageSender {
    /// Queue a message; returns false if it was dropped
    pub fn send(&self, message: impl Into<String>) -> bool {
        match self.tx.try_send(message.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(
                    "Channel {} is full, dropping message: {}",
                    self.name, message
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Channel {} is closed, dropping message", self.name);
                false
            }
        }
    }
}

/// Delivers messages pushed through its [`MessageSender`]s
pub struct ChannelListener {
    core: ListenerCore,
    tx: mpsc::Sender<String>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    handler: PayloadHandler,
}

impl ChannelListener {
    pub fn new(name: &str, handler: PayloadHandler) -> Self {
        Self::with_capacity(name, DEFAULT_CHANNEL_CAPACITY, handler)
    }

    pub fn with_capacity(name: &str, capacity: usize, handler: PayloadHandler) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            core: ListenerCore::new(name),
            tx,
            rx: Arc::new(Mutex::new(rx)),
            handler,
        }
    }

    /// A new producer handle
    pub fn sender(&self) -> MessageSender {
        MessageSender {
            name: Arc::from(self.core.name()),
            tx: self.tx.clone(),
        }
    }
}

impl EventListener for ChannelListener {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn start(&self, callback: ListenerCallback) -> Result<(), ListenerError> {
        let name = self.core.name().to_string();
        let rx = Arc::clone(&self.rx);
        let handler = Arc::clone(&self.handler);

        self.core.spawn(|token| async move {
            // A previous run releases the receiver as soon as it observes its
            // own cancellation.
            let mut rx = tokio::select! {
                _ = token.cancelled() => return,
                rx = rx.lock_owned() => rx,
            };
            debug!("Channel listener {} started", name);
            loop {
                let message = tokio::select! {
                    _ = token.cancelled() => break,
                    message = rx.recv() => message,
                };
                match message {
                    Some(message) => {
                        trace!("Channel {} received: {}", name, message);
                        handler(message);
                        callback().await;
                    }
                    None => break,
                }
            }
            debug!("Channel listener {} stopped", name);
        })
    }

    fn stop(&self) {
        self.core.stop();
    }

    fn cleanup(&self) -> Result<(), ListenerError> {
        self.stop();
        if let Ok(mut rx) = self.rx.try_lock() {
            let mut dropped = 0;
            while rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!(
                    "Channel listener {} discarded {} pending message(s)",
                    self.core.name(),
                    dropped
                );
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{callback, noop_callback};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn recorder() -> (PayloadHandler, Arc<std::sync::Mutex<Vec<String>>>) {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Arc::new(move |m| sink.lock().unwrap().push(m)), seen)
    }

    #[tokio::test]
    async fn test_send_drops_when_full_without_blocking() {
        let (handler, _) = recorder();
        let listener = ChannelListener::with_capacity("full", 2, handler);
        let sender = listener.sender();

        assert!(sender.send("one"));
        assert!(sender.send("two"));
        assert!(!sender.send("three"), "third message is dropped");
    }

    #[tokio::test]
    async fn test_messages_reach_handler_then_callback() {
        let (handler, seen) = recorder();
        let listener = ChannelListener::new("push", handler);
        let sender = listener.sender();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        listener
            .start(callback(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .unwrap();

        sender.send("a");
        sender.send("b");

        tokio::time::timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
        listener.stop();
    }

    #[tokio::test]
    async fn test_restart_reuses_queue() {
        let (handler, seen) = recorder();
        let listener = ChannelListener::new("restart", handler);
        let sender = listener.sender();

        listener.start(noop_callback()).unwrap();
        listener.stop();
        assert!(!listener.is_running());

        sender.send("after restart");
        listener.start(noop_callback()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(seen.lock().unwrap()[0], "after restart");
        listener.cleanup().unwrap();
    }
}
