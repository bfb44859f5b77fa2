//! Unix domain socket listener with bounded reconnection

use super::{EventListener, ListenerCallback, ListenerCore, PayloadHandler, Retry};
use crate::constants::DEFAULT_SOCKET_CHUNK_SIZE;
use crate::error::ListenerError;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info, trace, warn};
use rg_bar_types::RetryPolicy;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Readable side of a socket connection
pub type SocketStream = Pin<Box<dyn AsyncRead + Send>>;

/// Opens connections for a [`SocketListener`]
pub trait SocketConnector: Send + Sync {
    /// Description of the endpoint, used in logs
    fn target(&self) -> String;

    fn connect(&self) -> BoxFuture<'static, io::Result<SocketStream>>;
}

/// Connects to a Unix domain socket path
pub struct UnixConnector {
    path: PathBuf,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SocketConnector for UnixConnector {
    fn target(&self) -> String {
        self.path.display().to_string()
    }

    fn connect(&self) -> BoxFuture<'static, io::Result<SocketStream>> {
        let path = self.path.clone();
        async move {
            let stream = tokio::net::UnixStream::connect(&path).await?;
            Ok(Box::pin(stream) as SocketStream)
        }
        .boxed()
    }
}

/// How the byte stream is split into payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One payload per newline-terminated line (empty lines skipped)
    Lines,
    /// One payload per read of up to `n` bytes
    Chunks(usize),
}

impl Default for Framing {
    fn default() -> Self {
        Framing::Lines
    }
}

enum ReadEnd {
    Cancelled,
    Eof,
    Failed(io::Error),
}

/// Reads payloads from a Unix domain socket
///
/// Each payload goes to the handler, then the callback runs. When the
/// connection fails or closes, the listener reconnects under its
/// [`RetryPolicy`]; running out of attempts leaves it stopped.
pub struct SocketListener {
    core: ListenerCore,
    connector: Arc<dyn SocketConnector>,
    handler: PayloadHandler,
    framing: Framing,
    policy: RetryPolicy,
    reconnects: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
}

impl SocketListener {
    pub fn new(name: &str, path: impl Into<PathBuf>, handler: PayloadHandler) -> Self {
        Self::with_connector(name, Arc::new(UnixConnector::new(path)), handler)
    }

    pub fn with_connector(
        name: &str,
        connector: Arc<dyn SocketConnector>,
        handler: PayloadHandler,
    ) -> Self {
        Self {
            core: ListenerCore::new(name),
            connector,
            handler,
            framing: Framing::default(),
            policy: RetryPolicy::default(),
            reconnects: Arc::new(AtomicU64::new(0)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Reconnections performed since creation
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read_payloads(
        stream: SocketStream,
        framing: Framing,
        handler: &PayloadHandler,
        callback: &ListenerCallback,
        token: &CancellationToken,
    ) -> ReadEnd {
        let mut reader = BufReader::new(stream);
        match framing {
            Framing::Lines => {
                // Payloads are raw bytes; invalid UTF-8 is replaced, not fatal
                let mut line = Vec::new();
                loop {
                    line.clear();
                    let read = tokio::select! {
                        _ = token.cancelled() => return ReadEnd::Cancelled,
                        read = reader.read_until(b'\n', &mut line) => read,
                    };
                    match read {
                        Ok(0) => return ReadEnd::Eof,
                        Ok(_) => {
                            let text = String::from_utf8_lossy(&line);
                            let payload = text.trim_end_matches(['\r', '\n']);
                            if payload.is_empty() {
                                continue;
                            }
                            trace!("Socket payload: {}", payload);
                            handler(payload.to_string());
                            callback().await;
                        }
                        Err(e) => return ReadEnd::Failed(e),
                    }
                }
            }
            Framing::Chunks(size) => {
                let mut buf = vec![0u8; size.max(1)];
                loop {
                    let read = tokio::select! {
                        _ = token.cancelled() => return ReadEnd::Cancelled,
                        read = reader.read(&mut buf) => read,
                    };
                    match read {
                        Ok(0) => return ReadEnd::Eof,
                        Ok(n) => {
                            handler(String::from_utf8_lossy(&buf[..n]).into_owned());
                            callback().await;
                        }
                        Err(e) => return ReadEnd::Failed(e),
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn event_loop(
        name: String,
        connector: Arc<dyn SocketConnector>,
        handler: PayloadHandler,
        callback: ListenerCallback,
        framing: Framing,
        retry: Retry,
        connected: Arc<AtomicBool>,
        token: CancellationToken,
    ) {
        let target = connector.target();
        let mut after_failure = false;

        loop {
            let stream = match retry
                .connect(&token, &target, after_failure, || connector.connect())
                .await
            {
                Some(stream) => stream,
                None => break,
            };

            connected.store(true, Ordering::SeqCst);
            let end = Self::read_payloads(stream, framing, &handler, &callback, &token).await;
            connected.store(false, Ordering::SeqCst);

            match end {
                ReadEnd::Cancelled => break,
                ReadEnd::Eof => warn!("Socket {} closed by peer", target),
                ReadEnd::Failed(e) => warn!("Error reading from socket {}: {}", target, e),
            }
            after_failure = true;
        }

        if token.is_cancelled() {
            debug!("Socket listener {} stopped", name);
        } else {
            error!(
                "Socket listener {} stopped: reconnection attempts to {} exhausted",
                name, target
            );
            token.cancel();
        }
    }
}

impl EventListener for SocketListener {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn start(&self, callback: ListenerCallback) -> Result<(), ListenerError> {
        let name = self.core.name().to_string();
        let connector = Arc::clone(&self.connector);
        let handler = Arc::clone(&self.handler);
        let framing = match self.framing {
            Framing::Chunks(0) => Framing::Chunks(DEFAULT_SOCKET_CHUNK_SIZE),
            other => other,
        };
        let retry = Retry::with_counter(self.policy, Arc::clone(&self.reconnects));
        let connected = Arc::clone(&self.connected);

        self.core.spawn(|token| {
            info!("Starting socket listener {} on {}", name, connector.target());
            Self::event_loop(name, connector, handler, callback, framing, retry, connected, token)
        })
    }

    fn stop(&self) {
        if self.core.stop() {
            debug!("Stopping socket listener {}", self.core.name());
        }
    }

    fn cleanup(&self) -> Result<(), ListenerError> {
        // Cancelling the run drops the worker's stream, closing the socket.
        self.stop();
        self.connected.store(false, Ordering::SeqCst);
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
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::time::Instant;

    /// Fails the first `failures` attempts, then hands out in-memory streams
    struct ScriptedConnector {
        failures: u32,
        attempts: Arc<Mutex<Vec<Instant>>>,
        servers: Arc<Mutex<Vec<DuplexStream>>>,
    }

    impl ScriptedConnector {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                attempts: Arc::new(Mutex::new(Vec::new())),
                servers: Arc::new(Mutex::new(Vec::new())),
            })
        }

        fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }

        fn take_server(&self) -> Option<DuplexStream> {
            self.servers.lock().unwrap().pop()
        }
    }

    impl SocketConnector for ScriptedConnector {
        fn target(&self) -> String {
            "scripted".to_string()
        }

        fn connect(&self) -> BoxFuture<'static, io::Result<SocketStream>> {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(Instant::now());
            let result = if attempts.len() as u32 <= self.failures {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            } else {
                let (client, server) = tokio::io::duplex(1024);
                self.servers.lock().unwrap().push(server);
                Ok(Box::pin(client) as SocketStream)
            };
            futures::future::ready(result).boxed()
        }
    }

    fn recording_handler() -> (PayloadHandler, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Arc::new(move |p| sink.lock().unwrap().push(p)), seen)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_until_connected() {
        let connector = ScriptedConnector::new(3);
        let (handler, _) = recording_handler();
        let listener = SocketListener::with_connector("bar", connector.clone(), handler)
            .with_policy(RetryPolicy::new(5, Duration::from_millis(100)));

        listener.start(noop_callback()).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(listener.is_running());
        assert!(listener.is_connected());
        assert_eq!(listener.reconnect_count(), 3);

        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 4);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
        listener.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_attempts_exhausted() {
        let connector = ScriptedConnector::new(3);
        let (handler, _) = recording_handler();
        let listener = SocketListener::with_connector("bar", connector.clone(), handler)
            .with_policy(RetryPolicy::new(3, Duration::from_millis(100)));

        listener.start(noop_callback()).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!listener.is_running());
        assert!(!listener.is_connected());
        assert_eq!(connector.attempts().len(), 3);
        assert_eq!(listener.reconnect_count(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts().len(), 3, "no attempts after giving up");
    }

    #[tokio::test]
    async fn test_forwards_lines_then_invokes_callback() {
        let connector = ScriptedConnector::new(0);
        let (handler, seen) = recording_handler();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let listener = SocketListener::with_connector("bar", connector.clone(), handler);

        listener
            .start(callback(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .unwrap();

        wait_for(|| listener.is_connected()).await;
        let mut server = connector.take_server().unwrap();
        server.write_all(b"workspace 1\n\nworkspace 2\r\n").await.unwrap();

        wait_for(|| calls.load(Ordering::SeqCst) == 2).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["workspace 1".to_string(), "workspace 2".to_string()]
        );
        listener.cleanup().unwrap();
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_connection() {
        let connector = ScriptedConnector::new(0);
        let (handler, seen) = recording_handler();
        let listener = SocketListener::with_connector("bar", connector.clone(), handler);
        listener.start(noop_callback()).unwrap();

        wait_for(|| listener.is_connected()).await;
        let mut server = connector.take_server().unwrap();
        server.write_all(b"ok1\n\xff\xfe bad\nok2\n").await.unwrap();

        wait_for(|| seen.lock().unwrap().len() == 3).await;
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0], "ok1");
        assert_eq!(seen[1], "\u{FFFD}\u{FFFD} bad");
        assert_eq!(seen[2], "ok2");
        assert_eq!(listener.reconnect_count(), 0);
        assert_eq!(connector.attempts().len(), 1);
        listener.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_peer_closes() {
        let connector = ScriptedConnector::new(0);
        let (handler, _) = recording_handler();
        let listener = SocketListener::with_connector("bar", connector.clone(), handler)
            .with_policy(RetryPolicy::new(2, Duration::from_millis(50)));

        listener.start(noop_callback()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(listener.is_connected());

        drop(connector.take_server());
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(listener.is_running());
        assert!(listener.is_connected());
        assert_eq!(listener.reconnect_count(), 1);
        assert_eq!(connector.attempts().len(), 2);
        listener.stop();
    }

    #[tokio::test]
    async fn test_start_twice_fails_and_restart_after_stop_works() {
        let connector = ScriptedConnector::new(0);
        let (handler, _) = recording_handler();
        let listener = SocketListener::with_connector("bar", connector, handler);

        listener.start(noop_callback()).unwrap();
        assert!(matches!(
            listener.start(noop_callback()),
            Err(ListenerError::AlreadyRunning(_))
        ));

        listener.stop();
        listener.stop();
        assert!(!listener.is_running());

        listener.start(noop_callback()).unwrap();
        assert!(listener.is_running());
        listener.stop();
    }

    #[tokio::test]
    async fn test_reads_chunks_from_real_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.sock");
        let server = tokio::net::UnixListener::bind(&path).unwrap();

        let (handler, seen) = recording_handler();
        let listener = SocketListener::new("feed", &path, handler)
            .with_framing(Framing::Chunks(64))
            .with_policy(RetryPolicy::never());
        listener.start(noop_callback()).unwrap();

        let (mut conn, _) = server.accept().await.unwrap();
        conn.write_all(b"volume=42").await.unwrap();

        wait_for(|| !seen.lock().unwrap().is_empty()).await;
        assert_eq!(seen.lock().unwrap()[0], "volume=42");
        listener.stop();
    }
}
