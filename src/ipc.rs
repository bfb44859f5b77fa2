//! Inbound message socket
//!
//! Line protocol over a Unix domain socket: each line a client writes is
//! routed through [`UpdateScheduler::handle_ipc_message`] and answered with
//! `ok` or `unhandled`.

use crate::core::UpdateScheduler;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

/// Socket file name inside the runtime directory
pub const SOCKET_NAME: &str = "rg-bar.sock";

pub const REPLY_OK: &str = "ok";
pub const REPLY_UNHANDLED: &str = "unhandled";

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// `$XDG_RUNTIME_DIR/rg-bar.sock`, or the temp dir when unset
pub fn default_socket_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(SOCKET_NAME)
}

/// Listening end of the message socket
///
/// The socket file is removed when the server is dropped.
pub struct IpcServer {
    path: PathBuf,
    listener: UnixListener,
}

impl IpcServer {
    /// Bind the socket, replacing a stale socket file
    ///
    /// Fails if another instance is answering on the path. Must be called
    /// inside a tokio runtime.
    pub fn bind(path: &Path) -> Result<Self> {
        if path.exists() {
            if std::os::unix::net::UnixStream::connect(path).is_ok() {
                bail!("Another instance is listening on {}", path.display());
            }
            debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("Failed to bind {}", path.display()))?;
        info!("Listening for messages on {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            listener,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept clients until `token` is cancelled
    pub async fn serve(self, scheduler: Arc<UpdateScheduler>, token: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, _)) => {
                    let scheduler = Arc::clone(&scheduler);
                    let token = token.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, scheduler, token).await {
                            debug!("Message client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Failed to accept message client: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
        debug!("Message socket {} closed", self.path.display());
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Could not remove socket {}: {}", self.path.display(), e);
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    scheduler: Arc<UpdateScheduler>,
    token: CancellationToken,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = AsyncBufReader::new(read_half).lines();

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        let handled = scheduler.handle_ipc_message(message).await;
        let reply = if handled { REPLY_OK } else { REPLY_UNHANDLED };
        write_half.write_all(reply.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
    }
    Ok(())
}

/// Send one message and wait for the reply
///
/// Blocking; meant for the CLI client.
pub fn send_message(path: &Path, message: &str) -> Result<String> {
    if message.contains('\n') {
        bail!("Messages must be a single line");
    }
    let mut stream = std::os::unix::net::UnixStream::connect(path)
        .with_context(|| format!("Failed to connect to {}", path.display()))?;
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    stream.set_write_timeout(Some(CLIENT_TIMEOUT))?;

    writeln!(stream, "{}", message)?;
    stream.flush()?;

    let mut reply = String::new();
    BufReader::new(&stream)
        .read_line(&mut reply)
        .context("No reply from rg-bar")?;
    stream.shutdown(std::net::Shutdown::Both).ok();
    Ok(reply.trim().to_string())
}
