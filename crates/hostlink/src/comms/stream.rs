//! Unidirectional streaming endpoints.
//!
//! The streaming mode carries exactly one payload per connection: the writer
//! connects, sends everything, and shuts the stream down; the reader drains
//! until end-of-stream and treats connection close as the framing signal.
//! No delimiter is involved.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::Stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

use super::error::{CommsError, CommsResult};
use super::{bind_listener, remove_socket_file, ChannelConfig, SOCKET_MODE};

/// Chunk size for draining a streaming peer connection.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Hard cap on a single streaming payload.
pub const MAX_STREAM_PAYLOAD: usize = 1024 * 1024;

/// Delay between connect attempts while waiting for a listener to appear.
pub const WRITE_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Long-running reader side of a streaming channel.
///
/// Binding is destructive to nothing: a path still occupied by a previous
/// session is a fatal error, so callers must ensure prior sessions ended
/// cleanly. Once bound, each [`StreamReader::recv`] accepts one connection
/// and yields its whole payload. The bound path is removed from the
/// filesystem when the reader is dropped - normal or failure path alike -
/// so a later bind can succeed.
#[derive(Debug)]
pub struct StreamReader {
    path: PathBuf,
    listener: UnixListener,
}

impl StreamReader {
    /// Binds `path` with default parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CommsError::AddrInUse`] when the path is occupied, or
    /// [`CommsError::Io`] on other socket failures.
    pub fn bind(path: impl Into<PathBuf>) -> CommsResult<Self> {
        Self::with_config(path, ChannelConfig::default())
    }

    /// Binds `path` with explicit parameters.
    ///
    /// # Errors
    ///
    /// See [`StreamReader::bind`].
    pub fn with_config(path: impl Into<PathBuf>, config: ChannelConfig) -> CommsResult<Self> {
        let path = path.into();
        let listener = bind_listener(&path, config.backlog, SOCKET_MODE)?;
        Ok(Self { path, listener })
    }

    /// The channel's socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until a writer connects, drains its connection, and returns
    /// the trimmed payload.
    ///
    /// Across multiple writers, payloads arrive in accept order, not send
    /// order. A writer that connects and closes without sending yields an
    /// empty payload.
    ///
    /// # Errors
    ///
    /// Returns [`CommsError::Oversized`] when a payload exceeds
    /// [`MAX_STREAM_PAYLOAD`], [`CommsError::InvalidUtf8`] for non-text
    /// payloads, or [`CommsError::Io`] on socket failures.
    pub async fn recv(&mut self) -> CommsResult<String> {
        let (mut conn, _addr) = self.listener.accept().await.map_err(CommsError::Io)?;
        debug!(path = %self.path.display(), "writer connection accepted");

        let mut payload = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = conn.read(&mut chunk).await.map_err(CommsError::Io)?;
            if n == 0 {
                break;
            }
            if payload.len() + n > MAX_STREAM_PAYLOAD {
                return Err(CommsError::Oversized {
                    partial: String::from_utf8_lossy(&payload).into_owned(),
                    limit: MAX_STREAM_PAYLOAD,
                });
            }
            payload.extend_from_slice(&chunk[..n]);
        }

        let message = std::str::from_utf8(&payload).map_err(|_| CommsError::InvalidUtf8)?;
        Ok(message.trim().to_owned())
    }

    /// Turns the reader into a lazy, unbounded sequence of payloads.
    ///
    /// The stream never terminates on its own; errors are yielded in place
    /// and the caller decides whether to keep polling. Dropping the stream
    /// drops the reader and removes the socket path.
    pub fn into_stream(self) -> impl Stream<Item = CommsResult<String>> {
        futures::stream::unfold(self, |mut reader| async move {
            let message = reader.recv().await;
            Some((message, reader))
        })
    }

    /// Tears the reader down, removing the socket path.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        remove_socket_file(&self.path);
    }
}

/// Writer side of a streaming channel.
pub struct StreamWriter {
    path: PathBuf,
}

impl StreamWriter {
    /// Creates a writer endpoint for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The channel's socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connects to the reader, sends the whole trimmed payload, and
    /// disconnects.
    ///
    /// When no listener exists yet: with `wait_for_availability` the connect
    /// is retried every [`WRITE_RETRY_INTERVAL`] indefinitely (bound it
    /// externally with `tokio::time::timeout` if needed); without it the
    /// call fails immediately.
    ///
    /// The payload is dispatched once the transport accepts it; the peer
    /// observes end-of-message through the connection shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`CommsError::ConnectionRefused`] in fail-fast mode when no
    /// listener exists, or [`CommsError::Io`] on transport failures.
    pub async fn send(&self, message: &str, wait_for_availability: bool) -> CommsResult<()> {
        let mut conn = loop {
            match UnixStream::connect(&self.path).await {
                Ok(conn) => break conn,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    if !wait_for_availability {
                        return Err(CommsError::ConnectionRefused {
                            path: self.path.clone(),
                        });
                    }
                    debug!(path = %self.path.display(), "no listener yet, retrying");
                    tokio::time::sleep(WRITE_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(CommsError::Io(e)),
            }
        };

        conn.write_all(message.trim().as_bytes())
            .await
            .map_err(CommsError::Io)?;
        conn.shutdown().await.map_err(CommsError::Io)?;
        Ok(())
    }
}
