//! Request/response message endpoints.
//!
//! One process acts as the server: it binds the socket path, listens with
//! the configured backlog, and serves exactly one peer connection at a time.
//! The other connects as a client. Both sides exchange delimiter-framed
//! text messages; see [`super::codec`] for the framing contract.

use std::io;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use super::codec::DelimitedCodec;
use super::error::{CommsError, CommsResult};
use super::{bind_listener, remove_socket_file, ChannelConfig, SOCKET_MODE};

/// Capacity reserved ahead of each socket read.
const READ_BUFFER_RESERVE: usize = 1024;

/// One delimiter-framed peer connection.
///
/// The read loop drives the codec directly rather than through
/// `tokio_util::codec::Framed`: a failed receive (oversized or incomplete
/// frame) must leave the connection usable for the next call, and `Framed`
/// fuses its stream after a decode error.
struct FramedConn {
    stream: UnixStream,
    codec: DelimitedCodec,
    read_buf: BytesMut,
}

impl FramedConn {
    fn new(stream: UnixStream, codec: DelimitedCodec) -> Self {
        Self {
            stream,
            codec,
            read_buf: BytesMut::with_capacity(READ_BUFFER_RESERVE),
        }
    }

    async fn send(&mut self, message: &str) -> CommsResult<()> {
        let mut frame = BytesMut::new();
        self.codec.encode(message, &mut frame)?;
        self.stream.write_all(&frame).await.map_err(CommsError::Io)?;
        Ok(())
    }

    async fn recv(&mut self) -> CommsResult<String> {
        loop {
            if let Some(message) = self.codec.decode(&mut self.read_buf)? {
                return Ok(message);
            }
            self.read_buf.reserve(READ_BUFFER_RESERVE);
            let n = self
                .stream
                .read_buf(&mut self.read_buf)
                .await
                .map_err(CommsError::Io)?;
            if n == 0 {
                return match self.codec.decode_eof(&mut self.read_buf)? {
                    Some(message) => Ok(message),
                    None => Err(CommsError::Incomplete {
                        partial: String::new(),
                    }),
                };
            }
        }
    }
}

/// Serving side of a request/response channel.
///
/// Construction is cheap and repeatable; nothing touches the filesystem
/// until [`MessageServer::accept`]. The socket path is removed again on
/// [`MessageServer::close`] (and on drop), so a cleanly closed session can
/// be rebound later.
pub struct MessageServer {
    path: PathBuf,
    config: ChannelConfig,
    listener: Option<UnixListener>,
    peer: Option<FramedConn>,
}

impl MessageServer {
    /// Creates an unopened server endpoint for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, ChannelConfig::default())
    }

    /// Creates an unopened server endpoint with explicit parameters.
    #[must_use]
    pub fn with_config(path: impl Into<PathBuf>, config: ChannelConfig) -> Self {
        Self {
            path: path.into(),
            config,
            listener: None,
            peer: None,
        }
    }

    /// The channel's socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Binds the path (on first call) and blocks until exactly one peer
    /// connects.
    ///
    /// Additional connection attempts queue up to the configured backlog and
    /// are refused beyond that; they are serviced one at a time by
    /// subsequent `accept` calls, each replacing the previous peer.
    ///
    /// # Errors
    ///
    /// Returns [`CommsError::AddrInUse`] when the path is still occupied by
    /// a prior session, or [`CommsError::Io`] on other socket failures.
    pub async fn accept(&mut self) -> CommsResult<()> {
        if self.listener.is_none() {
            self.listener = Some(bind_listener(
                &self.path,
                self.config.backlog,
                SOCKET_MODE,
            )?);
        }
        let listener = self.listener.as_ref().ok_or(CommsError::NotConnected)?;

        let (stream, _addr) = listener.accept().await.map_err(CommsError::Io)?;
        debug!(path = %self.path.display(), "peer connection accepted");
        self.peer = Some(FramedConn::new(stream, self.config.codec()));
        Ok(())
    }

    /// Frames `message` (trimmed, delimiter appended) and writes it to the
    /// accepted peer.
    ///
    /// # Errors
    ///
    /// Returns [`CommsError::NotConnected`] before a peer has been accepted,
    /// [`CommsError::DelimiterInPayload`] for unframeable payloads, or
    /// [`CommsError::Io`] on transport failures.
    pub async fn send(&mut self, message: &str) -> CommsResult<()> {
        let peer = self.peer.as_mut().ok_or(CommsError::NotConnected)?;
        peer.send(message).await
    }

    /// Receives one framed message from the accepted peer.
    ///
    /// # Errors
    ///
    /// Returns [`CommsError::Oversized`] when the buffer limit is reached
    /// before the delimiter (the channel survives and the next receive may
    /// succeed), or [`CommsError::Incomplete`] when the peer disconnects
    /// mid-frame.
    pub async fn recv(&mut self) -> CommsResult<String> {
        let peer = self.peer.as_mut().ok_or(CommsError::NotConnected)?;
        peer.recv().await
    }

    /// Tears down the peer connection and listener and removes the socket
    /// path. A no-op when nothing is open.
    pub fn close(&mut self) {
        self.peer = None;
        if self.listener.take().is_some() {
            remove_socket_file(&self.path);
        }
    }
}

impl Drop for MessageServer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connecting side of a request/response channel.
///
/// The transport is established lazily on the first [`MessageClient::send`];
/// sending again on an established connection never re-connects.
pub struct MessageClient {
    path: PathBuf,
    config: ChannelConfig,
    conn: Option<FramedConn>,
}

impl MessageClient {
    /// Creates an unconnected client endpoint for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, ChannelConfig::default())
    }

    /// Creates an unconnected client endpoint with explicit parameters.
    #[must_use]
    pub fn with_config(path: impl Into<PathBuf>, config: ChannelConfig) -> Self {
        Self {
            path: path.into(),
            config,
            conn: None,
        }
    }

    /// The channel's socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_connected(&mut self) -> CommsResult<&mut FramedConn> {
        if self.conn.is_none() {
            let stream = UnixStream::connect(&self.path).await.map_err(|e| {
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                ) {
                    CommsError::ConnectionRefused {
                        path: self.path.clone(),
                    }
                } else {
                    CommsError::Io(e)
                }
            })?;
            debug!(path = %self.path.display(), "connected to server");
            self.conn = Some(FramedConn::new(stream, self.config.codec()));
        }
        self.conn.as_mut().ok_or(CommsError::NotConnected)
    }

    /// Frames `message` and writes it to the server, connecting first if no
    /// connection is established yet.
    ///
    /// # Errors
    ///
    /// Returns [`CommsError::ConnectionRefused`] when no listener exists at
    /// the path, or the framing/transport errors of the codec.
    pub async fn send(&mut self, message: &str) -> CommsResult<()> {
        let conn = self.ensure_connected().await?;
        conn.send(message).await
    }

    /// Receives one framed message from the server.
    ///
    /// # Errors
    ///
    /// Returns [`CommsError::NotConnected`] before the first send, and the
    /// same per-call errors as [`MessageServer::recv`].
    pub async fn recv(&mut self) -> CommsResult<String> {
        let conn = self.conn.as_mut().ok_or(CommsError::NotConnected)?;
        conn.recv().await
    }

    /// Drops the connection if one is established; a no-op otherwise.
    pub fn close(&mut self) {
        self.conn = None;
    }
}
