//! Message channels over Unix domain sockets.
//!
//! A channel is addressed by a filesystem path and supports two mutually
//! exclusive usage patterns:
//!
//! ```text
//! request/response              streaming
//! ┌───────────────┐            ┌───────────────┐
//! │ MessageServer │◄──frames──►│ StreamReader  │◄─one payload per
//! │ MessageClient │  (EOM byte)│ StreamWriter  │  connection (EOF)
//! └───────────────┘            └───────────────┘
//! ```
//!
//! - **Request/response**: one process binds and serves exactly one peer at
//!   a time ([`MessageServer`]); the other connects, sends, and receives
//!   ([`MessageClient`]). Frames are terminated by a single delimiter byte.
//! - **Streaming**: a long-running [`StreamReader`] accepts one connection
//!   per payload and treats connection close as the end-of-message signal; a
//!   [`StreamWriter`] connects (retrying until a listener appears, or
//!   failing fast), sends one payload, and disconnects.
//!
//! Socket files are created world-read/writable so any local process can
//! participate. Nothing is retried internally except the caller-opted
//! connect retry in [`StreamWriter::send`].
//!
//! # Module Overview
//!
//! - [`channel`]: request/response endpoints
//! - [`codec`]: the delimiter framing codec
//! - [`error`]: channel error types ([`CommsError`], [`CommsResult`])
//! - [`stream`]: unidirectional streaming endpoints

pub mod channel;
pub mod codec;
pub mod error;
pub mod stream;

pub use channel::{MessageClient, MessageServer};
pub use codec::{DelimitedCodec, DEFAULT_DELIMITER, DEFAULT_MAX_MESSAGE_LEN};
pub use error::{CommsError, CommsResult};
pub use stream::{StreamReader, StreamWriter};

use std::io;
use std::path::Path;

use tokio::net::UnixListener;
use tracing::debug;

/// Socket file permissions: any local user may read/write.
pub const SOCKET_MODE: u32 = 0o666;

/// Default number of pending connections queued before refusal.
pub const DEFAULT_BACKLOG: u32 = 1;

/// Tunable channel parameters, shared by both operating modes.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// End-of-message delimiter for request/response framing.
    pub delimiter: u8,
    /// Maximum buffered message length in bytes.
    pub max_message_len: usize,
    /// Listener backlog depth.
    pub backlog: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

impl ChannelConfig {
    /// Sets the end-of-message delimiter.
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the maximum buffered message length.
    #[must_use]
    pub const fn with_max_message_len(mut self, max: usize) -> Self {
        self.max_message_len = max;
        self
    }

    /// Sets the listener backlog depth.
    #[must_use]
    pub const fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub(crate) const fn codec(&self) -> DelimitedCodec {
        DelimitedCodec::new(self.delimiter, self.max_message_len)
    }
}

/// Binds a listening socket at `path` with an explicit backlog and sets the
/// socket file permissions.
///
/// A path still occupied by a previous session is a fatal
/// [`CommsError::AddrInUse`]; callers must ensure the prior session was
/// cleanly closed.
#[allow(unsafe_code)]
pub(crate) fn bind_listener(path: &Path, backlog: u32, mode: u32) -> CommsResult<UnixListener> {
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::io::FromRawFd;
    use std::os::unix::net::UnixListener as StdUnixListener;

    // SAFETY: zeroed sockaddr_un is a valid all-default address struct.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };

    let bytes = path.as_os_str().as_bytes();
    // One byte is reserved for the terminating NUL.
    if bytes.len() >= addr.sun_path.len() {
        return Err(CommsError::PathTooLong {
            path: path.to_path_buf(),
        });
    }
    #[allow(clippy::cast_possible_truncation)]
    {
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    }
    // SAFETY: length checked against sun_path above; c_char and u8 share
    // layout.
    unsafe {
        std::ptr::copy_nonoverlapping(
            bytes.as_ptr().cast::<libc::c_char>(),
            addr.sun_path.as_mut_ptr(),
            bytes.len(),
        );
    }

    // SAFETY: standard POSIX socket/bind/listen sequence; the descriptor is
    // closed on every error path before returning, and ownership transfers
    // to the std listener on success.
    let std_listener = unsafe {
        let fd = libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0);
        if fd < 0 {
            return Err(CommsError::Io(io::Error::last_os_error()));
        }
        #[allow(clippy::cast_possible_truncation)]
        let len = std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
        if libc::bind(fd, std::ptr::addr_of!(addr).cast::<libc::sockaddr>(), len) != 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(if err.kind() == io::ErrorKind::AddrInUse {
                CommsError::AddrInUse {
                    path: path.to_path_buf(),
                }
            } else {
                CommsError::Io(err)
            });
        }
        let backlog = libc::c_int::try_from(backlog).unwrap_or(libc::c_int::MAX);
        if libc::listen(fd, backlog) != 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            remove_socket_file(path);
            return Err(CommsError::Io(err));
        }
        StdUnixListener::from_raw_fd(fd)
    };

    // The bind created the socket file; a failure past this point must not
    // leave it behind to poison the next bind.
    let finish = move || -> io::Result<UnixListener> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        std_listener.set_nonblocking(true)?;
        UnixListener::from_std(std_listener)
    };
    let listener = match finish() {
        Ok(listener) => listener,
        Err(e) => {
            remove_socket_file(path);
            return Err(CommsError::Io(e));
        }
    };

    debug!(path = %path.display(), backlog, "listener bound");
    Ok(listener)
}

/// Removes a socket file, ignoring a missing path.
pub(crate) fn remove_socket_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), err = %e, "failed to remove socket file");
        }
    } else {
        debug!(path = %path.display(), "socket file removed");
    }
}
