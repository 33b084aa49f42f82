//! Error types for the message channel layer.
//!
//! Errors are structured so callers can branch on the failure mode:
//! endpoint-fatal conditions (occupied path, missing listener) versus
//! per-call conditions (oversized or incomplete frame) that leave the
//! channel usable for the next receive.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from message channel operations.
#[derive(Debug, Error)]
pub enum CommsError {
    /// The socket path is already occupied by a previous session.
    ///
    /// The caller must ensure the prior session was cleanly closed; nothing
    /// is removed automatically.
    #[error("address already in use: {}", .path.display())]
    AddrInUse {
        /// Occupied socket path.
        path: PathBuf,
    },

    /// No listener exists at the target path.
    #[error("connection refused: no listener at {}", .path.display())]
    ConnectionRefused {
        /// Path that was dialed.
        path: PathBuf,
    },

    /// The operation requires an established connection.
    #[error("endpoint is not connected")]
    NotConnected,

    /// A message exceeded the configured buffer limit before its delimiter.
    ///
    /// The call fails but the channel survives; `partial` carries the bytes
    /// accumulated up to the limit.
    #[error("message exceeds {limit} bytes before delimiter")]
    Oversized {
        /// Content received before the limit was hit.
        partial: String,
        /// Configured buffer limit.
        limit: usize,
    },

    /// The peer closed the connection before completing a frame.
    #[error("peer closed the connection mid-message ({} bytes received)", .partial.len())]
    Incomplete {
        /// Content received before the peer vanished.
        partial: String,
    },

    /// An outgoing payload contains the frame delimiter.
    #[error("payload contains the frame delimiter")]
    DelimiterInPayload,

    /// A received payload is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    /// The socket path does not fit in a `sockaddr_un`.
    #[error("socket path too long: {}", .path.display())]
    PathTooLong {
        /// Offending path.
        path: PathBuf,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CommsError {
    /// Returns `true` when the failure is scoped to a single receive call
    /// and the channel may be used again.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Oversized { .. } | Self::Incomplete { .. })
    }

    /// Content received before the failure, for the variants that carry it.
    #[must_use]
    pub fn partial_message(&self) -> Option<&str> {
        match self {
            Self::Oversized { partial, .. } | Self::Incomplete { partial } => Some(partial),
            _ => None,
        }
    }
}

/// Result type for channel operations.
pub type CommsResult<T> = Result<T, CommsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_is_recoverable() {
        let err = CommsError::Oversized {
            partial: "abc".to_string(),
            limit: 3,
        };
        assert!(err.is_recoverable());
        assert_eq!(err.partial_message(), Some("abc"));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn incomplete_is_recoverable() {
        let err = CommsError::Incomplete {
            partial: "ab".to_string(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.partial_message(), Some("ab"));
    }

    #[test]
    fn endpoint_errors_are_not_recoverable() {
        let err = CommsError::AddrInUse {
            path: PathBuf::from("/tmp/x.sock"),
        };
        assert!(!err.is_recoverable());
        assert!(err.partial_message().is_none());

        let err = CommsError::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(!err.is_recoverable());
    }
}
