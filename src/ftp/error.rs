//! Transport-level errors raised by an FTP session.

use std::io;

use thiserror::Error;

/// Errors from a single FTP session operation.
///
/// The connection manager only reconnects on [`SessionError::is_io`]
/// failures; server rejections (`550 No such directory`, `530 Login
/// incorrect`) are surfaced as-is because a new session would get the same
/// answer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Socket-level failure on the control or data connection.
    #[error("I/O failure during {operation}: {source}")]
    Io {
        /// Operation that was running.
        operation: &'static str,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// Connect or read timeout elapsed.
    #[error("timed out during {operation}")]
    Timeout {
        /// Operation that was running.
        operation: &'static str,
    },

    /// Server answered with an error reply.
    #[error("server rejected {operation}: {message}")]
    Rejected {
        /// Operation that was running.
        operation: &'static str,
        /// Server reply text.
        message: String,
    },

    /// Host/port could not be turned into a socket address.
    #[error("cannot resolve address {address}: {reason}")]
    Address {
        /// `host:port` that was looked up.
        address: String,
        /// Resolver message.
        reason: String,
    },

    /// Writing the retrieved bytes to the local sink failed.
    #[error("local write failed: {source}")]
    LocalWrite {
        /// Underlying file error.
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    /// Builds an I/O error, folding timeout kinds into [`SessionError::Timeout`].
    #[must_use]
    pub fn io(operation: &'static str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout { operation },
            _ => Self::Io { operation, source },
        }
    }

    /// Builds a server rejection.
    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            message: message.into(),
        }
    }

    /// Whether the session is likely dead and worth replacing.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Timeout { .. })
    }

    /// Converts a `suppaftp` error raised while running `operation`.
    pub(crate) fn from_ftp(operation: &'static str, error: suppaftp::FtpError) -> Self {
        match error {
            suppaftp::FtpError::ConnectionError(source) => Self::io(operation, source),
            suppaftp::FtpError::BadResponse => Self::Io {
                operation,
                source: io::Error::new(io::ErrorKind::InvalidData, "malformed server reply"),
            },
            other => Self::rejected(operation, other.to_string()),
        }
    }
}
