//! Error types for the download module.
//!
//! [`DownloadError`] covers everything that can go wrong for one task
//! attempt or one directory listing. None of these abort a run: exhausted
//! retries become failed outcomes in the run summary.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ftp::SessionError;

/// Errors that can occur while listing or downloading remote files.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A session could not be established or re-established.
    #[error("cannot connect to {server}: {source}")]
    Connection {
        /// Server identity (`host:port:user`).
        server: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },

    /// A remote directory could not be entered or enumerated.
    #[error("cannot list {path}: {source}")]
    Listing {
        /// Remote directory.
        path: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },

    /// A transfer failed before completing.
    #[error("transfer of {path} failed: {source}")]
    Retrieval {
        /// Remote file path.
        path: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },

    /// Local file system error (create, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// Local path where the error occurred.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The server delivered zero bytes for the file.
    #[error("remote file {path} is empty (0 bytes)")]
    EmptyRemoteFile {
        /// Remote file path.
        path: String,
    },

    /// Cancellation was requested before the attempt could start.
    #[error("cancelled before {path} was attempted")]
    Cancelled {
        /// Remote file path.
        path: String,
    },
}

impl DownloadError {
    /// Creates a connection error.
    pub fn connection(server: &str, source: SessionError) -> Self {
        Self::Connection {
            server: server.to_string(),
            source,
        }
    }

    /// Creates a listing error.
    pub fn listing(path: &str, source: SessionError) -> Self {
        Self::Listing {
            path: path.to_string(),
            source,
        }
    }

    /// Creates a retrieval error.
    pub fn retrieval(path: &str, source: SessionError) -> Self {
        Self::Retrieval {
            path: path.to_string(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Creates an empty-file error.
    pub fn empty_remote_file(path: &str) -> Self {
        Self::EmptyRemoteFile {
            path: path.to_string(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(path: &str) -> Self {
        Self::Cancelled {
            path: path.to_string(),
        }
    }

    /// Whether the error is a server "not found"-style rejection of a path,
    /// which the resolver treats as an expected miss.
    #[must_use]
    pub fn is_path_rejection(&self) -> bool {
        matches!(
            self,
            Self::Listing {
                source: SessionError::Rejected { .. },
                ..
            }
        )
    }
}
