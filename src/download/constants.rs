//! Constants for the download module (timeouts, transfer sizes, retry defaults).

use std::time::Duration;

/// Default FTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default FTP read timeout (5 minutes for slow data connections).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Buffer used when streaming a retrieval into a local file.
pub const TRANSFER_BUFFER_SIZE: usize = 8192;

/// Suffix of in-progress local files; renamed away on success.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Default inter-attempt delay. Retries run back-to-back unless configured.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::ZERO;

/// How often a paused worker checks whether it may continue.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);
