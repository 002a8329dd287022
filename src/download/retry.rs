//! Retry policy and per-task attempt state machine.
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - connection, listing and transfer failures
//!   that may succeed with a fresh session
//! - [`FailureType::Permanent`] - local file system errors, empty remote
//!   files and cancellation, which a retry would not fix
//!
//! The [`RetryPolicy`] decides whether to retry based on failure type and
//! attempt count. [`AttemptState`] threads a task through
//! `Pending -> Attempting(n) -> Succeeded | Failed` using that policy.
//!
//! # Example
//!
//! ```
//! use station_downloader_core::download::{AttemptState, DownloadError, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! let state = AttemptState::Pending.begin();
//! let error = DownloadError::empty_remote_file("/data/A1251118104500.txt");
//! let (state, delay) = state.advance(Err(error), &policy);
//! assert!(state.is_terminal());
//! assert!(delay.is_none());
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::DEFAULT_RETRY_DELAY;

/// Default total attempts per task: the first try plus one retry.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to non-zero delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of attempt failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on a fresh session.
    Transient,

    /// Failure that will not succeed regardless of retries.
    Permanent,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior.
///
/// # Default Values
///
/// - `max_attempts`: 2 (one retry)
/// - `base_delay`: zero (retry immediately)
/// - `max_delay`: 32 seconds
/// - `backoff_multiplier`: 2.0
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter
/// ```
///
/// Jitter is only added when `base_delay` is non-zero.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Delay before the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt.
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_attempts` includes the initial attempt and is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with `retries` additional attempts after the first.
    #[must_use]
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(level = "trace", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + Self::calculate_jitter()
    }

    fn calculate_jitter() -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies an attempt error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Connection | Transient |
/// | Listing | Transient |
/// | Retrieval (network) | Transient |
/// | Io (local) | Permanent |
/// | EmptyRemoteFile | Permanent |
/// | Cancelled | Permanent |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::Connection { .. }
        | DownloadError::Listing { .. }
        | DownloadError::Retrieval { .. } => FailureType::Transient,
        DownloadError::Io { .. }
        | DownloadError::EmptyRemoteFile { .. }
        | DownloadError::Cancelled { .. } => FailureType::Permanent,
    }
}

/// Lifecycle of one task's attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    /// Not yet attempted.
    Pending,
    /// Attempt `n` (1-indexed) is about to run or running.
    Attempting(u32),
    /// Terminal success.
    Succeeded {
        /// Attempts used.
        attempts: u32,
        /// Bytes written.
        bytes: u64,
    },
    /// Terminal failure with the last reason.
    Failed {
        /// Attempts used.
        attempts: u32,
        /// Last failure reason.
        reason: String,
    },
}

impl AttemptState {
    /// `Pending -> Attempting(1)`; other states are returned unchanged.
    #[must_use]
    pub fn begin(self) -> Self {
        match self {
            Self::Pending => Self::Attempting(1),
            other => other,
        }
    }

    /// Feeds the result of the current attempt through `policy`.
    ///
    /// Returns the next state and, when another attempt follows, the delay to
    /// wait first. Non-`Attempting` states are returned unchanged.
    #[must_use]
    pub fn advance(
        self,
        result: Result<u64, DownloadError>,
        policy: &RetryPolicy,
    ) -> (Self, Option<Duration>) {
        let Self::Attempting(attempt) = self else {
            return (self, None);
        };
        match result {
            Ok(bytes) => (
                Self::Succeeded {
                    attempts: attempt,
                    bytes,
                },
                None,
            ),
            Err(error) => match policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry { delay, attempt } => (Self::Attempting(attempt), Some(delay)),
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, %reason, error = %error, "not retrying");
                    (
                        Self::Failed {
                            attempts: attempt,
                            reason: error.to_string(),
                        },
                        None,
                    )
                }
            },
        }
    }

    /// Moves an in-flight state to `Failed` because the run was cancelled
    /// before attempt `n` could start; `n - 1` attempts were made.
    #[must_use]
    pub fn cancel(self, reason: impl Into<String>) -> Self {
        match self {
            Self::Attempting(attempt) => Self::Failed {
                attempts: attempt.saturating_sub(1),
                reason: reason.into(),
            },
            other => other,
        }
    }

    /// Whether the state is `Succeeded` or `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}
