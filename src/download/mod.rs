//! Download engine for station time-series files.
//!
//! This module turns a resolved task list into files on disk:
//!
//! - [`filename`] parses `STATION` + `YYMMDDHHMMSS` names and maps them to
//!   local paths
//! - [`WorkerPlanTable`] sizes the worker pool from the task count
//! - [`RetryPolicy`] and [`AttemptState`] drive each task's attempts
//! - [`ProgressAggregator`] collects outcomes into a [`crate::RunSummary`]
//! - [`DownloadEngine`] ties selection and workers together
//!
//! Per-task failures never abort a run; they end up in the summary's
//! failed list.

pub(crate) mod constants;
mod engine;
mod error;
pub mod filename;
mod plan;
mod progress;
mod retry;

pub use engine::{
    CancelToken, ConcurrencyConfig, DownloadEngine, DownloadRequest, DownloadRun, EngineError,
    MAX_WORKERS, PauseToken,
};
pub use error::DownloadError;
pub use plan::{PlanStep, WorkerPlan, WorkerPlanTable};
pub use progress::{ProgressAggregator, ProgressEvent};
pub use retry::{
    AttemptState, DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error,
};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
