//! Station Downloader Core Library
//!
//! This library downloads time-series files produced by remote instruments
//! from FTP servers, selecting files by the station identifier and timestamp
//! embedded in each filename.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`model`] - Server profiles, windows, tasks, outcomes and summaries
//! - [`ftp`] - Session abstraction and per-worker connection manager
//! - [`resolver`] - Ordered remote directory probing with a per-run cache
//! - [`selector`] - Listing, parsing and filtering into download tasks
//! - [`download`] - Filename codec, worker planning, retries, progress and
//!   the engine that drives them

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod ftp;
pub mod model;
pub mod resolver;
pub mod selector;

// Re-export commonly used types
pub use download::{
    AttemptState, CancelToken, ConcurrencyConfig, DownloadEngine, DownloadError, DownloadRequest,
    DownloadRun, EngineError, FailureType, PauseToken, ProgressEvent, RetryDecision, RetryPolicy,
    WorkerPlan, WorkerPlanTable, classify_error,
};
pub use ftp::{ConnectionManager, ConnectionSettings, Connector, SessionError, SuppaConnector};
pub use model::{
    DownloadOutcome, DownloadTask, DownloadWindow, FailedFile, OutcomeStatus, RemoteFile,
    RunSummary, ServerProfile, SkippedDuplicate, StationSelection,
};
pub use selector::{ExtensionFilter, SelectionReport};
