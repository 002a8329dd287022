//! Download engine: selection plus a pool of blocking FTP workers.
//!
//! The engine owns no connection itself. Every network-touching phase runs
//! inside [`tokio::task::spawn_blocking`] with its own
//! [`ConnectionManager`], so sessions are never shared.
//!
//! # Concurrency Model
//!
//! - Worker count and progress batch interval come from [`WorkerPlanTable`]
//! - Workers pull task indexes from a shared atomic cursor
//! - Outcomes go to one [`ProgressAggregator`]
//! - Cancellation is polled once per station and date during selection,
//!   then between tasks and before each retry; a transfer already in flight
//!   is allowed to finish
//! - A [`PauseToken`] holds workers between tasks and attempts until resumed
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use station_downloader_core::download::{
//!     CancelToken, ConcurrencyConfig, DownloadEngine, DownloadRequest,
//! };
//! use station_downloader_core::ftp::{ConnectionSettings, SuppaConnector};
//! use station_downloader_core::selector::ExtensionFilter;
//! use station_downloader_core::{DownloadWindow, ServerProfile, StationSelection};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(
//!     Arc::new(SuppaConnector),
//!     ConnectionSettings::default(),
//!     ConcurrencyConfig::default(),
//! )?;
//! let date = NaiveDate::from_ymd_opt(2025, 11, 18).ok_or("bad date")?;
//! let request = DownloadRequest {
//!     server: ServerProfile::new("ftp.example.com", "user", "secret"),
//!     stations: StationSelection::new(["STATION1"]),
//!     window: DownloadWindow::new(date, date)?,
//!     local_root: PathBuf::from("./data"),
//!     extensions: ExtensionFilter::new(["txt"]),
//! };
//! let run = engine.download(&request, None, &CancelToken::new()).await?;
//! println!("{} ok, {} failed", run.summary.succeeded, run.summary.failed_count());
//! # Ok(())
//! # }
//! ```

mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::NaiveDateTime;
use futures_util::future::join_all;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

use super::plan::WorkerPlanTable;
use super::progress::{ProgressAggregator, ProgressEvent};
use super::retry::RetryPolicy;
use super::DownloadError;
use crate::ftp::{ConnectionManager, ConnectionSettings, Connector, with_connection};
use crate::model::{
    DownloadTask, DownloadWindow, RunSummary, ServerProfile, SkippedDuplicate, StationSelection,
};
use crate::resolver::PathResolver;
use crate::selector::{
    DateGap, ExtensionFilter, SelectionReport, SelectionRequest, select as select_candidates,
};

use worker::{WorkerContext, run_worker};

/// Minimum allowed worker cap.
const MIN_WORKERS: usize = 1;

/// Maximum allowed worker cap.
pub const MAX_WORKERS: usize = 64;

/// Errors that abort a run before any task is scheduled.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The server profile cannot be used at all.
    #[error("invalid server profile: {reason}")]
    InvalidServerProfile {
        /// What is wrong with the profile.
        reason: String,
    },

    /// The window's start is after its end.
    #[error("invalid download window: start {start} is after end {end}")]
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    /// Invalid worker cap provided.
    #[error("invalid concurrency value {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The server could not be reached while selecting candidates.
    #[error("candidate selection failed: {source}")]
    Selection {
        #[source]
        source: DownloadError,
    },

    /// A connection test or directory preview failed.
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: DownloadError,
    },

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// Creates an invalid-profile error.
    pub fn invalid_profile(reason: impl Into<String>) -> Self {
        Self::InvalidServerProfile {
            reason: reason.into(),
        }
    }
}

/// Cooperative cancellation flag shared by all workers of a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; no new task or retry starts afterwards.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pause flag shared by all workers of an engine.
///
/// While paused, workers finish the transfer in flight and then wait before
/// taking the next task or starting the next attempt. Cancellation still
/// ends a paused run.
#[derive(Debug, Clone, Default)]
pub struct PauseToken(Arc<AtomicBool>);

impl PauseToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Worker sizing and retry behavior.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyConfig {
    /// Upper bound on the planned worker count.
    pub max_workers: Option<usize>,
    pub retry: RetryPolicy,
    pub plan_table: WorkerPlanTable,
}

impl ConcurrencyConfig {
    /// Checks the worker cap.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the cap is outside
    /// `1..=64`.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self.max_workers {
            Some(value) if !(MIN_WORKERS..=MAX_WORKERS).contains(&value) => {
                Err(EngineError::InvalidConcurrency { value })
            }
            _ => Ok(()),
        }
    }
}

/// Everything one download run needs, owned so it can cross into blocking
/// tasks.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub server: ServerProfile,
    pub stations: StationSelection,
    pub window: DownloadWindow,
    pub local_root: PathBuf,
    pub extensions: ExtensionFilter,
}

impl DownloadRequest {
    fn as_selection(&self) -> SelectionRequest<'_> {
        SelectionRequest {
            server: &self.server,
            stations: &self.stations,
            window: &self.window,
            local_root: &self.local_root,
            extensions: &self.extensions,
        }
    }
}

/// Result of [`DownloadEngine::download`].
#[derive(Debug, Clone)]
pub struct DownloadRun {
    pub summary: RunSummary,
    /// Dates with no resolvable remote directory.
    pub gaps: Vec<DateGap>,
    /// Candidates skipped because the local file exists.
    pub skipped: Vec<SkippedDuplicate>,
}

/// Coordinates selection and the worker pool.
pub struct DownloadEngine {
    connector: Arc<dyn Connector>,
    settings: ConnectionSettings,
    config: ConcurrencyConfig,
    pause: PauseToken,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("settings", &self.settings)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the worker cap is out
    /// of range.
    #[instrument(level = "debug", skip(connector, config))]
    pub fn new(
        connector: Arc<dyn Connector>,
        settings: ConnectionSettings,
        config: ConcurrencyConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        debug!(
            max_workers = ?config.max_workers,
            max_attempts = config.retry.max_attempts(),
            retry_delay_ms = config.retry.base_delay().as_millis(),
            "creating download engine"
        );

        Ok(Self {
            connector,
            settings,
            config,
            pause: PauseToken::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ConcurrencyConfig {
        &self.config
    }

    /// Handle that pauses and resumes this engine's workers.
    #[must_use]
    pub fn pause_handle(&self) -> PauseToken {
        self.pause.clone()
    }

    /// Connects, logs in, reads the working directory and disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidServerProfile`] for unusable profiles
    /// and [`EngineError::Remote`] when the server cannot be reached.
    #[instrument(skip(self, server), fields(server = %server.identity()))]
    pub async fn check_connection(&self, server: &ServerProfile) -> Result<String, EngineError> {
        server.validate()?;
        let connector = Arc::clone(&self.connector);
        let server = server.clone();
        let settings = self.settings;

        let cwd = tokio::task::spawn_blocking(move || {
            with_connection(connector, &server, settings, ConnectionManager::current_dir)
        })
        .await?
        .map_err(|source| EngineError::Remote {
            operation: "connection test",
            source,
        })?;

        info!(%cwd, "connection test succeeded");
        Ok(cwd)
    }

    /// Lists one remote directory without downloading anything.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] when the directory cannot be listed.
    #[instrument(skip(self, server), fields(server = %server.identity()))]
    pub async fn preview_listing(
        &self,
        server: &ServerProfile,
        path: &str,
    ) -> Result<Vec<String>, EngineError> {
        server.validate()?;
        let connector = Arc::clone(&self.connector);
        let server = server.clone();
        let settings = self.settings;
        let path = path.to_string();

        let entries = tokio::task::spawn_blocking(move || {
            with_connection(connector, &server, settings, |manager| manager.list_dir(&path))
        })
        .await?
        .map_err(|source| EngineError::Remote {
            operation: "directory preview",
            source,
        })?;

        debug!(entries = entries.len(), "directory preview");
        Ok(entries)
    }

    /// Resolves directories and builds the task list.
    ///
    /// `cancel` is polled once per station and date; a cancelled selection
    /// returns what was found so far with `cancelled` set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Selection`] if the server cannot be reached.
    pub async fn select(
        &self,
        request: &DownloadRequest,
        cancel: &CancelToken,
    ) -> Result<SelectionReport, EngineError> {
        request.server.validate()?;
        let connector = Arc::clone(&self.connector);
        let settings = self.settings;
        let request = request.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            let resolver = PathResolver::new();
            with_connection(connector, &request.server, settings, |manager| {
                select_candidates(manager, &resolver, &request.as_selection(), &cancel)
            })
        })
        .await?
        .map_err(|source| EngineError::Selection { source })
    }

    /// Downloads `tasks` with a planned worker pool.
    ///
    /// `skipped` is the number of duplicates found during selection; they
    /// count towards the summary's total. Individual failures never make
    /// this fail: they are reported in the summary.
    #[instrument(skip(self, server, tasks, events, cancel), fields(server = %server.identity(), tasks = tasks.len()))]
    pub async fn run(
        &self,
        server: &ServerProfile,
        tasks: Vec<DownloadTask>,
        skipped: usize,
        events: Option<UnboundedSender<ProgressEvent>>,
        cancel: &CancelToken,
    ) -> RunSummary {
        let plan = self
            .config
            .plan_table
            .plan(tasks.len(), self.config.max_workers);
        let aggregator = Arc::new(ProgressAggregator::new(
            tasks.len() + skipped,
            skipped,
            plan.batch_interval,
            events,
        ));

        if tasks.is_empty() {
            info!(skipped, "nothing to download");
            return aggregator.finalize(cancel.is_cancelled());
        }

        info!(
            workers = plan.workers,
            batch_interval = plan.batch_interval,
            "starting workers"
        );

        let tasks: Arc<[DownloadTask]> = tasks.into();
        let cursor = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..plan.workers)
            .map(|worker_id| {
                let ctx = WorkerContext {
                    worker_id,
                    connector: Arc::clone(&self.connector),
                    server: server.clone(),
                    settings: self.settings,
                    retry: self.config.retry.clone(),
                    tasks: Arc::clone(&tasks),
                    cursor: Arc::clone(&cursor),
                    aggregator: Arc::clone(&aggregator),
                    cancel: cancel.clone(),
                    pause: self.pause.clone(),
                };
                tokio::task::spawn_blocking(move || run_worker(ctx))
            })
            .collect();

        for result in join_all(handles).await {
            // A panicked worker's in-flight task stays undispatched.
            if let Err(e) = result {
                warn!(error = %e, "worker panicked");
            }
        }

        let summary = aggregator.finalize(cancel.is_cancelled());
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed_count(),
            skipped = summary.skipped,
            not_dispatched = summary.not_dispatched,
            bytes = summary.bytes_downloaded,
            elapsed_ms = summary.elapsed.as_millis(),
            cancelled = summary.cancelled,
            "run complete"
        );
        summary
    }

    /// Selection followed by [`DownloadEngine::run`].
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] only for run-aborting problems: an unusable
    /// profile or an unreachable server during selection.
    #[instrument(skip_all, fields(server = %request.server.identity()))]
    pub async fn download(
        &self,
        request: &DownloadRequest,
        events: Option<UnboundedSender<ProgressEvent>>,
        cancel: &CancelToken,
    ) -> Result<DownloadRun, EngineError> {
        let report = self.select(request, cancel).await?;
        let SelectionReport {
            tasks,
            skipped,
            gaps,
            ..
        } = report;

        for gap in &gaps {
            debug!(station = %gap.station_id, date = %gap.date, "date gap");
        }

        let summary = self
            .run(&request.server, tasks, skipped.len(), events, cancel)
            .await;
        Ok(DownloadRun {
            summary,
            gaps,
            skipped,
        })
    }
}
