//! Candidate selection: resolved listings to download tasks.
//!
//! For each station and each date of the window the selector resolves the
//! remote directory, parses every listed filename and keeps the entries that
//! belong to the station and fall inside the window. Candidates whose local
//! destination already exists become [`SkippedDuplicate`]s instead of tasks.
//!
//! Selection never writes to the server.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::download::filename::{local_destination, parse_filename, split_extension};
use crate::download::{CancelToken, DownloadError};
use crate::ftp::ConnectionManager;
use crate::model::{
    DownloadTask, DownloadWindow, RemoteFile, ServerProfile, SkippedDuplicate, StationSelection,
};
use crate::resolver::PathResolver;

/// Case-insensitive set of accepted extensions; empty accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: HashSet<String>,
}

impl ExtensionFilter {
    /// Builds a filter from extensions with or without the leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    #[must_use]
    pub fn accepts(&self, filename: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        split_extension(filename)
            .1
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Inputs of one selection pass.
#[derive(Debug, Clone)]
pub struct SelectionRequest<'a> {
    pub server: &'a ServerProfile,
    pub stations: &'a StationSelection,
    pub window: &'a DownloadWindow,
    pub local_root: &'a Path,
    pub extensions: &'a ExtensionFilter,
}

/// A (station, date) for which no remote directory resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGap {
    pub station_id: String,
    pub date: NaiveDate,
}

/// Result of selection.
#[derive(Debug, Clone, Default)]
pub struct SelectionReport {
    /// New work, indexed in discovery order.
    pub tasks: Vec<DownloadTask>,
    /// Candidates whose destination already exists.
    pub skipped: Vec<SkippedDuplicate>,
    /// Informational: dates without a resolvable directory.
    pub gaps: Vec<DateGap>,
    /// Listed names that did not parse; never downloaded nor reported as failed.
    pub unparsed: usize,
    /// Copies of an already selected file found in another directory.
    pub redundant: usize,
    /// Selection stopped early because cancellation was requested.
    pub cancelled: bool,
}

impl SelectionReport {
    /// Tasks plus skipped duplicates.
    #[must_use]
    pub fn total_candidates(&self) -> usize {
        self.tasks.len() + self.skipped.len()
    }
}

/// Runs selection over one live session.
///
/// # Errors
///
/// Returns [`DownloadError::Connection`] if the server cannot be reached;
/// listing failures on individual directories only narrow the result.
#[instrument(
    skip(manager, resolver, request, cancel),
    fields(server = %request.server.identity(), stations = request.stations.len())
)]
pub fn select(
    manager: &mut ConnectionManager,
    resolver: &PathResolver,
    request: &SelectionRequest<'_>,
    cancel: &CancelToken,
) -> Result<SelectionReport, DownloadError> {
    let mut report = SelectionReport::default();
    // Keyed by destination: one local file per (station, filename) per run.
    let mut seen: HashSet<PathBuf> = HashSet::new();

    'stations: for station in request.stations.iter() {
        for date in request.window.dates() {
            if cancel.is_cancelled() {
                info!(%station, %date, "cancellation requested, selection stopped");
                report.cancelled = true;
                break 'stations;
            }
            let Some(dir) = resolver.resolve(manager, request.server, station, date)? else {
                report.gaps.push(DateGap {
                    station_id: station.to_string(),
                    date,
                });
                continue;
            };

            let mut matched = Vec::new();
            for name in &dir.entries {
                if !request.extensions.accepts(name) {
                    continue;
                }
                let parsed = match parse_filename(name) {
                    Ok(parsed) => parsed,
                    Err(reason) => {
                        debug!(%reason, "excluding unparsable file");
                        report.unparsed += 1;
                        continue;
                    }
                };
                if parsed.station_id != station || !request.window.contains(&parsed.timestamp) {
                    continue;
                }
                matched.push(RemoteFile {
                    remote_dir: dir.path.clone(),
                    filename: name.clone(),
                    station_id: parsed.station_id,
                    timestamp: parsed.timestamp,
                });
            }
            matched.sort_by(|a, b| (a.timestamp, &a.filename).cmp(&(b.timestamp, &b.filename)));

            for remote in matched {
                let local_path = local_destination(
                    request.local_root,
                    &remote.station_id,
                    request.window,
                    &remote.filename,
                );
                if !seen.insert(local_path.clone()) {
                    debug!(
                        path = %remote.remote_path(),
                        local = %local_path.display(),
                        "same file already selected from another directory"
                    );
                    report.redundant += 1;
                    continue;
                }
                if destination_exists(&local_path) {
                    debug!(path = %local_path.display(), "already present locally");
                    report.skipped.push(SkippedDuplicate { remote, local_path });
                } else {
                    report.tasks.push(DownloadTask {
                        index: report.tasks.len(),
                        remote,
                        local_path,
                    });
                }
            }
        }
    }

    info!(
        tasks = report.tasks.len(),
        skipped = report.skipped.len(),
        gaps = report.gaps.len(),
        unparsed = report.unparsed,
        redundant = report.redundant,
        cancelled = report.cancelled,
        "selection complete"
    );
    Ok(report)
}

fn destination_exists(path: &Path) -> bool {
    path.try_exists().unwrap_or(false)
}
