//! Data model shared by the selector, the worker pool and the aggregator.
//!
//! Values in this module are handed to the engine by the surrounding
//! collaborators (configuration, UI) and handed back as summaries. None of
//! them perform I/O.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;

use crate::download::EngineError;

/// Default FTP control port.
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Connection details for one FTP server.
///
/// Identity is `host:port:username`. The profile is immutable for the
/// duration of a run and cloned into every worker.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerProfile {
    /// Hostname or IP address.
    pub host: String,
    /// Control port.
    pub port: u16,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Remote directory that every path template is rooted at.
    pub base_path: Option<String>,
}

impl ServerProfile {
    /// Creates a profile on the default port with no base path.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_FTP_PORT,
            username: username.into(),
            password: password.into(),
            base_path: None,
        }
    }

    /// Sets the control port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the remote base path.
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Stable identity used for cache keys and log fields.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}:{}:{}", self.host, self.port, self.username)
    }

    /// Base directory with trailing slashes removed; empty means the login root.
    #[must_use]
    pub fn base_dir(&self) -> &str {
        self.base_path
            .as_deref()
            .map(str::trim)
            .map_or("", |p| p.trim_end_matches('/'))
    }

    /// Checks that the profile can be used to open a session at all.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidServerProfile`] when the host or
    /// username is blank, the host contains whitespace, or the port is 0.
    pub fn validate(&self) -> Result<(), EngineError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(EngineError::invalid_profile("host is empty"));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(EngineError::invalid_profile(format!(
                "host '{host}' contains whitespace"
            )));
        }
        if self.port == 0 {
            return Err(EngineError::invalid_profile("port must be between 1 and 65535"));
        }
        if self.username.trim().is_empty() {
            return Err(EngineError::invalid_profile("username is empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for ServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("base_path", &self.base_path)
            .finish()
    }
}

/// Ordered, duplicate-free set of case-sensitive station identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationSelection {
    stations: Vec<String>,
}

impl StationSelection {
    /// Builds a selection, trimming entries and dropping blanks and repeats.
    ///
    /// First occurrence wins, so iteration order follows the input.
    pub fn new<I, S>(stations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for station in stations {
            let station = station.into().trim().to_string();
            if !station.is_empty() && !out.contains(&station) {
                out.push(station);
            }
        }
        Self { stations: out }
    }

    #[must_use]
    pub fn contains(&self, station_id: &str) -> bool {
        self.stations.iter().any(|s| s == station_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.stations.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

/// Inclusive date range with optional time-of-day bounds.
///
/// The effective window runs from `start_date + start_time` to
/// `end_date + end_time`. A missing start time means midnight, a missing end
/// time means `23:59:59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadWindow {
    start_date: NaiveDate,
    end_date: NaiveDate,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
}

impl DownloadWindow {
    /// Creates a whole-day window.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWindow`] if `end_date` precedes `start_date`.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, EngineError> {
        Self::with_times(start_date, end_date, None, None)
    }

    /// Creates a window with optional time-of-day bounds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWindow`] if the resulting start bound is
    /// after the end bound.
    pub fn with_times(
        start_date: NaiveDate,
        end_date: NaiveDate,
        start_time: Option<NaiveTime>,
        end_time: Option<NaiveTime>,
    ) -> Result<Self, EngineError> {
        let window = Self {
            start_date,
            end_date,
            start_time,
            end_time,
        };
        if window.start_bound() > window.end_bound() {
            return Err(EngineError::InvalidWindow {
                start: window.start_bound(),
                end: window.end_bound(),
            });
        }
        Ok(window)
    }

    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    #[must_use]
    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// First instant inside the window.
    #[must_use]
    pub fn start_bound(&self) -> NaiveDateTime {
        self.start_date.and_time(self.start_time.unwrap_or(NaiveTime::MIN))
    }

    /// Last instant inside the window.
    #[must_use]
    pub fn end_bound(&self) -> NaiveDateTime {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        self.end_date.and_time(self.end_time.unwrap_or(end_of_day))
    }

    /// Whether a filename timestamp falls inside the window (both ends inclusive).
    #[must_use]
    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        (self.start_bound()..=self.end_bound()).contains(timestamp)
    }

    /// Every calendar date covered by the window, in ascending order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end_date;
        self.start_date.iter_days().take_while(move |d| *d <= end)
    }

    /// Local folder label for the window, `DDMMYYYY_DDMMYYYY`.
    #[must_use]
    pub fn folder_label(&self) -> String {
        format!(
            "{}_{}",
            self.start_date.format("%d%m%Y"),
            self.end_date.format("%d%m%Y")
        )
    }
}

/// A remote file whose name parsed into a station and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFile {
    /// Directory the file was listed in.
    pub remote_dir: String,
    /// Raw filename as returned by the listing.
    pub filename: String,
    /// Station parsed from the filename.
    pub station_id: String,
    /// Primary timestamp parsed from the filename.
    pub timestamp: NaiveDateTime,
}

impl RemoteFile {
    /// Full remote path of the file.
    #[must_use]
    pub fn remote_path(&self) -> String {
        join_remote(&self.remote_dir, &self.filename)
    }
}

/// Joins a remote directory and a name with exactly one `/`.
#[must_use]
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// One remote file bound to its local destination.
///
/// `index` is the discovery position assigned by the selector and is used to
/// keep failure reports in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub index: usize,
    pub remote: RemoteFile,
    pub local_path: PathBuf,
}

/// A candidate that was not turned into a task because the destination exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDuplicate {
    pub remote: RemoteFile,
    pub local_path: PathBuf,
}

/// Terminal status of a task or candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    SkippedDuplicate,
}

/// Final result of one task, produced by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub task_index: usize,
    pub remote_path: String,
    pub station_id: String,
    pub local_path: PathBuf,
    pub status: OutcomeStatus,
    pub failure_reason: Option<String>,
    pub attempted_at: DateTime<Utc>,
    pub bytes: u64,
    pub attempts: u32,
}

impl DownloadOutcome {
    /// Successful download of `bytes` bytes after `attempts` attempts.
    #[must_use]
    pub fn success(task: &DownloadTask, bytes: u64, attempts: u32) -> Self {
        Self {
            task_index: task.index,
            remote_path: task.remote.remote_path(),
            station_id: task.remote.station_id.clone(),
            local_path: task.local_path.clone(),
            status: OutcomeStatus::Success,
            failure_reason: None,
            attempted_at: Utc::now(),
            bytes,
            attempts,
        }
    }

    /// Terminal failure with the last failure reason.
    #[must_use]
    pub fn failed(task: &DownloadTask, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            task_index: task.index,
            remote_path: task.remote.remote_path(),
            station_id: task.remote.station_id.clone(),
            local_path: task.local_path.clone(),
            status: OutcomeStatus::Failed,
            failure_reason: Some(reason.into()),
            attempted_at: Utc::now(),
            bytes: 0,
            attempts,
        }
    }
}

/// A terminally failed file as reported to the history collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub remote_path: String,
    pub station_id: String,
    pub reason: String,
    pub attempts: u32,
}

/// Totals for one run.
///
/// `succeeded + failed + skipped + not_dispatched == total_candidates`;
/// `not_dispatched` is only non-zero for cancelled runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_candidates: usize,
    pub succeeded: usize,
    /// Failed files in discovery order.
    pub failed: Vec<FailedFile>,
    pub skipped: usize,
    pub not_dispatched: usize,
    pub bytes_downloaded: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl RunSummary {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Number of candidates that reached a terminal state.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed.len() + self.skipped
    }

    /// True when nothing failed and nothing was left undispatched.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.not_dispatched == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_profile_debug_redacts_password() {
        let profile = ServerProfile::new("ftp.example.com", "user", "hunter2");
        let debug = format!("{profile:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_profile_validate_rejects_blank_host_and_zero_port() {
        assert!(ServerProfile::new(" ", "u", "p").validate().is_err());
        assert!(ServerProfile::new("h", "u", "p").with_port(0).validate().is_err());
        assert!(ServerProfile::new("h", "", "p").validate().is_err());
        assert!(ServerProfile::new("bad host", "u", "p").validate().is_err());
        assert!(ServerProfile::new("h", "u", "").validate().is_ok());
    }

    #[test]
    fn test_profile_base_dir_trims_trailing_slash() {
        let profile = ServerProfile::new("h", "u", "p").with_base_path("/rtutrg/");
        assert_eq!(profile.base_dir(), "/rtutrg");
        assert_eq!(ServerProfile::new("h", "u", "p").base_dir(), "");
        let root = ServerProfile::new("h", "u", "p").with_base_path("/");
        assert_eq!(root.base_dir(), "");
    }

    #[test]
    fn test_profile_identity() {
        let profile = ServerProfile::new("h", "u", "p").with_port(2121);
        assert_eq!(profile.identity(), "h:2121:u");
    }

    #[test]
    fn test_station_selection_dedupes_preserving_order() {
        let sel = StationSelection::new(["B1", "A1", "B1", " ", "a1"]);
        assert_eq!(sel.iter().collect::<Vec<_>>(), vec!["B1", "A1", "a1"]);
        assert!(sel.contains("A1"));
        assert!(!sel.contains("b1"));
    }

    #[test]
    fn test_window_rejects_inverted_dates() {
        assert!(DownloadWindow::new(date(2025, 11, 20), date(2025, 11, 18)).is_err());
    }

    #[test]
    fn test_window_rejects_inverted_times_on_same_day() {
        let result = DownloadWindow::with_times(
            date(2025, 11, 18),
            date(2025, 11, 18),
            NaiveTime::from_hms_opt(12, 0, 0),
            NaiveTime::from_hms_opt(11, 0, 0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let window = DownloadWindow::with_times(
            date(2025, 11, 18),
            date(2025, 11, 20),
            NaiveTime::from_hms_opt(6, 0, 0),
            NaiveTime::from_hms_opt(18, 0, 0),
        )
        .unwrap();
        let at = |d: u32, h: u32, m: u32| date(2025, 11, d).and_hms_opt(h, m, 0).unwrap();
        assert!(window.contains(&at(18, 6, 0)));
        assert!(window.contains(&at(20, 18, 0)));
        assert!(window.contains(&at(19, 23, 0)));
        assert!(!window.contains(&at(18, 5, 59)));
        assert!(!window.contains(&at(20, 18, 1)));
    }

    #[test]
    fn test_window_whole_days_cover_last_second() {
        let window = DownloadWindow::new(date(2025, 11, 18), date(2025, 11, 18)).unwrap();
        let last = date(2025, 11, 18).and_hms_opt(23, 59, 59).unwrap();
        assert!(window.contains(&last));
    }

    #[test]
    fn test_window_dates_and_folder_label() {
        let window = DownloadWindow::new(date(2025, 11, 30), date(2025, 12, 2)).unwrap();
        let dates: Vec<_> = window.dates().collect();
        assert_eq!(dates, vec![date(2025, 11, 30), date(2025, 12, 1), date(2025, 12, 2)]);
        assert_eq!(window.folder_label(), "30112025_02122025");
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/a/b/", "f.txt"), "/a/b/f.txt");
        assert_eq!(join_remote("/a", "f.txt"), "/a/f.txt");
        assert_eq!(join_remote("", "f.txt"), "f.txt");
    }
}
