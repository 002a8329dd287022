//! JSON run report for history persistence.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use station_downloader_core::{DownloadRequest, DownloadRun, FailedFile};

#[derive(Debug, Serialize)]
struct GapEntry<'a> {
    station_id: &'a str,
    date: NaiveDate,
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    generated_at: String,
    server: String,
    stations: Vec<&'a str>,
    window_start: String,
    window_end: String,
    local_root: String,
    total_candidates: usize,
    succeeded: usize,
    skipped: usize,
    not_dispatched: usize,
    bytes_downloaded: u64,
    elapsed_ms: u128,
    cancelled: bool,
    failed: &'a [FailedFile],
    gaps: Vec<GapEntry<'a>>,
}

/// Serializes the run to pretty JSON.
pub(crate) fn render_report(request: &DownloadRequest, run: &DownloadRun) -> Result<String> {
    let summary = &run.summary;
    let report = RunReport {
        generated_at: Utc::now().to_rfc3339(),
        server: request.server.identity(),
        stations: request.stations.iter().collect(),
        window_start: request.window.start_bound().to_string(),
        window_end: request.window.end_bound().to_string(),
        local_root: request.local_root.display().to_string(),
        total_candidates: summary.total_candidates,
        succeeded: summary.succeeded,
        skipped: summary.skipped,
        not_dispatched: summary.not_dispatched,
        bytes_downloaded: summary.bytes_downloaded,
        elapsed_ms: summary.elapsed.as_millis(),
        cancelled: summary.cancelled,
        failed: &summary.failed,
        gaps: run
            .gaps
            .iter()
            .map(|gap| GapEntry {
                station_id: &gap.station_id,
                date: gap.date,
            })
            .collect(),
    };
    serde_json::to_string_pretty(&report).context("Failed to serialize run report")
}

pub(crate) fn write_report(path: &Path, request: &DownloadRequest, run: &DownloadRun) -> Result<()> {
    let json = render_report(request, run)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory '{}'", parent.display()))?;
    }
    fs::write(path, json)
        .with_context(|| format!("Failed to write run report '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use station_downloader_core::selector::DateGap;
    use station_downloader_core::{
        DownloadWindow, ExtensionFilter, RunSummary, ServerProfile, StationSelection,
    };

    use super::*;

    fn request() -> DownloadRequest {
        let date = NaiveDate::from_ymd_opt(2025, 11, 18).expect("date");
        DownloadRequest {
            server: ServerProfile::new("ftp.example.com", "ops", "secret"),
            stations: StationSelection::new(["STATION1"]),
            window: DownloadWindow::new(date, date).expect("window"),
            local_root: PathBuf::from("/data"),
            extensions: ExtensionFilter::default(),
        }
    }

    fn run() -> DownloadRun {
        DownloadRun {
            summary: RunSummary {
                total_candidates: 2,
                succeeded: 1,
                failed: vec![FailedFile {
                    remote_path: "/ARCHIVE/2025/11/18/STATION1251118104500.txt".to_string(),
                    station_id: "STATION1".to_string(),
                    reason: "transfer failed".to_string(),
                    attempts: 2,
                }],
                ..RunSummary::default()
            },
            gaps: vec![DateGap {
                station_id: "STATION1".to_string(),
                date: NaiveDate::from_ymd_opt(2025, 11, 18).expect("date"),
            }],
            skipped: Vec::new(),
        }
    }

    #[test]
    fn test_report_contains_failures_and_no_password() {
        let json = render_report(&request(), &run()).expect("renders");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["succeeded"], 1);
        assert_eq!(
            value["failed"][0]["remote_path"],
            "/ARCHIVE/2025/11/18/STATION1251118104500.txt"
        );
        assert_eq!(value["failed"][0]["reason"], "transfer failed");
        assert_eq!(value["gaps"][0]["date"], "2025-11-18");
        assert_eq!(value["window_end"], "2025-11-18 23:59:59");
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_write_report_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reports").join("run.json");
        write_report(&path, &request(), &run()).expect("writes");
        assert!(path.exists());
    }
}
