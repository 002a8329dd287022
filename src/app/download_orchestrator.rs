//! Builds the engine and runs one download: selection under a spinner,
//! then the worker pool under a progress bar.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use station_downloader_core::{
    CancelToken, DownloadEngine, DownloadRun, RunSummary, SuppaConnector,
};
use tracing::{debug, info, warn};

use crate::app::config_runtime::ResolvedDownload;
use crate::app::{progress_manager, terminal};

pub(crate) async fn run_download(
    resolved: &ResolvedDownload,
    quiet: bool,
    cancel: &CancelToken,
) -> Result<DownloadRun> {
    let engine = DownloadEngine::new(
        Arc::new(SuppaConnector),
        resolved.settings,
        resolved.concurrency.clone(),
    )?;
    let request = &resolved.request;
    let interactive = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        quiet,
        terminal::is_dumb_terminal(),
    );

    let (spinner, spinner_stop) =
        progress_manager::spawn_selection_spinner(interactive, request.stations.len());
    let selection = engine.select(request, cancel).await;
    spinner_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }
    let selection = selection
        .with_context(|| format!("Could not scan {}", request.server.identity()))?;

    info!(
        tasks = selection.tasks.len(),
        skipped = selection.skipped.len(),
        gaps = selection.gaps.len(),
        unparsed = selection.unparsed,
        "selection complete"
    );
    for gap in &selection.gaps {
        debug!(station = %gap.station_id, date = %gap.date, "no remote directory for date");
    }

    let (events, bar) = progress_manager::spawn_progress_bar(interactive);
    let summary = engine
        .run(
            &request.server,
            selection.tasks,
            selection.skipped.len(),
            events,
            cancel,
        )
        .await;
    if let Some(handle) = bar {
        let _ = handle.await;
    }

    if summary.cancelled {
        warn!(
            not_dispatched = summary.not_dispatched,
            "Interrupted. Run again to fetch the remaining files."
        );
    }

    Ok(DownloadRun {
        summary,
        gaps: selection.gaps,
        skipped: selection.skipped,
    })
}

/// Human-readable end-of-run summary.
pub(crate) fn format_summary(summary: &RunSummary) -> String {
    let mut out = format!(
        "{} downloaded, {} failed, {} skipped of {} files ({} bytes in {:.1}s)",
        summary.succeeded,
        summary.failed_count(),
        summary.skipped,
        summary.total_candidates,
        summary.bytes_downloaded,
        summary.elapsed.as_secs_f64(),
    );
    if summary.not_dispatched > 0 {
        out.push_str(&format!("\n{} not started (interrupted)", summary.not_dispatched));
    }
    for failed in &summary.failed {
        out.push_str(&format!(
            "\n  FAILED {} after {} attempt(s): {}",
            failed.remote_path, failed.attempts, failed.reason
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use station_downloader_core::FailedFile;

    use super::*;

    #[test]
    fn test_format_summary_lists_failures_in_order() {
        let summary = RunSummary {
            total_candidates: 4,
            succeeded: 1,
            skipped: 1,
            failed: vec![
                FailedFile {
                    remote_path: "/a/S1251118100000.txt".to_string(),
                    station_id: "S1".to_string(),
                    reason: "timed out".to_string(),
                    attempts: 2,
                },
                FailedFile {
                    remote_path: "/a/S1251118110000.txt".to_string(),
                    station_id: "S1".to_string(),
                    reason: "550 not found".to_string(),
                    attempts: 1,
                },
            ],
            bytes_downloaded: 2048,
            elapsed: Duration::from_millis(1500),
            ..RunSummary::default()
        };
        let text = format_summary(&summary);
        assert!(text.starts_with("1 downloaded, 2 failed, 1 skipped of 4 files (2048 bytes in 1.5s)"));
        let first = text.find("S1251118100000").expect("first failure");
        let second = text.find("S1251118110000").expect("second failure");
        assert!(first < second);
        assert!(!text.contains("not started"));
    }

    #[test]
    fn test_format_summary_reports_undispatched() {
        let summary = RunSummary {
            total_candidates: 5,
            succeeded: 2,
            not_dispatched: 3,
            cancelled: true,
            ..RunSummary::default()
        };
        assert!(format_summary(&summary).contains("3 not started (interrupted)"));
    }
}
