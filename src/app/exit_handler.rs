//! Exit code logic for the downloader process.
//!
//! Single responsibility: map a finished run to the process exit outcome.

use station_downloader_core::RunSummary;

use crate::ProcessExit;

/// Clean runs succeed and runs with failed files are partial. A run that was
/// interrupted, or that left any task undispatched, fails.
pub(crate) fn determine_exit_outcome(summary: &RunSummary) -> ProcessExit {
    if summary.cancelled || summary.not_dispatched > 0 {
        ProcessExit::Failure
    } else if summary.failed.is_empty() {
        ProcessExit::Success
    } else {
        ProcessExit::Partial
    }
}
