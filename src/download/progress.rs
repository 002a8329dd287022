//! Thread-safe accumulation of task outcomes.
//!
//! Workers call [`ProgressAggregator::record`] from blocking threads. The
//! lock only covers the counter update; progress events are sent after it is
//! released, every `batch_interval` outcomes and once more at finalization.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::model::{DownloadOutcome, FailedFile, OutcomeStatus, RunSummary};

/// Batched progress notification for a presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub processed: usize,
    pub total: usize,
    /// `processed / total * 100`, or 100 for an empty run.
    pub percent: f64,
    /// Set on the event emitted by [`ProgressAggregator::finalize`].
    pub finished: bool,
}

#[derive(Debug, Default)]
struct Counters {
    recorded: HashSet<usize>,
    succeeded: usize,
    skipped: usize,
    bytes: u64,
    failures: BTreeMap<usize, FailedFile>,
    since_event: usize,
}

impl Counters {
    fn processed(&self) -> usize {
        self.succeeded + self.failures.len() + self.skipped
    }

    fn event(&self, total: usize, finished: bool) -> ProgressEvent {
        let processed = self.processed();
        #[allow(clippy::cast_precision_loss)]
        let percent = if total == 0 {
            100.0
        } else {
            processed as f64 / total as f64 * 100.0
        };
        ProgressEvent {
            succeeded: self.succeeded,
            failed: self.failures.len(),
            skipped: self.skipped,
            processed,
            total,
            percent,
            finished,
        }
    }
}

/// Collects terminal outcomes into a [`RunSummary`].
#[derive(Debug)]
pub struct ProgressAggregator {
    counters: Mutex<Counters>,
    total: usize,
    batch_interval: usize,
    events: Option<UnboundedSender<ProgressEvent>>,
    started: Instant,
}

impl ProgressAggregator {
    /// `total` counts every candidate, including the `skipped` duplicates
    /// found during selection.
    #[must_use]
    pub fn new(
        total: usize,
        skipped: usize,
        batch_interval: usize,
        events: Option<UnboundedSender<ProgressEvent>>,
    ) -> Self {
        Self {
            counters: Mutex::new(Counters {
                skipped,
                ..Counters::default()
            }),
            total,
            batch_interval: batch_interval.max(1),
            events,
            started: Instant::now(),
        }
    }

    /// Records the terminal outcome of one task.
    ///
    /// Returns `false` (and changes nothing) if an outcome for the same task
    /// index was already recorded.
    pub fn record(&self, outcome: DownloadOutcome) -> bool {
        let event = {
            let mut counters = self.lock();
            if !counters.recorded.insert(outcome.task_index) {
                debug!(task = outcome.task_index, "duplicate outcome ignored");
                return false;
            }
            match outcome.status {
                OutcomeStatus::Success => {
                    counters.succeeded += 1;
                    counters.bytes += outcome.bytes;
                }
                OutcomeStatus::SkippedDuplicate => counters.skipped += 1,
                OutcomeStatus::Failed => {
                    counters.failures.insert(
                        outcome.task_index,
                        FailedFile {
                            remote_path: outcome.remote_path,
                            station_id: outcome.station_id,
                            reason: outcome.failure_reason.unwrap_or_default(),
                            attempts: outcome.attempts,
                        },
                    );
                }
            }
            counters.since_event += 1;
            if counters.since_event >= self.batch_interval {
                counters.since_event = 0;
                Some(counters.event(self.total, false))
            } else {
                None
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
        true
    }

    /// Point-in-time summary; safe to call while workers are recording.
    #[must_use]
    pub fn snapshot(&self) -> RunSummary {
        let counters = self.lock();
        self.summary(&counters, false)
    }

    /// Final summary. Tasks that never reached a terminal state are counted
    /// as not dispatched; this only happens for cancelled runs.
    #[must_use]
    pub fn finalize(&self, cancelled: bool) -> RunSummary {
        let (summary, event) = {
            let counters = self.lock();
            (
                self.summary(&counters, cancelled),
                counters.event(self.total, true),
            )
        };
        self.emit(event);
        summary
    }

    /// Current progress as an event, without sending it.
    #[must_use]
    pub fn progress(&self) -> ProgressEvent {
        self.lock().event(self.total, false)
    }

    fn summary(&self, counters: &Counters, cancelled: bool) -> RunSummary {
        RunSummary {
            total_candidates: self.total,
            succeeded: counters.succeeded,
            failed: counters.failures.values().cloned().collect(),
            skipped: counters.skipped,
            not_dispatched: self.total.saturating_sub(counters.processed()),
            bytes_downloaded: counters.bytes,
            elapsed: self.started.elapsed(),
            cancelled,
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(events) = &self.events {
            trace!(processed = event.processed, total = event.total, "progress event");
            // A dropped receiver only means nobody is watching.
            let _ = events.send(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;

    use chrono::NaiveDate;

    use super::*;
    use crate::model::{DownloadTask, RemoteFile};

    fn task(index: usize) -> DownloadTask {
        DownloadTask {
            index,
            remote: RemoteFile {
                remote_dir: "/ARCHIVE/2025/11/18".to_string(),
                filename: format!("S{index}251118104500.txt"),
                station_id: format!("S{index}"),
                timestamp: NaiveDate::from_ymd_opt(2025, 11, 18)
                    .unwrap()
                    .and_hms_opt(10, 45, 0)
                    .unwrap(),
            },
            local_path: PathBuf::from(format!("/tmp/S{index}")),
        }
    }

    #[test]
    fn test_record_counts_and_bytes() {
        let agg = ProgressAggregator::new(4, 1, 10, None);
        assert!(agg.record(DownloadOutcome::success(&task(0), 10, 1)));
        assert!(agg.record(DownloadOutcome::success(&task(1), 5, 2)));
        assert!(agg.record(DownloadOutcome::failed(&task(2), "boom", 2)));

        let summary = agg.finalize(false);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.bytes_downloaded, 15);
        assert_eq!(summary.not_dispatched, 0);
        assert_eq!(
            summary.succeeded + summary.failed_count() + summary.skipped,
            summary.total_candidates
        );
    }

    #[test]
    fn test_duplicate_outcome_not_double_counted() {
        let agg = ProgressAggregator::new(1, 0, 1, None);
        assert!(agg.record(DownloadOutcome::failed(&task(0), "first", 1)));
        assert!(!agg.record(DownloadOutcome::success(&task(0), 3, 2)));

        let summary = agg.snapshot();
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed_count(), 1);
    }

    #[test]
    fn test_failed_list_in_discovery_order() {
        let agg = ProgressAggregator::new(3, 0, 1, None);
        for index in [2, 0, 1] {
            agg.record(DownloadOutcome::failed(&task(index), format!("r{index}"), 2));
        }
        let reasons: Vec<_> = agg
            .finalize(false)
            .failed
            .into_iter()
            .map(|f| f.reason)
            .collect();
        assert_eq!(reasons, ["r0", "r1", "r2"]);
    }

    #[test]
    fn test_events_every_batch_interval_and_at_finalize() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let agg = ProgressAggregator::new(5, 0, 2, Some(tx));
        for index in 0..5 {
            agg.record(DownloadOutcome::success(&task(index), 1, 1));
        }
        let _ = agg.finalize(false);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let processed: Vec<_> = events.iter().map(|e| e.processed).collect();
        assert_eq!(processed, [2, 4, 5]);
        assert!(events.last().unwrap().finished);
        assert!((events.last().unwrap().percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cancelled_run_counts_not_dispatched() {
        let agg = ProgressAggregator::new(6, 1, 5, None);
        agg.record(DownloadOutcome::success(&task(0), 1, 1));
        let summary = agg.finalize(true);
        assert!(summary.cancelled);
        assert_eq!(summary.not_dispatched, 4);
        assert_eq!(
            summary.processed() + summary.not_dispatched,
            summary.total_candidates
        );
    }

    #[test]
    fn test_empty_run_is_complete() {
        let agg = ProgressAggregator::new(0, 0, 5, None);
        let event = agg.progress();
        assert!((event.percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregator_thread_safe() {
        let agg = Arc::new(ProgressAggregator::new(1000, 0, 7, None));
        let mut handles = Vec::new();

        for worker in 0..10 {
            let agg = Arc::clone(&agg);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let index = worker * 100 + i;
                    if index % 3 == 0 {
                        agg.record(DownloadOutcome::failed(&task(index), "x", 2));
                    } else {
                        agg.record(DownloadOutcome::success(&task(index), 1, 1));
                    }
                    // Snapshots race with records.
                    let _ = agg.snapshot();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = agg.finalize(false);
        assert_eq!(summary.failed_count(), 334);
        assert_eq!(summary.succeeded, 666);
        assert_eq!(summary.processed(), 1000);
    }
}
