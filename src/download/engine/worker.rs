//! One blocking worker: pulls tasks, drives attempts, records outcomes.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::{debug, info, instrument, warn};

use super::{CancelToken, PauseToken};
use crate::download::constants::PAUSE_POLL_INTERVAL;
use crate::download::filename::partial_path;
use crate::download::progress::ProgressAggregator;
use crate::download::retry::{AttemptState, RetryPolicy};
use crate::download::DownloadError;
use crate::ftp::{ConnectionManager, ConnectionSettings, Connector};
use crate::model::{DownloadOutcome, DownloadTask, ServerProfile};

pub(super) struct WorkerContext {
    pub worker_id: usize,
    pub connector: Arc<dyn Connector>,
    pub server: ServerProfile,
    pub settings: ConnectionSettings,
    pub retry: RetryPolicy,
    pub tasks: Arc<[DownloadTask]>,
    pub cursor: Arc<AtomicUsize>,
    pub aggregator: Arc<ProgressAggregator>,
    pub cancel: CancelToken,
    pub pause: PauseToken,
}

/// Runs until the cursor passes the last task or cancellation is seen.
///
/// Returns the number of tasks this worker finished.
#[instrument(skip_all, fields(worker = ctx.worker_id))]
pub(super) fn run_worker(ctx: WorkerContext) -> usize {
    let mut manager = ConnectionManager::new(
        Arc::clone(&ctx.connector),
        ctx.server.clone(),
        ctx.settings,
    );
    let mut finished = 0usize;

    loop {
        wait_while_paused(&ctx.pause, &ctx.cancel);
        if ctx.cancel.is_cancelled() {
            info!("cancellation requested, worker stopping");
            break;
        }
        let index = ctx.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(task) = ctx.tasks.get(index) else {
            break;
        };

        let outcome = process_task(&mut manager, task, &ctx.retry, &ctx.cancel, &ctx.pause);
        ctx.aggregator.record(outcome);
        finished += 1;
    }

    manager.close();
    debug!(finished, connects = manager.connects(), "worker done");
    finished
}

/// Drives one task to a terminal outcome.
///
/// Every retry starts from a fresh session; the one that just failed is
/// closed first.
fn process_task(
    manager: &mut ConnectionManager,
    task: &DownloadTask,
    retry: &RetryPolicy,
    cancel: &CancelToken,
    pause: &PauseToken,
) -> DownloadOutcome {
    let remote_path = task.remote.remote_path();
    let mut state = AttemptState::Pending.begin();
    let mut last_reason = String::new();

    while let AttemptState::Attempting(attempt) = state {
        wait_while_paused(pause, cancel);
        if attempt > 1 {
            if cancel.is_cancelled() {
                state = state.cancel(format!("{last_reason} (cancelled before retry)"));
                break;
            }
            manager.reset();
        }

        let result = attempt_download(manager, task);
        if let Err(e) = &result {
            last_reason = e.to_string();
            warn!(path = %remote_path, attempt, error = %e, "download attempt failed");
        }

        let (next, delay) = state.advance(result, retry);
        state = next;
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            debug!(path = %remote_path, delay_ms = delay.as_millis(), "waiting before retry");
            thread::sleep(delay);
        }
    }

    match state {
        AttemptState::Succeeded { attempts, bytes } => {
            info!(path = %remote_path, bytes, attempts, "downloaded");
            DownloadOutcome::success(task, bytes, attempts)
        }
        AttemptState::Failed { attempts, reason } => {
            warn!(path = %remote_path, attempts, %reason, "download failed");
            DownloadOutcome::failed(task, reason, attempts)
        }
        other => DownloadOutcome::failed(
            task,
            format!("attempts ended in non-terminal state {other:?}"),
            0,
        ),
    }
}

/// Blocks while `pause` is set; returns early once `cancel` is.
fn wait_while_paused(pause: &PauseToken, cancel: &CancelToken) {
    if !pause.is_paused() {
        return;
    }
    debug!("paused");
    while pause.is_paused() && !cancel.is_cancelled() {
        thread::sleep(PAUSE_POLL_INTERVAL);
    }
    debug!("resumed");
}

/// One attempt: stream into `<dest>.part`, then rename into place.
fn attempt_download(manager: &mut ConnectionManager, task: &DownloadTask) -> Result<u64, DownloadError> {
    let dest = &task.local_path;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| DownloadError::io(parent, e))?;
    }
    let part = partial_path(dest);

    match manager.retrieve_to(&task.remote.remote_dir, &task.remote.filename, &part) {
        Ok(0) => {
            discard(&part);
            Err(DownloadError::empty_remote_file(&task.remote.remote_path()))
        }
        Ok(bytes) => {
            if let Err(e) = fs::rename(&part, dest) {
                discard(&part);
                return Err(DownloadError::io(dest, e));
            }
            Ok(bytes)
        }
        Err(e) => {
            discard(&part);
            Err(e)
        }
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove partial file");
        }
    }
}
