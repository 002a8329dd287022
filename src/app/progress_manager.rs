//! Progress UI for download runs: a spinner while selecting, then a bar fed
//! by the engine's batched progress events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use station_downloader_core::ProgressEvent;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Spawns the selection spinner when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_selection_spinner(
    use_spinner: bool,
    stations: usize,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = Arc::clone(&stop);
    let handle = tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(format!("Scanning remote directories for {stations} station(s)..."));

        while !stop_signal.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(120)).await;
        }
        spinner.finish_and_clear();
    });
    (Some(handle), stop)
}

/// Spawns the download bar when requested.
///
/// Returns the sender to hand to the engine and the bar task. The task ends
/// on the final event or when every sender is dropped.
pub(crate) fn spawn_progress_bar(
    use_bar: bool,
) -> (
    Option<UnboundedSender<ProgressEvent>>,
    Option<tokio::task::JoinHandle<()>>,
) {
    if !use_bar {
        return (None, None);
    }
    let (tx, rx) = unbounded_channel();
    (Some(tx), Some(tokio::spawn(drive_bar(rx))))
}

async fn drive_bar(mut events: UnboundedReceiver<ProgressEvent>) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    while let Some(event) = events.recv().await {
        bar.set_length(event.total as u64);
        bar.set_position(event.processed as u64);
        bar.set_message(format_event(&event));
        if event.finished {
            break;
        }
    }
    bar.finish_and_clear();
}

fn format_event(event: &ProgressEvent) -> String {
    format!(
        "{:.0}% ({} ok, {} failed, {} skipped)",
        event.percent, event.succeeded, event.failed, event.skipped
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(processed: usize, finished: bool) -> ProgressEvent {
        ProgressEvent {
            succeeded: processed,
            failed: 0,
            skipped: 0,
            processed,
            total: 4,
            percent: processed as f64 / 4.0 * 100.0,
            finished,
        }
    }

    #[test]
    fn test_format_event() {
        assert_eq!(
            format_event(&event(2, false)),
            "50% (2 ok, 0 failed, 0 skipped)"
        );
    }

    #[tokio::test]
    async fn spawn_selection_spinner_when_disabled_returns_none_handle_and_stop_already_true() {
        let (handle, stop) = spawn_selection_spinner(false, 1);

        assert!(handle.is_none());
        assert!(
            stop.load(Ordering::SeqCst),
            "stop signal should be true when spinner disabled"
        );
    }

    #[tokio::test]
    async fn spawn_selection_spinner_stops_on_signal() {
        let (handle, stop) = spawn_selection_spinner(true, 1);
        assert!(handle.is_some());

        stop.store(true, Ordering::SeqCst);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        // If we get here without hanging, the spinner task exited on stop signal
    }

    #[tokio::test]
    async fn spawn_progress_bar_ends_on_final_event() {
        let (tx, handle) = spawn_progress_bar(true);
        let tx = tx.expect("sender when enabled");
        tx.send(event(2, false)).expect("send");
        tx.send(event(4, true)).expect("send");
        handle.expect("handle when enabled").await.expect("bar task");
    }

    #[test]
    fn spawn_progress_bar_when_disabled_returns_nothing() {
        let (tx, handle) = spawn_progress_bar(false);
        assert!(tx.is_none());
        assert!(handle.is_none());
    }
}
