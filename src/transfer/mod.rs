//! File transfer unit of work
//!
//! A `FileTransfer` owns one background worker that drives a copy
//! operation through the transfer client, publishing every status
//! mutation on a broadcast channel. Terminal states are restartable;
//! cancellation kills the external tool rather than the worker.

pub mod presenter;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::browser::types::DirectoryEntry;
use crate::client::{CancelToken, CopyOutcome, ProgressUpdate, TransferClient};
use crate::session::SessionInfo;

pub use presenter::{TransferPresenter, TransferViewItem};

/// Lifecycle states of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Initializing,
    Running,
    Complete,
    Error,
    Canceled,
}

/// Terminal states may be started again
pub fn can_restart(status: TransferStatus) -> bool {
    matches!(
        status,
        TransferStatus::Complete | TransferStatus::Canceled | TransferStatus::Error
    )
}

/// Only a running transfer can be canceled
pub fn can_cancel(status: TransferStatus) -> bool {
    status == TransferStatus::Running
}

/// One user-initiated transfer intent, consumed by exactly one
/// `FileTransfer`.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub session: SessionInfo,
    /// Non-empty; parent-directory entries are never valid sources
    pub source_files: Vec<DirectoryEntry>,
    /// Destination root; must be a directory
    pub target: DirectoryEntry,
}

/// Broadcast payload emitted on every status mutation. This is the sole
/// channel by which presentation layers observe progress.
#[derive(Debug, Clone)]
pub struct TransferUpdate {
    pub id: u32,
    pub status: TransferStatus,
    pub percent: u8,
    pub message: String,
    /// Target directory path, for listeners that refresh matching panes
    pub target: std::path::PathBuf,
    pub files_complete: usize,
    pub bytes_transferred: u64,
}

/// Point-in-time view of a transfer's mutable state
#[derive(Debug, Clone)]
pub struct TransferSnapshot {
    pub id: u32,
    pub status: TransferStatus,
    pub percent: u8,
    pub message: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub files_complete: usize,
    pub bytes_transferred: u64,
}

/// Running minimum of the tool-derived total-size estimate for the file
/// currently being copied. The total is unknown up front, so it is
/// derived from `bytes * 100 / percent` and refined downward as samples
/// arrive.
#[derive(Debug, Default)]
pub struct SizeEstimator {
    estimate: Option<u64>,
}

impl SizeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one progress sample; returns the refined estimate, or `None`
    /// until a non-zero percentage has been seen.
    pub fn sample(&mut self, bytes_transferred: u64, percent: u8) -> Option<u64> {
        if percent == 0 {
            return self.estimate;
        }
        let sample = bytes_transferred * 100 / percent as u64;
        let refined = self.estimate.map_or(sample, |e| e.min(sample));
        self.estimate = Some(refined);
        Some(refined)
    }

    pub fn reset(&mut self) {
        self.estimate = None;
    }

    pub fn current(&self) -> Option<u64> {
        self.estimate
    }
}

/// Status line for one progress tick, sized against the running estimate
fn progress_message(estimator: &mut SizeEstimator, update: &ProgressUpdate) -> String {
    match estimator.sample(update.bytes_transferred, update.percent_complete) {
        Some(est_total) => {
            let (divisor, unit) = if est_total > 10 * 1024 * 1024 {
                (1024 * 1024, "MB")
            } else {
                (1024, "KB")
            };
            format!(
                "{}, ({} of {} {}, {})",
                update.filename,
                update.bytes_transferred / divisor,
                est_total / divisor,
                unit,
                update.time_left
            )
        }
        // < 1% completed: no percentage to derive a total from yet
        None => format!(
            "{}, ({} KB, {})",
            update.filename,
            update.bytes_transferred / 1024,
            update.time_left
        ),
    }
}

struct TransferState {
    status: TransferStatus,
    percent: u8,
    message: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    files_complete: usize,
    bytes_transferred: u64,
    cancel: Option<CancelToken>,
}

/// One running/completed/failed/canceled unit of copy work.
///
/// All status mutation and the start/cancel decisions happen under the
/// per-instance lock; the background worker is the only writer of
/// progress, so callbacks for one transfer are strictly sequential.
pub struct FileTransfer {
    id: u32,
    request: TransferRequest,
    client: Arc<dyn TransferClient>,
    updates: broadcast::Sender<TransferUpdate>,
    state: Mutex<TransferState>,
}

impl FileTransfer {
    pub fn new(
        id: u32,
        request: TransferRequest,
        client: Arc<dyn TransferClient>,
        updates: broadcast::Sender<TransferUpdate>,
    ) -> Self {
        Self {
            id,
            request,
            client,
            updates,
            state: Mutex::new(TransferState {
                status: TransferStatus::Initializing,
                percent: 0,
                message: String::new(),
                start_time: None,
                end_time: None,
                files_complete: 0,
                bytes_transferred: 0,
                cancel: None,
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn request(&self) -> &TransferRequest {
        &self.request
    }

    pub fn status(&self) -> TransferStatus {
        self.state.lock().status
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        let st = self.state.lock();
        TransferSnapshot {
            id: self.id,
            status: st.status,
            percent: st.percent,
            message: st.message.clone(),
            start_time: st.start_time,
            end_time: st.end_time,
            files_complete: st.files_complete,
            bytes_transferred: st.bytes_transferred,
        }
    }

    /// Launch the transfer on a background worker. No-op when already
    /// running: a `FileTransfer` never has two live workers.
    pub fn start(self: &Arc<Self>) {
        let mut st = self.state.lock();
        if st.status == TransferStatus::Initializing || can_restart(st.status) {
            tracing::info!("Starting transfer, id={}", self.id);

            st.start_time = Some(Utc::now());
            st.end_time = None;
            st.files_complete = 0;
            st.bytes_transferred = 0;

            let token = CancelToken::new();
            st.cancel = Some(token.clone());
            self.set_status_locked(
                &mut st,
                0,
                TransferStatus::Running,
                "Started transfer".to_string(),
            );
            drop(st);

            let worker = Arc::clone(self);
            let worker_token = token.clone();
            let handle = tokio::task::spawn_blocking(move || worker.run_transfer(worker_token));
            let watcher = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = handle.await {
                    tracing::error!("Error running transfer, id={}: {}", watcher.id, e);
                    watcher.fail_unexpected(&token, e.to_string());
                }
            });
        } else {
            tracing::warn!("Attempted to start active transfer, id={}", self.id);
        }
    }

    /// Cancel a running transfer: fires the cancel token (killing the
    /// external tool) and records `Canceled` with the percent preserved.
    pub fn cancel(&self) {
        let mut st = self.state.lock();
        if can_cancel(st.status) {
            tracing::info!("Canceling active transfer, id={}", self.id);
            if let Some(token) = st.cancel.take() {
                token.cancel();
            }
            st.end_time = Some(Utc::now());
            let percent = st.percent;
            self.set_status_locked(&mut st, percent, TransferStatus::Canceled, "Canceled".to_string());
        } else {
            tracing::warn!("Attempted to cancel inactive transfer, id={}", self.id);
        }
    }

    /// Worker body: drives the client and writes the terminal state.
    fn run_transfer(self: Arc<Self>, token: CancelToken) {
        let total_files = self
            .request
            .source_files
            .iter()
            .filter(|s| !s.is_parent())
            .count()
            .max(1);

        let mut estimator = SizeEstimator::new();
        let mut files_done = 0usize;
        let mut completed_bytes = 0u64;

        let outcome = self.client.copy_files(
            &self.request.session,
            &self.request.source_files,
            &self.request.target,
            &mut |event| {
                if token.is_canceled() {
                    return;
                }
                // Overall percent: finished files plus the current file's
                // own percentage, so it never goes backwards between files
                let overall = (((files_done * 100) + event.update.percent_complete as usize)
                    / total_files)
                    .min(100) as u8;
                let message = progress_message(&mut estimator, &event.update);
                if event.file_complete {
                    files_done += 1;
                    completed_bytes += event.update.bytes_transferred;
                    estimator.reset();
                    self.update_progress(&token, overall, message, files_done, completed_bytes);
                } else {
                    self.update_progress(
                        &token,
                        overall,
                        message,
                        files_done,
                        completed_bytes + event.update.bytes_transferred,
                    );
                }
            },
            &token,
        );

        let end = Utc::now();
        let mut st = self.state.lock();
        // A fired token means cancel() wrote the terminal state for this
        // run already, and a restart may have installed a new token in
        // st.cancel since. The lock acquisition is the linearization
        // point; a stale worker must not touch either.
        if token.is_canceled() {
            return;
        }
        st.cancel = None;
        st.end_time = Some(end);

        match outcome {
            CopyOutcome::Success(totals) => {
                let duration = st
                    .start_time
                    .map(|start| (end - start).num_seconds())
                    .unwrap_or(0);
                st.files_complete = totals.files_copied;
                st.bytes_transferred = totals.bytes_transferred;
                self.set_status_locked(
                    &mut st,
                    100,
                    TransferStatus::Complete,
                    format!("Duration {} s", duration),
                );
            }
            CopyOutcome::RetryAuthentication { message } | CopyOutcome::Error { message } => {
                let percent = st.percent;
                self.set_status_locked(&mut st, percent, TransferStatus::Error, message);
            }
            CopyOutcome::Canceled => {
                let percent = st.percent;
                self.set_status_locked(
                    &mut st,
                    percent,
                    TransferStatus::Canceled,
                    "Canceled".to_string(),
                );
            }
        }
    }

    /// Progress relay from the worker; ignored once this worker's token
    /// has fired (its run is over, even if a restarted run is `Running`
    /// again) or the transfer has left `Running`.
    fn update_progress(
        &self,
        token: &CancelToken,
        percent: u8,
        message: String,
        files_done: usize,
        bytes: u64,
    ) {
        let mut st = self.state.lock();
        if token.is_canceled() || st.status != TransferStatus::Running {
            return;
        }
        // Monotone non-decreasing while running
        let percent = percent.max(st.percent);
        st.files_complete = files_done;
        st.bytes_transferred = bytes;
        self.set_status_locked(&mut st, percent, TransferStatus::Running, message);
    }

    /// Worker panicked or was torn down unexpectedly. Fenced by the
    /// failed run's own token so it cannot clobber a restarted run.
    fn fail_unexpected(&self, token: &CancelToken, message: String) {
        let mut st = self.state.lock();
        if token.is_canceled() {
            return;
        }
        st.end_time = Some(Utc::now());
        self.set_status_locked(&mut st, 0, TransferStatus::Error, message);
    }

    fn set_status_locked(
        &self,
        st: &mut TransferState,
        percent: u8,
        status: TransferStatus,
        message: String,
    ) {
        st.percent = percent;
        st.status = status;
        st.message = message.clone();
        // No receivers is fine; observation is optional
        let _ = self.updates.send(TransferUpdate {
            id: self.id,
            status,
            percent,
            message,
            target: self.request.target.path.clone(),
            files_complete: st.files_complete,
            bytes_transferred: st.bytes_transferred,
        });
    }
}

impl std::fmt::Debug for FileTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("FileTransfer")
            .field("id", &self.id)
            .field("status", &st.status)
            .field("percent", &st.percent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_predicate_is_total_over_the_enum() {
        assert!(!can_restart(TransferStatus::Initializing));
        assert!(!can_restart(TransferStatus::Running));
        assert!(can_restart(TransferStatus::Complete));
        assert!(can_restart(TransferStatus::Error));
        assert!(can_restart(TransferStatus::Canceled));
    }

    #[test]
    fn cancel_predicate_is_total_over_the_enum() {
        assert!(!can_cancel(TransferStatus::Initializing));
        assert!(can_cancel(TransferStatus::Running));
        assert!(!can_cancel(TransferStatus::Complete));
        assert!(!can_cancel(TransferStatus::Error));
        assert!(!can_cancel(TransferStatus::Canceled));
    }

    #[test]
    fn size_estimate_is_min_over_samples() {
        let mut estimator = SizeEstimator::new();
        assert_eq!(estimator.sample(4000, 10), Some(40_000));
        assert_eq!(estimator.sample(20_000, 50), Some(40_000));
        // 36500 * 100 / 90 = 40555, larger than the running estimate
        assert_eq!(estimator.sample(36_500, 90), Some(40_000));
        assert_eq!(estimator.current(), Some(40_000));
    }

    #[test]
    fn size_estimate_absent_before_first_percent() {
        let mut estimator = SizeEstimator::new();
        assert_eq!(estimator.sample(512, 0), None);
        assert_eq!(estimator.sample(4000, 10), Some(40_000));
        estimator.reset();
        assert_eq!(estimator.current(), None);
    }

    #[test]
    fn progress_message_shows_raw_bytes_before_any_percentage() {
        let mut estimator = SizeEstimator::new();
        let update = ProgressUpdate {
            filename: "big.iso".to_string(),
            bytes_transferred: 2048,
            percent_complete: 0,
            transfer_rate: "1.0 kB/s".to_string(),
            time_left: "00:10:00".to_string(),
        };
        assert_eq!(
            progress_message(&mut estimator, &update),
            "big.iso, (2 KB, 00:10:00)"
        );
    }

    #[test]
    fn progress_message_sizes_against_estimate() {
        let mut estimator = SizeEstimator::new();
        let update = ProgressUpdate {
            filename: "big.iso".to_string(),
            bytes_transferred: 10 * 1024 * 1024,
            percent_complete: 25,
            transfer_rate: "5.0 MB/s".to_string(),
            time_left: "00:00:06".to_string(),
        };
        // Estimate 40 MiB, above the MB threshold
        assert_eq!(
            progress_message(&mut estimator, &update),
            "big.iso, (10 of 40 MB, 00:00:06)"
        );
    }
}
