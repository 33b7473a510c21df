//! Transfer client boundary
//!
//! Adapters that execute directory listing and file copy by driving an
//! external tool. Calls are blocking and are expected to run inside
//! `tokio::task::spawn_blocking`; no error is ever allowed to cross this
//! boundary as a panic — every failure maps to an outcome variant.

pub mod scp;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::browser::types::DirectoryEntry;
use crate::session::SessionInfo;

pub use scp::ScpToolClient;

/// A successfully listed directory
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    /// The resolved directory that was listed
    pub path: DirectoryEntry,
    pub entries: Vec<DirectoryEntry>,
    pub file_count: usize,
    pub dir_count: usize,
    /// Non-zero when the listing represents mounted volumes rather than
    /// regular entries; the presenter then reports "N items"
    pub mount_count: usize,
}

/// Outcome of a directory listing
#[derive(Debug, Clone)]
pub enum ListOutcome {
    Success(DirectoryListing),
    /// Authentication was rejected; carries the requested path so the
    /// operation can be re-issued after new credentials arrive
    RetryAuthentication { path: DirectoryEntry },
    Error { message: String },
}

/// Counters for a finished copy operation
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferTotals {
    pub files_copied: usize,
    pub bytes_transferred: u64,
}

/// Outcome of a copy operation
#[derive(Debug, Clone)]
pub enum CopyOutcome {
    Success(TransferTotals),
    RetryAuthentication { message: String },
    /// The cancel token fired mid-copy
    Canceled,
    Error { message: String },
}

/// One tool-reported progress tick for the file currently being copied
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub filename: String,
    pub bytes_transferred: u64,
    /// 0-100 for the current file
    pub percent_complete: u8,
    pub transfer_rate: String,
    pub time_left: String,
}

/// Progress callback payload: a tick, plus one final event per file with
/// `file_complete` set
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub file_complete: bool,
    pub update: ProgressUpdate,
}

struct CancelInner {
    canceled: AtomicBool,
    kill: Mutex<Option<Box<dyn FnMut() + Send>>>,
}

/// Cooperative cancellation handle for one copy operation.
///
/// The client registers a kill hook for its current child process;
/// `cancel()` sets the flag and kills the child so the blocking read
/// returns promptly instead of the worker being destroyed mid-stack.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                canceled: AtomicBool::new(false),
                kill: Mutex::new(None),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
        if let Some(kill) = self.inner.kill.lock().as_mut() {
            kill();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// Register the hook that stops the in-flight tool process.
    /// If the token already fired, the hook runs immediately.
    pub fn set_kill_hook(&self, hook: impl FnMut() + Send + 'static) {
        let mut slot = self.inner.kill.lock();
        *slot = Some(Box::new(hook));
        if self.is_canceled() {
            if let Some(kill) = slot.as_mut() {
                kill();
            }
        }
    }

    pub fn clear_kill_hook(&self) {
        *self.inner.kill.lock() = None;
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}

/// Listing half of the client boundary; also implemented by the local
/// filesystem model so a pane does not care where its entries come from.
pub trait BrowserModel: Send + Sync {
    /// Blocking. Never panics across the boundary: all tool failures map
    /// to `ListOutcome::Error`, auth rejection to `RetryAuthentication`.
    fn list_directory(&self, session: &SessionInfo, path: &DirectoryEntry) -> ListOutcome;
}

/// Full client boundary: listing plus copy.
pub trait TransferClient: BrowserModel {
    /// Blocking. Drives the external tool per file, invoking `progress`
    /// on each measurable increment and once more when each file
    /// completes. Returns `Canceled` when the token fires mid-copy.
    fn copy_files(
        &self,
        session: &SessionInfo,
        sources: &[DirectoryEntry],
        target: &DirectoryEntry,
        progress: &mut dyn FnMut(ProgressEvent),
        cancel: &CancelToken,
    ) -> CopyOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_sets_flag_and_runs_hook() {
        let token = CancelToken::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        token.set_kill_hook(move || fired_clone.store(true, Ordering::SeqCst));

        assert!(!token.is_canceled());
        token.cancel();
        assert!(token.is_canceled());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn late_hook_runs_immediately_after_cancel() {
        let token = CancelToken::new();
        token.cancel();

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        token.set_kill_hook(move || fired_clone.store(true, Ordering::SeqCst));

        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn cloned_tokens_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_canceled());
    }
}
