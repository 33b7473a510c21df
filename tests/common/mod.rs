//! Shared test fixtures: a scripted transfer client and entry builders
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use portage::browser::types::{DirectoryEntry, FileSource};
use portage::client::{
    BrowserModel, CancelToken, CopyOutcome, DirectoryListing, ListOutcome, ProgressEvent,
    ProgressUpdate, TransferClient, TransferTotals,
};
use portage::session::SessionInfo;

type CopyScript =
    Box<dyn Fn(&mut dyn FnMut(ProgressEvent), &CancelToken) -> CopyOutcome + Send + Sync>;

/// Client whose listing and copy behavior is scripted by the test.
pub struct ScriptedClient {
    listings: Mutex<VecDeque<ListOutcome>>,
    list_delay: Duration,
    list_calls: AtomicUsize,
    copy_calls: AtomicUsize,
    copy: CopyScript,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            listings: Mutex::new(VecDeque::new()),
            list_delay: Duration::ZERO,
            list_calls: AtomicUsize::new(0),
            copy_calls: AtomicUsize::new(0),
            copy: Box::new(|_, _| CopyOutcome::Success(TransferTotals::default())),
        }
    }

    pub fn with_listings(mut self, listings: Vec<ListOutcome>) -> Self {
        self.listings = Mutex::new(listings.into());
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn with_copy(
        mut self,
        copy: impl Fn(&mut dyn FnMut(ProgressEvent), &CancelToken) -> CopyOutcome
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.copy = Box::new(copy);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn copy_calls(&self) -> usize {
        self.copy_calls.load(Ordering::SeqCst)
    }
}

impl BrowserModel for ScriptedClient {
    fn list_directory(&self, _session: &SessionInfo, _path: &DirectoryEntry) -> ListOutcome {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            std::thread::sleep(self.list_delay);
        }
        self.listings.lock().pop_front().unwrap_or(ListOutcome::Error {
            message: "listing script exhausted".to_string(),
        })
    }
}

impl TransferClient for ScriptedClient {
    fn copy_files(
        &self,
        _session: &SessionInfo,
        _sources: &[DirectoryEntry],
        _target: &DirectoryEntry,
        progress: &mut dyn FnMut(ProgressEvent),
        cancel: &CancelToken,
    ) -> CopyOutcome {
        self.copy_calls.fetch_add(1, Ordering::SeqCst);
        (self.copy)(progress, cancel)
    }
}

pub fn session() -> SessionInfo {
    SessionInfo::new("test-box", "host.example.com", "olduser")
}

pub fn local_file(path: &str, size: u64) -> DirectoryEntry {
    let mut entry = DirectoryEntry::file(path, FileSource::Local);
    entry.size = size;
    entry
}

pub fn remote_dir(path: &str) -> DirectoryEntry {
    DirectoryEntry::directory(path, FileSource::Remote)
}

pub fn remote_file(path: &str, size: u64) -> DirectoryEntry {
    let mut entry = DirectoryEntry::file(path, FileSource::Remote);
    entry.size = size;
    entry
}

/// A successful listing of `path` with the given regular entries
pub fn listing(path: &DirectoryEntry, entries: Vec<DirectoryEntry>) -> ListOutcome {
    let file_count = entries.iter().filter(|e| e.is_file()).count();
    let dir_count = entries.len() - file_count;
    ListOutcome::Success(DirectoryListing {
        path: path.clone(),
        entries,
        file_count,
        dir_count,
        mount_count: 0,
    })
}

/// A listing that represents mounted volumes rather than regular entries
pub fn mount_listing(path: &DirectoryEntry, mount_count: usize) -> ListOutcome {
    ListOutcome::Success(DirectoryListing {
        path: path.clone(),
        entries: Vec::new(),
        file_count: 0,
        dir_count: 0,
        mount_count,
    })
}

/// One tool progress tick
pub fn tick(filename: &str, bytes: u64, percent: u8) -> ProgressEvent {
    ProgressEvent {
        file_complete: false,
        update: ProgressUpdate {
            filename: filename.to_string(),
            bytes_transferred: bytes,
            percent_complete: percent,
            transfer_rate: "1.0 kB/s".to_string(),
            time_left: "00:00:10".to_string(),
        },
    }
}

/// The final per-file event
pub fn file_done(filename: &str, bytes: u64) -> ProgressEvent {
    ProgressEvent {
        file_complete: true,
        update: ProgressUpdate {
            filename: filename.to_string(),
            bytes_transferred: bytes,
            percent_complete: 100,
            transfer_rate: String::new(),
            time_left: "00:00:00".to_string(),
        },
    }
}
