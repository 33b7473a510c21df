//! Transfer collection and lifecycle coordinator
//!
//! Owns every `FileTransfer` created across all panes for the lifetime
//! of the application session, addressable by id, and fans their update
//! notifications out to all subscribers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::browser::types::DirectoryEntry;
use crate::client::TransferClient;

use super::{
    FileTransfer, TransferRequest, TransferStatus, TransferUpdate, can_cancel, can_restart,
};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// View-facing row for one transfer, with action flags recomputed from
/// the current status.
#[derive(Debug, Clone)]
pub struct TransferViewItem {
    pub id: u32,
    pub session: String,
    pub source: String,
    pub target: String,
    pub status: TransferStatus,
    pub progress: u8,
    pub message: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub can_restart: bool,
    pub can_cancel: bool,
    pub can_delete: bool,
}

/// Owns the set of all transfers; insertion order is display order.
pub struct TransferPresenter {
    client: Arc<dyn TransferClient>,
    transfers: RwLock<Vec<Arc<FileTransfer>>>,
    id_seed: AtomicU32,
    updates: broadcast::Sender<TransferUpdate>,
}

impl TransferPresenter {
    pub fn new(client: Arc<dyn TransferClient>) -> Arc<Self> {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Arc::new(Self {
            client,
            transfers: RwLock::new(Vec::new()),
            id_seed: AtomicU32::new(0),
            updates,
        })
    }

    /// Every subscriber receives every update (fan-out broadcast, not a
    /// work queue).
    pub fn subscribe(&self) -> broadcast::Receiver<TransferUpdate> {
        self.updates.subscribe()
    }

    /// Consume a request into a new transfer and start it. Returns the
    /// assigned id.
    pub fn transfer_files(&self, request: TransferRequest) -> u32 {
        let id = self.id_seed.fetch_add(1, Ordering::SeqCst) + 1;
        let transfer = Arc::new(FileTransfer::new(
            id,
            request,
            Arc::clone(&self.client),
            self.updates.clone(),
        ));
        self.transfers.write().push(Arc::clone(&transfer));
        transfer.start();
        id
    }

    pub fn cancel(&self, id: u32) {
        match self.find(id) {
            Some(transfer) => transfer.cancel(),
            None => tracing::warn!("Cancel requested for unknown transfer, id={}", id),
        }
    }

    pub fn restart(&self, id: u32) {
        match self.find(id) {
            Some(transfer) => transfer.start(),
            None => tracing::warn!("Restart requested for unknown transfer, id={}", id),
        }
    }

    /// Remove a transfer from the collection. Rejected while the
    /// transfer is running at the moment its lock is taken — callers
    /// must cancel first.
    pub fn remove(&self, id: u32) -> bool {
        let mut transfers = self.transfers.write();
        let Some(index) = transfers.iter().position(|t| t.id() == id) else {
            tracing::warn!("Remove requested for unknown transfer, id={}", id);
            return false;
        };
        // Status read is the linearization point against a completing
        // worker
        if transfers[index].status() == TransferStatus::Running {
            tracing::warn!("Attempted to remove running transfer, id={}", id);
            return false;
        }
        transfers.remove(index);
        true
    }

    /// Transfer-feasibility policy: only cross-boundary (local↔remote)
    /// transfers into a directory are allowed, and never onto itself.
    pub fn can_transfer_file(&self, source: &DirectoryEntry, target: &DirectoryEntry) -> bool {
        if !target.is_folder() || source.is_parent() {
            return false;
        }
        if source.source == target.source {
            return false;
        }
        source.path != target.path
    }

    pub fn find(&self, id: u32) -> Option<Arc<FileTransfer>> {
        self.transfers.read().iter().find(|t| t.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.transfers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.read().is_empty()
    }

    /// Snapshot of all transfers in insertion order
    pub fn view_items(&self) -> Vec<TransferViewItem> {
        self.transfers
            .read()
            .iter()
            .map(|transfer| {
                let snapshot = transfer.snapshot();
                let request = transfer.request();
                TransferViewItem {
                    id: snapshot.id,
                    session: request.session.name.clone(),
                    source: format_sources(&request.source_files),
                    target: request.target.path.to_string_lossy().to_string(),
                    status: snapshot.status,
                    progress: snapshot.percent,
                    message: snapshot.message,
                    start: snapshot.start_time,
                    end: snapshot.end_time,
                    can_restart: can_restart(snapshot.status),
                    can_cancel: can_cancel(snapshot.status),
                    can_delete: !can_cancel(snapshot.status),
                }
            })
            .collect()
    }
}

/// Single path as-is; multiple paths joined one per line
fn format_sources(sources: &[DirectoryEntry]) -> String {
    if sources.len() == 1 {
        sources[0].path.to_string_lossy().to_string()
    } else {
        sources
            .iter()
            .map(|s| s.path.to_string_lossy())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::types::FileSource;
    use crate::client::{
        BrowserModel, CancelToken, CopyOutcome, ListOutcome, ProgressEvent, TransferTotals,
    };
    use crate::session::SessionInfo;

    struct NoopClient;

    impl BrowserModel for NoopClient {
        fn list_directory(&self, _: &SessionInfo, _: &DirectoryEntry) -> ListOutcome {
            ListOutcome::Error {
                message: "not implemented".to_string(),
            }
        }
    }

    impl TransferClient for NoopClient {
        fn copy_files(
            &self,
            _: &SessionInfo,
            _: &[DirectoryEntry],
            _: &DirectoryEntry,
            _: &mut dyn FnMut(ProgressEvent),
            _: &CancelToken,
        ) -> CopyOutcome {
            CopyOutcome::Success(TransferTotals::default())
        }
    }

    fn presenter() -> Arc<TransferPresenter> {
        TransferPresenter::new(Arc::new(NoopClient))
    }

    fn local_file(path: &str) -> DirectoryEntry {
        DirectoryEntry::file(path, FileSource::Local)
    }

    fn remote_dir(path: &str) -> DirectoryEntry {
        DirectoryEntry::directory(path, FileSource::Remote)
    }

    #[test]
    fn policy_allows_only_cross_boundary_transfers() {
        let presenter = presenter();

        assert!(presenter.can_transfer_file(&local_file("/a/f.txt"), &remote_dir("/srv")));
        assert!(presenter.can_transfer_file(
            &DirectoryEntry::file("/srv/f.txt", FileSource::Remote),
            &DirectoryEntry::directory("/a", FileSource::Local)
        ));

        // Same-origin transfers are disallowed
        assert!(!presenter.can_transfer_file(
            &local_file("/a/f.txt"),
            &DirectoryEntry::directory("/b", FileSource::Local)
        ));
        assert!(!presenter.can_transfer_file(
            &DirectoryEntry::file("/srv/f.txt", FileSource::Remote),
            &remote_dir("/tmp")
        ));
    }

    #[test]
    fn policy_rejects_non_directory_targets_and_parent_sources() {
        let presenter = presenter();

        assert!(!presenter.can_transfer_file(
            &local_file("/a/f.txt"),
            &DirectoryEntry::file("/srv/g.txt", FileSource::Remote)
        ));
        assert!(!presenter.can_transfer_file(
            &DirectoryEntry::parent_of(std::path::Path::new("/a/b"), FileSource::Local),
            &remote_dir("/srv")
        ));
    }

    #[test]
    fn policy_rejects_transfer_onto_itself() {
        let presenter = presenter();
        let dir = DirectoryEntry::directory("/srv", FileSource::Remote);
        let mut same = dir.clone();
        same.source = FileSource::Local;
        assert!(!presenter.can_transfer_file(&same, &dir));
    }

    #[test]
    fn sources_join_one_per_line() {
        assert_eq!(format_sources(&[local_file("/a/one.txt")]), "/a/one.txt");
        assert_eq!(
            format_sources(&[local_file("/a/one.txt"), local_file("/a/two.txt")]),
            "/a/one.txt\n/a/two.txt"
        );
    }

    #[test]
    fn remove_unknown_id_is_rejected() {
        assert!(!presenter().remove(42));
    }
}
