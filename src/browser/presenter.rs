//! Per-pane directory browsing presenter
//!
//! Drives asynchronous directory listing for one filesystem view (local
//! or remote), mediates authentication challenges, and auto-refreshes
//! when a finished transfer lands in the displayed directory.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use secrecy::SecretString;
use tokio::sync::broadcast;

use crate::client::{BrowserModel, ListOutcome};
use crate::session::SessionInfo;
use crate::transfer::{TransferPresenter, TransferRequest, TransferStatus};

use super::types::{DirectoryEntry, sort_entries};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Whether a pane is idle or has a listing in flight. Only one listing
/// may be in flight per pane; a second request is rejected, not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserState {
    Ready,
    Working,
}

/// Credential challenge passed to the auth handler by mutable reference;
/// the handler fills in new credentials and sets `handled`.
#[derive(Debug)]
pub struct AuthEvent {
    pub username: String,
    pub password: Option<SecretString>,
    pub handled: bool,
}

/// Synchronous credential resolution (a blocking modal dialog in a GUI
/// host, a scripted responder in tests). Invoked on a blocking thread,
/// so implementations are free to block for user input.
pub trait AuthPrompt: Send + Sync {
    fn request(&self, event: &mut AuthEvent);
}

/// Notifications for the view layer
#[derive(Debug, Clone)]
pub enum BrowserEvent {
    StateChanged(BrowserState),
    StatusChanged(String),
    DirectoryLoaded { path: PathBuf, entry_count: usize },
}

/// Pane state as rendered by the view
#[derive(Debug, Clone)]
pub struct BrowserViewState {
    pub state: BrowserState,
    pub current_path: Option<DirectoryEntry>,
    pub entries: Vec<DirectoryEntry>,
    pub status: String,
}

/// Orchestrates one pane's directory browsing and auth retry.
pub struct BrowserPresenter {
    name: String,
    model: Arc<dyn BrowserModel>,
    session: Mutex<SessionInfo>,
    transfers: Arc<TransferPresenter>,
    auth_prompt: Mutex<Option<Arc<dyn AuthPrompt>>>,
    view: Mutex<BrowserViewState>,
    events: broadcast::Sender<BrowserEvent>,
}

impl BrowserPresenter {
    /// Must be called within a tokio runtime: spawns the listener that
    /// refreshes this pane when a transfer completes into it.
    pub fn new(
        name: impl Into<String>,
        model: Arc<dyn BrowserModel>,
        session: SessionInfo,
        transfers: Arc<TransferPresenter>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let presenter = Arc::new(Self {
            name: name.into(),
            model,
            session: Mutex::new(session),
            transfers,
            auth_prompt: Mutex::new(None),
            view: Mutex::new(BrowserViewState {
                state: BrowserState::Ready,
                current_path: None,
                entries: Vec::new(),
                status: String::new(),
            }),
            events,
        });
        presenter.spawn_auto_refresh();
        presenter
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.events.subscribe()
    }

    pub fn set_auth_prompt(&self, prompt: Arc<dyn AuthPrompt>) {
        *self.auth_prompt.lock() = Some(prompt);
    }

    pub fn session(&self) -> SessionInfo {
        self.session.lock().clone()
    }

    pub fn view(&self) -> BrowserViewState {
        self.view.lock().clone()
    }

    /// Asynchronously load a directory. Rejected with a status message
    /// while another listing is in flight; a missing target is a caller
    /// contract violation reported as an error.
    pub fn load_directory(self: &Arc<Self>, dir: Option<DirectoryEntry>) {
        let dir = {
            let mut view = self.view.lock();
            if view.state == BrowserState::Working {
                self.set_status_locked(&mut view, "Busy loading directory".to_string());
                return;
            }
            match dir {
                Some(dir) => {
                    tracing::info!("Loading directory, path={}", dir.path.display());
                    view.state = BrowserState::Working;
                    dir
                }
                None => {
                    tracing::error!("Load directory failed: no target");
                    self.set_status_locked(
                        &mut view,
                        "Unable to load directory: no target given".to_string(),
                    );
                    return;
                }
            }
        };
        let _ = self
            .events
            .send(BrowserEvent::StateChanged(BrowserState::Working));

        let presenter = Arc::clone(self);
        tokio::spawn(async move {
            let session = presenter.session();
            let model = Arc::clone(&presenter.model);
            let requested = dir.clone();
            let outcome =
                tokio::task::spawn_blocking(move || model.list_directory(&session, &requested))
                    .await
                    .unwrap_or_else(|e| ListOutcome::Error {
                        message: format!("Listing task failed: {}", e),
                    });
            presenter.finish_load(dir, outcome).await;
        });
    }

    /// Re-issue the listing for the displayed directory
    pub fn refresh(self: &Arc<Self>) {
        tracing::debug!("Refreshing current directory, pane={}", self.name);
        let current = self.view.lock().current_path.clone();
        self.load_directory(current);
    }

    pub fn can_transfer_file(&self, source: &DirectoryEntry, target: &DirectoryEntry) -> bool {
        self.transfers.can_transfer_file(source, target)
    }

    pub fn transfer_files(&self, request: TransferRequest) -> u32 {
        self.transfers.transfer_files(request)
    }

    async fn finish_load(self: &Arc<Self>, requested: DirectoryEntry, outcome: ListOutcome) {
        match outcome {
            ListOutcome::RetryAuthentication { path } => {
                // Ready first, so the retried listing is not rejected as
                // busy by its own pane
                self.set_ready();

                let prompt = self.auth_prompt.lock().clone();
                let mut event = {
                    let session = self.session.lock();
                    AuthEvent {
                        username: session.username.clone(),
                        password: session.password.clone(),
                        handled: false,
                    }
                };
                if let Some(prompt) = prompt {
                    // The prompt may block on user input; keep it off
                    // the async workers
                    event = match tokio::task::spawn_blocking(move || {
                        let mut event = event;
                        prompt.request(&mut event);
                        event
                    })
                    .await
                    {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::error!("Credential prompt task failed: {}", e);
                            AuthEvent {
                                username: String::new(),
                                password: None,
                                handled: false,
                            }
                        }
                    };
                }

                if event.handled {
                    {
                        let mut session = self.session.lock();
                        session.username = event.username;
                        session.password = event.password;
                    }
                    self.load_directory(Some(path));
                } else {
                    tracing::info!(
                        "Authentication abandoned for {}",
                        requested.path.display()
                    );
                    let mut view = self.view.lock();
                    self.set_status_locked(&mut view, "Authentication canceled".to_string());
                }
            }
            ListOutcome::Success(listing) => {
                let mut entries = listing.entries;
                sort_entries(&mut entries);
                let summary = if listing.mount_count > 0 {
                    format!("{} items", listing.mount_count)
                } else {
                    format!(
                        "{} files {} directories",
                        listing.file_count, listing.dir_count
                    )
                };
                let status = format!("{} @ {}", summary, Utc::now().format("%Y-%m-%d %H:%M:%S"));
                let entry_count = entries.len();
                let loaded_path = listing.path.path.clone();

                {
                    let mut view = self.view.lock();
                    view.current_path = Some(listing.path);
                    view.entries = entries;
                    view.state = BrowserState::Ready;
                    self.set_status_locked(&mut view, status);
                }
                let _ = self
                    .events
                    .send(BrowserEvent::StateChanged(BrowserState::Ready));
                let _ = self.events.send(BrowserEvent::DirectoryLoaded {
                    path: loaded_path,
                    entry_count,
                });
            }
            ListOutcome::Error { message } => {
                let message = if message.is_empty() {
                    "Unknown error listing directory".to_string()
                } else {
                    message
                };
                tracing::error!("Error listing directory: {}", message);
                {
                    let mut view = self.view.lock();
                    view.state = BrowserState::Ready;
                    self.set_status_locked(&mut view, message);
                }
                let _ = self
                    .events
                    .send(BrowserEvent::StateChanged(BrowserState::Ready));
            }
        }
    }

    fn set_ready(&self) {
        self.view.lock().state = BrowserState::Ready;
        let _ = self
            .events
            .send(BrowserEvent::StateChanged(BrowserState::Ready));
    }

    fn set_status_locked(&self, view: &mut BrowserViewState, status: String) {
        view.status = status.clone();
        let _ = self.events.send(BrowserEvent::StatusChanged(status));
    }

    /// Refresh this pane whenever a transfer completes into the
    /// directory it currently displays.
    fn spawn_auto_refresh(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let mut updates = self.transfers.subscribe();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => {
                        let Some(presenter) = weak.upgrade() else {
                            break;
                        };
                        if update.status != TransferStatus::Complete {
                            continue;
                        }
                        let displayed = {
                            let view = presenter.view.lock();
                            view.current_path
                                .as_ref()
                                .is_some_and(|p| p.path == update.target)
                        };
                        if displayed {
                            tracing::info!(
                                "Refreshing for transfer update, path={}",
                                update.target.display()
                            );
                            presenter.refresh();
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Transfer update listener lagged by {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl std::fmt::Debug for BrowserPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserPresenter")
            .field("name", &self.name)
            .field("state", &self.view.lock().state)
            .finish_non_exhaustive()
    }
}
