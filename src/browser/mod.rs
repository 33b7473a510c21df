//! Directory browsing: entry model, local listing model, and the
//! per-pane presenter.

pub mod local;
pub mod presenter;
pub mod types;

pub use local::LocalDirectoryModel;
pub use presenter::{
    AuthEvent, AuthPrompt, BrowserEvent, BrowserPresenter, BrowserState, BrowserViewState,
};
pub use types::{DirectoryEntry, EntryKind, FileSource, format_size, sort_entries};
