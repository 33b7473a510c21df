//! Portage file-transfer engine
//!
//! Drives directory listing and file copy through an external secure-copy
//! tool, with per-transfer progress, retryable authentication, and
//! cancellation. The presentation layer (tabs, panes, dialogs) is an
//! external collaborator: it calls into the presenters here and observes
//! their update channels.

pub mod browser;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod transfer;
