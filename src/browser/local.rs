//! Local filesystem listing model for the dual-pane browser

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};

use crate::client::{BrowserModel, DirectoryListing, ListOutcome};
use crate::session::SessionInfo;

use super::types::{DirectoryEntry, EntryKind, FileSource};

/// Listing model for local panes. Authentication never applies here, so
/// failures are always plain errors.
#[derive(Debug, Default)]
pub struct LocalDirectoryModel;

impl LocalDirectoryModel {
    pub fn new() -> Self {
        Self
    }
}

impl BrowserModel for LocalDirectoryModel {
    fn list_directory(&self, _session: &SessionInfo, path: &DirectoryEntry) -> ListOutcome {
        match list_local_dir(&path.path) {
            Ok(mut entries) => {
                let file_count = entries.iter().filter(|e| e.is_file()).count();
                let dir_count = entries
                    .iter()
                    .filter(|e| e.kind == EntryKind::Directory)
                    .count();
                super::types::sort_entries(&mut entries);

                ListOutcome::Success(DirectoryListing {
                    path: path.clone(),
                    entries,
                    file_count,
                    dir_count,
                    mount_count: 0,
                })
            }
            Err(message) => {
                tracing::error!("Local listing failed for {}: {}", path.path.display(), message);
                ListOutcome::Error { message }
            }
        }
    }
}

/// Synchronous directory walk producing local entries
fn list_local_dir(path: &Path) -> Result<Vec<DirectoryEntry>, String> {
    let mut result = Vec::new();

    // Add parent directory entry if not at root
    if path.parent().is_some() && path.to_string_lossy() != "/" {
        result.push(DirectoryEntry::parent_of(path, FileSource::Local));
    }

    let entries =
        std::fs::read_dir(path).map_err(|e| format!("Failed to read directory: {}", e))?;

    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
        let metadata = entry
            .metadata()
            .map_err(|e| format!("Failed to read metadata: {}", e))?;

        let name = entry.file_name().to_string_lossy().to_string();
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        let modified = metadata.modified().ok().and_then(|mtime| {
            let duration = mtime.duration_since(std::time::UNIX_EPOCH).ok()?;
            Utc.timestamp_opt(duration.as_secs() as i64, 0).single()
        });

        let (owner, group, permissions) = unix_attributes(&metadata);

        result.push(DirectoryEntry {
            name,
            path: entry.path(),
            kind,
            source: FileSource::Local,
            size: metadata.len(),
            last_mod_time: modified,
            owner,
            group,
            permissions,
        });
    }

    Ok(result)
}

#[cfg(unix)]
fn unix_attributes(
    metadata: &std::fs::Metadata,
) -> (Option<String>, Option<String>, Option<String>) {
    use std::os::unix::fs::MetadataExt;
    (
        Some(metadata.uid().to_string()),
        Some(metadata.gid().to_string()),
        Some(mode_to_string(metadata.mode(), metadata.is_dir())),
    )
}

#[cfg(not(unix))]
fn unix_attributes(
    _metadata: &std::fs::Metadata,
) -> (Option<String>, Option<String>, Option<String>) {
    (None, None, None)
}

/// Render a unix mode as the familiar "drwxr-xr-x" string
#[cfg(unix)]
fn mode_to_string(mode: u32, is_dir: bool) -> String {
    let mut out = String::with_capacity(10);
    out.push(if is_dir { 'd' } else { '-' });
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}
