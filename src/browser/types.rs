//! Directory entry model shared by the local and remote browsers

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// What a directory entry is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// The synthesized ".." entry at the top of a listing
    ParentDirectory,
}

/// Which filesystem a pane (and its entries) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSource {
    Local,
    Remote,
}

/// One file or directory as known to a listing operation.
///
/// Immutable value: listings are replaced wholesale on every refresh,
/// never patched in place.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub name: String,
    /// Fully qualified within its filesystem
    pub path: PathBuf,
    pub kind: EntryKind,
    pub source: FileSource,
    pub size: u64,
    pub last_mod_time: Option<DateTime<Utc>>,
    pub owner: Option<String>,
    pub group: Option<String>,
    /// "drwxr-xr-x" style string when the listing provides one
    pub permissions: Option<String>,
}

impl DirectoryEntry {
    pub fn file(path: impl Into<PathBuf>, source: FileSource) -> Self {
        let path = path.into();
        Self {
            name: file_name_of(&path),
            path,
            kind: EntryKind::File,
            source,
            size: 0,
            last_mod_time: None,
            owner: None,
            group: None,
            permissions: None,
        }
    }

    pub fn directory(path: impl Into<PathBuf>, source: FileSource) -> Self {
        let path = path.into();
        Self {
            name: file_name_of(&path),
            path,
            kind: EntryKind::Directory,
            source,
            size: 0,
            last_mod_time: None,
            owner: None,
            group: None,
            permissions: None,
        }
    }

    /// The ".." entry pointing at the parent of `path`
    pub fn parent_of(path: &Path, source: FileSource) -> Self {
        Self {
            name: "..".to_string(),
            path: path.parent().unwrap_or(Path::new("/")).to_path_buf(),
            kind: EntryKind::ParentDirectory,
            source,
            size: 0,
            last_mod_time: None,
            owner: None,
            group: None,
            permissions: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, EntryKind::Directory | EntryKind::ParentDirectory)
    }

    pub fn is_parent(&self) -> bool {
        self.kind == EntryKind::ParentDirectory
    }

    /// Format modified date for display
    pub fn formatted_modified(&self) -> String {
        match &self.last_mod_time {
            Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            None => "—".to_string(),
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Sort entries for display: parent first, directories before files,
/// then case-insensitive by name.
pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    // Each key is a proper comparison so the order stays total even if
    // a slice carries duplicate parent entries
    entries.sort_by(|a, b| {
        b.is_parent()
            .cmp(&a.is_parent())
            .then_with(|| b.is_folder().cmp(&a.is_folder()))
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

/// Format file size for display
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.1} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.1} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.1} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_file(name: &str) -> DirectoryEntry {
        let mut entry = DirectoryEntry::file(format!("/test/{}", name), FileSource::Local);
        entry.size = 1024;
        entry
    }

    fn make_dir(name: &str) -> DirectoryEntry {
        DirectoryEntry::directory(format!("/test/{}", name), FileSource::Local)
    }

    #[test]
    fn parent_entry_is_named_dotdot() {
        let entry = DirectoryEntry::parent_of(Path::new("/var/log"), FileSource::Remote);
        assert_eq!(entry.name, "..");
        assert_eq!(entry.path, PathBuf::from("/var"));
        assert!(entry.is_parent());
        assert!(entry.is_folder());
        assert!(!entry.is_file());
    }

    #[test]
    fn parent_of_root_points_at_root() {
        let entry = DirectoryEntry::parent_of(Path::new("/"), FileSource::Local);
        assert_eq!(entry.path, PathBuf::from("/"));
    }

    #[test]
    fn file_and_folder_predicates() {
        assert!(make_file("a.txt").is_file());
        assert!(!make_file("a.txt").is_folder());
        assert!(make_dir("sub").is_folder());
        assert!(!make_dir("sub").is_parent());
    }

    #[test]
    fn constructors_derive_name_from_path() {
        assert_eq!(make_file("notes.txt").name, "notes.txt");
        assert_eq!(make_dir("src").name, "src");
    }

    #[test]
    fn sort_keeps_parent_first() {
        let mut entries = vec![
            make_file("zebra.txt"),
            DirectoryEntry::parent_of(Path::new("/test"), FileSource::Local),
            make_file("apple.txt"),
        ];

        sort_entries(&mut entries);

        assert_eq!(entries[0].name, "..");
    }

    #[test]
    fn sort_tolerates_duplicate_parent_entries() {
        let mut entries = vec![
            DirectoryEntry::parent_of(Path::new("/test"), FileSource::Local),
            make_file("a.txt"),
            DirectoryEntry::parent_of(Path::new("/test"), FileSource::Local),
            make_dir("sub"),
        ];

        sort_entries(&mut entries);

        assert!(entries[0].is_parent());
        assert!(entries[1].is_parent());
        assert_eq!(entries[2].name, "sub");
        assert_eq!(entries[3].name, "a.txt");
    }

    #[test]
    fn sort_directories_before_files() {
        let mut entries = vec![
            make_file("zebra.txt"),
            make_dir("apple"),
            make_file("banana.txt"),
            make_dir("cherry"),
        ];

        sort_entries(&mut entries);

        assert!(entries[0].is_folder());
        assert!(entries[1].is_folder());
        assert!(entries[2].is_file());
        assert!(entries[3].is_file());
    }

    #[test]
    fn sort_alphabetically_case_insensitive() {
        let mut entries = vec![
            make_file("Zebra.txt"),
            make_file("apple.txt"),
            make_file("BANANA.txt"),
        ];

        sort_entries(&mut entries);

        assert_eq!(entries[0].name, "apple.txt");
        assert_eq!(entries[1].name, "BANANA.txt");
        assert_eq!(entries[2].name, "Zebra.txt");
    }

    #[test]
    fn sort_combined_rules() {
        let mut entries = vec![
            make_file("zebra.txt"),
            make_dir("docs"),
            DirectoryEntry::parent_of(Path::new("/test"), FileSource::Local),
            make_file("apple.txt"),
            make_dir("src"),
        ];

        sort_entries(&mut entries);

        assert_eq!(entries[0].name, "..");
        assert_eq!(entries[1].name, "docs");
        assert_eq!(entries[2].name, "src");
        assert_eq!(entries[3].name, "apple.txt");
        assert_eq!(entries[4].name, "zebra.txt");
    }

    #[test]
    fn format_size_bytes_through_gigabytes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn formatted_modified_without_date() {
        assert_eq!(make_file("a").formatted_modified(), "—");
    }
}
