//! FileItem (C2): a directory-entry snapshot, independent of the VDT.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::attrs::FileAttributes;
use crate::path;

/// Value object describing one directory entry as captured from the real
/// filesystem (§3). `fileSize == -1` is modeled as `None`.
#[derive(Debug, Clone)]
pub struct FileItem {
    pub name: String,
    pub short_name: Option<String>,
    pub attributes: FileAttributes,
    pub creation_time: SystemTime,
    pub last_access_time: SystemTime,
    pub modification_time: SystemTime,
    pub file_size: Option<u64>,
    /// Absolute path of the containing real directory (the layer root plus
    /// any intervening relative path, not including `name` itself).
    pub source: PathBuf,
}

impl FileItem {
    pub fn full_path(&self) -> PathBuf {
        path::join(&self.source, &self.name)
    }

    pub fn full_path_with_prefix(&self) -> PathBuf {
        path::with_long_path_prefix(&self.full_path())
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    /// Builds a [`FileItem`] from real filesystem metadata, as produced by
    /// [`crate::tree::builder::build_tree`] while walking a backing layer.
    pub fn from_metadata(source: &Path, name: &str, meta: &std::fs::Metadata) -> Self {
        let mut attributes = FileAttributes::empty();
        if meta.is_dir() {
            attributes |= FileAttributes::DIRECTORY;
        } else {
            attributes |= FileAttributes::NORMAL;
        }
        if meta.permissions().readonly() {
            attributes |= FileAttributes::READONLY;
        }
        if name.starts_with('.') {
            attributes |= FileAttributes::HIDDEN;
        }
        FileItem {
            name: name.to_string(),
            short_name: None,
            attributes,
            creation_time: meta.created().unwrap_or(SystemTime::UNIX_EPOCH),
            last_access_time: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
            modification_time: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            file_size: if meta.is_dir() { None } else { Some(meta.len()) },
            source: source.to_path_buf(),
        }
    }

    /// Synthesizes a root directory item adopting the write target's own
    /// timestamps as a stand-in for the (absent, in this environment) real
    /// mount point's attributes (§4.1).
    pub fn synthesize_root(write_target: &Path) -> Self {
        let meta = std::fs::metadata(write_target).ok();
        let now = SystemTime::now();
        FileItem {
            name: String::new(),
            short_name: None,
            attributes: FileAttributes::DIRECTORY,
            creation_time: meta.as_ref().and_then(|m| m.created().ok()).unwrap_or(now),
            last_access_time: meta.as_ref().and_then(|m| m.accessed().ok()).unwrap_or(now),
            modification_time: meta.as_ref().and_then(|m| m.modified().ok()).unwrap_or(now),
            file_size: None,
            source: write_target.to_path_buf(),
        }
    }
}
