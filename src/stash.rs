//! Durable map from local-file identity to in-flight object key (§4.2).
//!
//! All three operations are best-effort from the caller's perspective:
//! errors are always [`AttachmentError::StashError`], which callers log
//! and swallow rather than fail the upload over.

use crate::error::{AttachmentError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// The three operations a resumption store must provide.
pub trait Stash: Send + Sync {
    /// Records that an upload of `local_filename` is in progress under
    /// `object_key`. Idempotent overwrite.
    fn start(&self, local_filename: &str, object_key: &str) -> Result<()>;

    /// Returns the most recent in-progress object key for this file, if
    /// any.
    fn lookup(&self, local_filename: &str) -> Result<Option<String>>;

    /// Removes the entry for this file.
    fn stop(&self, local_filename: &str) -> Result<()>;
}

/// A `sled`-backed [`Stash`], grounded in the teacher's `cli::db::Db`
/// (minus the part-tracking trees, which belong to `MultipartUploader`'s
/// resume table rather than the stash itself).
pub struct SledStash {
    tree: sled::Tree,
}

const TREE_NAME: &str = "attachment-stash";

impl SledStash {
    /// Opens (creating if necessary) a stash database at `path`.
    ///
    /// # Errors
    /// Returns `StashError` if the database cannot be opened.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .mode(sled::Mode::LowSpace)
            .open()
            .map_err(|e| AttachmentError::StashError(e.into()))?;
        let tree = db
            .open_tree(TREE_NAME)
            .map_err(|e| AttachmentError::StashError(e.into()))?;
        Ok(Self { tree })
    }
}

impl Stash for SledStash {
    fn start(&self, local_filename: &str, object_key: &str) -> Result<()> {
        self.tree
            .insert(local_filename, object_key)
            .map_err(|e| AttachmentError::StashError(e.into()))?;
        Ok(())
    }

    fn lookup(&self, local_filename: &str) -> Result<Option<String>> {
        let value = self
            .tree
            .get(local_filename)
            .map_err(|e| AttachmentError::StashError(e.into()))?;
        value
            .map(|v| {
                String::from_utf8(v.to_vec())
                    .map_err(|e| AttachmentError::StashError(e.into()))
            })
            .transpose()
    }

    fn stop(&self, local_filename: &str) -> Result<()> {
        self.tree
            .remove(local_filename)
            .map_err(|e| AttachmentError::StashError(e.into()))?;
        Ok(())
    }
}

/// An in-memory [`Stash`] for tests and for callers with no durability
/// requirement.
#[derive(Default)]
pub struct MemoryStash {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStash {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stash for MemoryStash {
    fn start(&self, local_filename: &str, object_key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(local_filename.to_string(), object_key.to_string());
        Ok(())
    }

    fn lookup(&self, local_filename: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(local_filename).cloned())
    }

    fn stop(&self, local_filename: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(local_filename);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_stash_start_lookup_stop() {
        let stash = MemoryStash::new();
        assert_eq!(stash.lookup("a.txt").unwrap(), None);

        stash.start("a.txt", "upload-1").unwrap();
        assert_eq!(stash.lookup("a.txt").unwrap(), Some("upload-1".to_string()));

        stash.start("a.txt", "upload-2").unwrap();
        assert_eq!(stash.lookup("a.txt").unwrap(), Some("upload-2".to_string()));

        stash.stop("a.txt").unwrap();
        assert_eq!(stash.lookup("a.txt").unwrap(), None);
    }

    #[test]
    fn sled_stash_start_lookup_stop() {
        let dir = tempfile::tempdir().unwrap();
        let stash = SledStash::open(&dir.path().join("stash")).unwrap();

        stash.start("file.bin", "obj-key-1").unwrap();
        assert_eq!(
            stash.lookup("file.bin").unwrap(),
            Some("obj-key-1".to_string())
        );

        stash.stop("file.bin").unwrap();
        assert_eq!(stash.lookup("file.bin").unwrap(), None);
    }
}
