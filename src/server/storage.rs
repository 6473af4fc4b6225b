//! Server-side layout storage.
//!
//! Layouts are stored per user as a JSON document:
//! ```text
//! <DATA_DIR>/
//!   <user_id>/
//!     layouts.json
//! ```
//!
//! Writes are serialized by a process-wide lock and land atomically via a
//! temp file and rename.

use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use layoutsync_core::{LayoutId, RemoteLayout};

const LAYOUTS_FILE: &str = "layouts.json";

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum LayoutStoreError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// A stored document could not be parsed.
    CorruptDocument(PathBuf, serde_json::Error),
    /// Invalid user ID (e.g., contains path separators).
    InvalidUserId(String),
    NotFound(LayoutId),
    AlreadyExists(LayoutId),
    /// The stored layout changed after the client's baseline.
    Modified(LayoutId),
}

impl std::fmt::Display for LayoutStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutStoreError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            LayoutStoreError::CorruptDocument(path, e) => {
                write!(f, "Failed to load layouts {}: {}", path.display(), e)
            }
            LayoutStoreError::InvalidUserId(id) => write!(f, "Invalid user ID: {}", id),
            LayoutStoreError::NotFound(id) => write!(f, "Layout not found: {}", id),
            LayoutStoreError::AlreadyExists(id) => write!(f, "Layout already exists: {}", id),
            LayoutStoreError::Modified(id) => {
                write!(f, "Layout {} was modified since the given timestamp", id)
            }
        }
    }
}

impl std::error::Error for LayoutStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LayoutStoreError::IoError(_, e) => Some(e),
            LayoutStoreError::CorruptDocument(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Name and data for a create or replace.
#[derive(Debug, Clone)]
pub struct LayoutContent {
    pub name: String,
    pub data: serde_json::Value,
}

/// Per-user layout documents on disk.
///
/// Every write gets an `updated_at` strictly greater than any earlier one,
/// so clients can use it as a precondition.
#[derive(Debug)]
pub struct LayoutFileStore {
    data_dir: PathBuf,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl LayoutFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            last_stamp: Mutex::new(None),
        }
    }

    /// Validates a user ID to prevent path traversal attacks.
    fn validate_user_id(user_id: &str) -> Result<(), LayoutStoreError> {
        if user_id.is_empty()
            || user_id.contains('/')
            || user_id.contains('\\')
            || user_id.contains("..")
            || user_id.starts_with('.')
        {
            return Err(LayoutStoreError::InvalidUserId(user_id.to_string()));
        }
        Ok(())
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(user_id)
    }

    fn document_path(&self, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join(LAYOUTS_FILE)
    }

    fn read_document(&self, user_id: &str) -> Result<Vec<RemoteLayout>, LayoutStoreError> {
        Self::validate_user_id(user_id)?;
        let path = self.document_path(user_id);

        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| LayoutStoreError::CorruptDocument(path, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(LayoutStoreError::IoError(path, e)),
        }
    }

    fn write_document(
        &self,
        user_id: &str,
        layouts: &[RemoteLayout],
    ) -> Result<(), LayoutStoreError> {
        let user_dir = self.user_dir(user_id);
        let path = self.document_path(user_id);

        fs::create_dir_all(&user_dir)
            .map_err(|e| LayoutStoreError::IoError(user_dir.clone(), e))?;

        let bytes = serde_json::to_vec_pretty(layouts)
            .map_err(|e| LayoutStoreError::CorruptDocument(path.clone(), e))?;

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, bytes)
            .map_err(|e| LayoutStoreError::IoError(temp_path.clone(), e))?;
        fs::rename(&temp_path, &path).map_err(|e| LayoutStoreError::IoError(path, e))?;

        Ok(())
    }

    /// Runs a read-modify-write of one user's document under the write lock.
    fn modify<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut Vec<RemoteLayout>, DateTime<Utc>) -> Result<T, LayoutStoreError>,
    ) -> Result<T, LayoutStoreError> {
        let mut last_stamp = self.last_stamp.lock().unwrap_or_else(|e| e.into_inner());
        let mut layouts = self.read_document(user_id)?;

        let now = Utc::now();
        let stamp = match *last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };

        let result = f(&mut layouts, stamp)?;
        self.write_document(user_id, &layouts)?;
        *last_stamp = Some(stamp);
        Ok(result)
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<RemoteLayout>, LayoutStoreError> {
        let mut layouts = self.read_document(user_id)?;
        layouts.sort_by_key(|l| l.id);
        Ok(layouts)
    }

    pub fn get(&self, user_id: &str, id: LayoutId) -> Result<Option<RemoteLayout>, LayoutStoreError> {
        Ok(self.read_document(user_id)?.into_iter().find(|l| l.id == id))
    }

    /// Creates a layout under the client-chosen ID.
    pub fn create(
        &self,
        user_id: &str,
        id: LayoutId,
        content: LayoutContent,
    ) -> Result<RemoteLayout, LayoutStoreError> {
        self.modify(user_id, |layouts, stamp| {
            if layouts.iter().any(|l| l.id == id) {
                return Err(LayoutStoreError::AlreadyExists(id));
            }
            let layout = RemoteLayout {
                id,
                name: content.name,
                data: content.data,
                updated_at: stamp,
            };
            layouts.push(layout.clone());
            Ok(layout)
        })
    }

    /// Replaces a layout. With `if_unmodified_since`, fails unless the stored
    /// `updated_at` equals it.
    pub fn replace(
        &self,
        user_id: &str,
        id: LayoutId,
        content: LayoutContent,
        if_unmodified_since: Option<DateTime<Utc>>,
    ) -> Result<RemoteLayout, LayoutStoreError> {
        self.modify(user_id, |layouts, stamp| {
            let current = layouts
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or(LayoutStoreError::NotFound(id))?;

            if let Some(since) = if_unmodified_since {
                if current.updated_at != since {
                    return Err(LayoutStoreError::Modified(id));
                }
            }

            current.name = content.name;
            current.data = content.data;
            current.updated_at = stamp;
            Ok(current.clone())
        })
    }

    /// Deletes a layout. Returns false if it did not exist. With
    /// `if_unmodified_since`, fails unless the stored `updated_at` equals it.
    pub fn delete(
        &self,
        user_id: &str,
        id: LayoutId,
        if_unmodified_since: Option<DateTime<Utc>>,
    ) -> Result<bool, LayoutStoreError> {
        self.modify(user_id, |layouts, _| {
            let Some(index) = layouts.iter().position(|l| l.id == id) else {
                return Ok(false);
            };
            if let Some(since) = if_unmodified_since {
                if layouts[index].updated_at != since {
                    return Err(LayoutStoreError::Modified(id));
                }
            }
            layouts.remove(index);
            Ok(true)
        })
    }
}
