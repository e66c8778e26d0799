//! Change detection between a document record and its file.
//!
//! [`classify`] is a pure function of a record and a file observation.
//! [`ChangeDetector`] pairs it with the filesystem read so callers get both
//! the status and the observation it was computed from.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::{DocumentReference, StorageMode, SyncStatus};
use crate::sync::file::{observe, FileObservation};

/// A classification together with the file state it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub status: SyncStatus,
    pub file: FileObservation,
}

/// Classify how a record relates to what is on disk.
///
/// Timestamps only break ties when hashes differ. Whenever they cannot
/// settle the question (missing, equal, or contradicting `last_synced_at`)
/// the result is `Conflict`, never a silent pick.
#[must_use]
pub fn classify(doc: &DocumentReference, file: &FileObservation) -> SyncStatus {
    match doc.storage_mode {
        StorageMode::FileOnly => SyncStatus::Synced,
        StorageMode::DatabaseOnly => {
            if file.exists() {
                SyncStatus::Conflict
            } else {
                SyncStatus::Synced
            }
        }
        StorageMode::Hybrid => classify_hybrid(doc, file),
    }
}

fn classify_hybrid(doc: &DocumentReference, file: &FileObservation) -> SyncStatus {
    let (file_hash, file_mtime) = match (doc.content_hash.as_deref(), file) {
        (None, FileObservation::Absent) => return SyncStatus::Synced,
        (Some(_), FileObservation::Absent) => return SyncStatus::MissingFile,
        (None, FileObservation::Present { .. }) => return SyncStatus::MissingDb,
        (Some(_), FileObservation::Present {
            hash, modified_at, ..
        }) => (hash.as_str(), *modified_at),
    };

    if doc.content_hash.as_deref() == Some(file_hash) {
        return SyncStatus::Synced;
    }

    let db_time = doc.content_updated_at;

    let Some(last_synced) = doc.last_synced_at else {
        // First sync: the later side wins
        return match (file_mtime, db_time) {
            (Some(f), Some(d)) if f > d => SyncStatus::FileNewer,
            (Some(f), Some(d)) if d > f => SyncStatus::DbNewer,
            _ => SyncStatus::Conflict,
        };
    };

    let file_changed = file_mtime.map(|t| t > last_synced);
    let db_changed = db_time.map(|t| t > last_synced);

    match (file_changed, db_changed) {
        (Some(true), Some(false)) => SyncStatus::FileNewer,
        (Some(false), Some(true)) => SyncStatus::DbNewer,
        _ => SyncStatus::Conflict,
    }
}

/// Reads document files under a project root and classifies them.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    root: PathBuf,
}

impl ChangeDetector {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a document's file.
    #[must_use]
    pub fn path_for(&self, doc: &DocumentReference) -> PathBuf {
        self.root.join(&doc.file_path)
    }

    /// Read the document's file.
    ///
    /// `file_only` documents are never read; their observation is `Absent`
    /// since classification does not depend on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn observe(&self, doc: &DocumentReference) -> Result<FileObservation> {
        if doc.storage_mode == StorageMode::FileOnly {
            return Ok(FileObservation::Absent);
        }
        Ok(observe(&self.path_for(doc))?)
    }

    /// Observe and classify a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn detect(&self, doc: &DocumentReference) -> Result<Detection> {
        let file = self.observe(doc)?;
        Ok(Detection {
            status: classify(doc, &file),
            file,
        })
    }
}
