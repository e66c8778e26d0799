//! Sync orchestration.
//!
//! `SyncOrchestrator` reconciles documents between the content store and the
//! filesystem. Every per-document operation holds that document's lock for
//! its whole duration. File I/O happens outside any store transaction; the
//! store's short compare-and-set commit then persists the outcome.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{DocumentFilter, DocumentReference, DocumentUpdate, StorageMode, SyncStatus};
use crate::storage::events::EventType;
use crate::storage::{DocumentStore, SyncCommit};
use crate::sync::detector::{ChangeDetector, Detection};
use crate::sync::file::{atomic_write, modified_millis, remove_if_exists};
use crate::sync::locks::LockTable;
use crate::sync::resolver::{ConflictCandidates, ConflictResolver, ConflictStrategy, Winner};

/// Default size of the bulk sync worker pool.
pub const DEFAULT_WORKERS: usize = 4;

/// Which way content should flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    DbToFile,
    FileToDb,
    /// Route by the detected status.
    #[default]
    Bidirectional,
}

impl SyncDirection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DbToFile => "db_to_file",
            Self::FileToDb => "file_to_db",
            Self::Bidirectional => "bidirectional",
        }
    }

    /// Parse a direction name (accepts `-` or `_`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "db_to_file" | "to_file" | "push" => Ok(Self::DbToFile),
            "file_to_db" | "to_db" | "pull" => Ok(Self::FileToDb),
            "bidirectional" | "both" | "auto" => Ok(Self::Bidirectional),
            other => Err(Error::InvalidArgument(format!(
                "unknown sync direction '{other}' (expected db-to-file, file-to-db or bidirectional)"
            ))),
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a sync did (or, in a dry run, would do).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    None,
    WroteFile,
    WroteDatabase,
    ResolvedConflict,
    RemovedStrayFile,
}

impl SyncAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::WroteFile => "wrote_file",
            Self::WroteDatabase => "wrote_database",
            Self::ResolvedConflict => "resolved_conflict",
            Self::RemovedStrayFile => "removed_stray_file",
        }
    }
}

/// Result of syncing one document.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub document_id: String,
    pub file_path: String,
    pub direction: SyncDirection,
    pub status_before: SyncStatus,
    pub action: SyncAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    pub status_after: SyncStatus,
}

impl SyncReport {
    fn unchanged(doc: &DocumentReference, direction: SyncDirection, status: SyncStatus) -> Self {
        Self {
            document_id: doc.id.clone(),
            file_path: doc.file_path.clone(),
            direction,
            status_before: status,
            action: SyncAction::None,
            winner: None,
            status_after: status,
        }
    }
}

/// Per-document outcome inside a bulk sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOutcome {
    AlreadySynced,
    Updated,
    ConflictResolved,
    /// Dry run: the document would be synced.
    Planned,
    Failed,
    /// Not started because the run was cancelled.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItem {
    pub document_id: String,
    pub file_path: String,
    pub outcome: BulkOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_before: Option<SyncStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<SyncAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl BulkItem {
    fn new(doc: &DocumentReference, outcome: BulkOutcome) -> Self {
        Self {
            document_id: doc.id.clone(),
            file_path: doc.file_path.clone(),
            outcome,
            status_before: None,
            action: None,
            error: None,
            error_code: None,
        }
    }

    fn failed(doc: &DocumentReference, err: &Error) -> Self {
        Self {
            error: Some(err.to_string()),
            error_code: Some(err.error_code().as_str().to_string()),
            ..Self::new(doc, BulkOutcome::Failed)
        }
    }
}

/// Aggregate result of a bulk sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkSyncReport {
    pub dry_run: bool,
    pub cancelled: bool,
    pub total: usize,
    pub already_synced: usize,
    pub updated: usize,
    pub conflicts_resolved: usize,
    pub planned: usize,
    pub errors: usize,
    pub skipped: usize,
    pub items: Vec<BulkItem>,
}

impl BulkSyncReport {
    fn from_items(items: Vec<BulkItem>, dry_run: bool, cancelled: bool) -> Self {
        let mut report = Self {
            dry_run,
            cancelled,
            total: items.len(),
            ..Self::default()
        };
        for item in &items {
            match item.outcome {
                BulkOutcome::AlreadySynced => report.already_synced += 1,
                BulkOutcome::Updated => report.updated += 1,
                BulkOutcome::ConflictResolved => report.conflicts_resolved += 1,
                BulkOutcome::Planned => report.planned += 1,
                BulkOutcome::Failed => report.errors += 1,
                BulkOutcome::Skipped => report.skipped += 1,
            }
        }
        report.items = items;
        report
    }

    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.errors > 0
    }

    /// Items that failed.
    pub fn failures(&self) -> impl Iterator<Item = &BulkItem> {
        self.items
            .iter()
            .filter(|i| i.outcome == BulkOutcome::Failed)
    }
}

/// The action a sync would take for a classified document.
#[must_use]
pub const fn planned_action(mode: StorageMode, status: SyncStatus) -> SyncAction {
    match (mode, status) {
        (StorageMode::FileOnly, _) | (_, SyncStatus::Synced) => SyncAction::None,
        (StorageMode::DatabaseOnly, _) => SyncAction::RemovedStrayFile,
        (StorageMode::Hybrid, SyncStatus::DbNewer | SyncStatus::MissingFile) => {
            SyncAction::WroteFile
        }
        (StorageMode::Hybrid, SyncStatus::FileNewer | SyncStatus::MissingDb) => {
            SyncAction::WroteDatabase
        }
        (StorageMode::Hybrid, SyncStatus::Conflict) => SyncAction::ResolvedConflict,
    }
}

/// Drives reconciliation for single documents and batches.
#[derive(Debug)]
pub struct SyncOrchestrator {
    store: Arc<DocumentStore>,
    detector: ChangeDetector,
    locks: LockTable,
    strategy: ConflictStrategy,
    workers: usize,
}

impl SyncOrchestrator {
    /// Create an orchestrator over `store` for files under `root`.
    #[must_use]
    pub fn new(store: Arc<DocumentStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            detector: ChangeDetector::new(root),
            locks: LockTable::new(),
            strategy: ConflictStrategy::default(),
            workers: DEFAULT_WORKERS,
        }
    }

    /// Default conflict strategy for bidirectional syncs.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Bulk sync worker pool size (at least one).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.detector.root()
    }

    #[must_use]
    pub const fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Per-document locks, shared with the structure migrator.
    #[must_use]
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Absolute path of a document's file.
    #[must_use]
    pub fn absolute_path(&self, doc: &DocumentReference) -> PathBuf {
        self.detector.path_for(doc)
    }

    /// Classify a document now and refresh its cached status.
    ///
    /// # Errors
    ///
    /// Returns `DocumentNotFound` or an I/O error reading the file.
    pub fn status(&self, id: &str) -> Result<Detection> {
        let _lock = self.locks.lock(id);
        let doc = self.store.read(id)?;
        let detection = self.detector.detect(&doc)?;
        if detection.status != doc.sync_status {
            self.store.record_status(id, detection.status)?;
        }
        Ok(detection)
    }

    /// Refresh cached statuses for every document matching `filter`.
    ///
    /// Returns how many cached values changed.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails. Per-document read errors are logged.
    pub fn refresh_statuses(&self, filter: &DocumentFilter) -> Result<usize> {
        let mut changed = 0;
        for doc in self.store.list(filter)? {
            match self.status(&doc.id) {
                Ok(detection) if detection.status != doc.sync_status => changed += 1,
                Ok(_) => {}
                Err(e) => warn!(document_id = %doc.id, error = %e, "Could not classify document"),
            }
        }
        Ok(changed)
    }

    /// Sync one document using the configured conflict strategy.
    ///
    /// # Errors
    ///
    /// Propagates store, I/O and resolver errors directly.
    pub fn sync_document(&self, id: &str, direction: SyncDirection) -> Result<SyncReport> {
        self.sync_document_with(id, direction, self.strategy)
    }

    /// Sync one document with an explicit conflict strategy.
    ///
    /// An explicit direction overrides the detected status: `db_to_file`
    /// overwrites the file and `file_to_db` overwrites the database whenever
    /// the two differ.
    ///
    /// # Errors
    ///
    /// Propagates store, I/O and resolver errors directly. Directional syncs
    /// whose source side is missing return `InvalidArgument`.
    pub fn sync_document_with(
        &self,
        id: &str,
        direction: SyncDirection,
        strategy: ConflictStrategy,
    ) -> Result<SyncReport> {
        let _lock = self.locks.lock(id);
        self.sync_locked(id, direction, strategy)
    }

    fn sync_locked(
        &self,
        id: &str,
        direction: SyncDirection,
        strategy: ConflictStrategy,
    ) -> Result<SyncReport> {
        let doc = self.store.read(id)?;
        let detection = self.detector.detect(&doc)?;
        let before = detection.status;
        debug!(document_id = %id, status = %before, direction = %direction, "Classified document");

        let mut report = SyncReport::unchanged(&doc, direction, before);
        if before == SyncStatus::Synced {
            if doc.sync_status != SyncStatus::Synced {
                self.store.record_status(id, SyncStatus::Synced)?;
            }
            return Ok(report);
        }

        let (action, winner) = match doc.storage_mode {
            StorageMode::FileOnly => return Ok(report),
            StorageMode::DatabaseOnly => {
                self.remove_stray_file(&doc, &detection, direction, strategy)?
            }
            StorageMode::Hybrid => match direction {
                SyncDirection::DbToFile => self.push_to_file(&doc)?,
                SyncDirection::FileToDb => self.pull_from_file(&doc, &detection)?,
                SyncDirection::Bidirectional => match before {
                    SyncStatus::FileNewer | SyncStatus::MissingDb => {
                        self.pull_from_file(&doc, &detection)?
                    }
                    SyncStatus::Conflict => self.resolve_conflict(&doc, &detection, strategy)?,
                    _ => self.push_to_file(&doc)?,
                },
            },
        };

        info!(
            document_id = %id,
            path = %doc.file_path,
            status = %before,
            action = action.as_str(),
            "Synced document"
        );

        report.action = action;
        report.winner = winner;
        report.status_after = SyncStatus::Synced;
        Ok(report)
    }

    fn push_to_file(&self, doc: &DocumentReference) -> Result<(SyncAction, Option<Winner>)> {
        let content = db_content(doc)?;
        let path = self.absolute_path(doc);
        atomic_write(&path, content)?;
        self.commit(doc, None, modified_millis(&path), EventType::DocumentSynced, "db_to_file")?;
        Ok((SyncAction::WroteFile, None))
    }

    fn pull_from_file(
        &self,
        doc: &DocumentReference,
        detection: &Detection,
    ) -> Result<(SyncAction, Option<Winner>)> {
        let content = file_content(doc, detection)?;
        self.commit(
            doc,
            Some(content),
            detection.file.modified_at(),
            EventType::DocumentSynced,
            "file_to_db",
        )?;
        Ok((SyncAction::WroteDatabase, None))
    }

    fn resolve_conflict(
        &self,
        doc: &DocumentReference,
        detection: &Detection,
        strategy: ConflictStrategy,
    ) -> Result<(SyncAction, Option<Winner>)> {
        let winner = self.pick_winner(doc, detection, strategy)?;

        match winner {
            Winner::Database => {
                let path = self.absolute_path(doc);
                atomic_write(&path, db_content(doc)?)?;
                self.commit(
                    doc,
                    None,
                    modified_millis(&path),
                    EventType::ConflictResolved,
                    "database version kept",
                )?;
            }
            Winner::File => {
                let content = file_content(doc, detection)?;
                self.commit(
                    doc,
                    Some(content),
                    detection.file.modified_at(),
                    EventType::ConflictResolved,
                    "file version kept",
                )?;
            }
        }

        info!(document_id = %doc.id, strategy = %strategy, winner = ?winner, "Resolved conflict");
        Ok((SyncAction::ResolvedConflict, Some(winner)))
    }

    /// Ask the resolver for a winner. A refusal leaves the cached status at
    /// `conflict` so `status` reports it without a refresh.
    fn pick_winner(
        &self,
        doc: &DocumentReference,
        detection: &Detection,
        strategy: ConflictStrategy,
    ) -> Result<Winner> {
        match ConflictResolver::new(strategy).resolve(&candidates(doc, detection)) {
            Ok(winner) => Ok(winner),
            Err(e) => {
                if let Err(record) = self.store.record_status(&doc.id, SyncStatus::Conflict) {
                    warn!(document_id = %doc.id, error = %record, "Could not cache conflict status");
                }
                Err(e)
            }
        }
    }

    /// A database-only document must not have a file. The file is removed;
    /// if the file side wins, its content is adopted first.
    fn remove_stray_file(
        &self,
        doc: &DocumentReference,
        detection: &Detection,
        direction: SyncDirection,
        strategy: ConflictStrategy,
    ) -> Result<(SyncAction, Option<Winner>)> {
        let winner = match direction {
            SyncDirection::DbToFile => Winner::Database,
            SyncDirection::FileToDb => Winner::File,
            SyncDirection::Bidirectional => {
                self.pick_winner(doc, detection, strategy)?
            }
        };

        let path = self.absolute_path(doc);
        match winner {
            Winner::File => {
                let content = file_content(doc, detection)?;
                self.commit(doc, Some(content), None, EventType::StrayFileRemoved, "file content adopted")?;
                remove_if_exists(&path)?;
            }
            Winner::Database => {
                remove_if_exists(&path)?;
                self.commit(doc, None, None, EventType::StrayFileRemoved, "stray file discarded")?;
            }
        }

        warn!(document_id = %doc.id, path = %doc.file_path, "Removed file of database-only document");
        Ok((SyncAction::RemovedStrayFile, Some(winner)))
    }

    /// `file_mtime` is the modification time of the file both sides now
    /// agree with, or `None` when no file remains.
    fn commit(
        &self,
        doc: &DocumentReference,
        content: Option<&str>,
        file_mtime: Option<i64>,
        event: EventType,
        comment: &str,
    ) -> Result<DocumentReference> {
        let commit = SyncCommit {
            expected_hash: doc.content_hash.as_deref(),
            content,
            synced_at: sync_stamp(doc, file_mtime),
            event,
            comment: Some(comment.to_string()),
        };
        self.store
            .commit_sync(&doc.id, &commit)?
            .ok_or_else(|| Error::ConcurrentModification { id: doc.id.clone() })
    }

    /// Replace a document's content and propagate it to disk.
    ///
    /// Hybrid documents are written through to their file. `file_only`
    /// documents have their file rewritten directly; the database keeps
    /// metadata only.
    ///
    /// # Errors
    ///
    /// Propagates store and I/O errors.
    pub fn write_content(&self, id: &str, content: &str) -> Result<DocumentReference> {
        let _lock = self.locks.lock(id);
        let doc = self.store.read(id)?;

        match doc.storage_mode {
            StorageMode::FileOnly => {
                atomic_write(&self.absolute_path(&doc), content)?;
                Ok(doc)
            }
            StorageMode::DatabaseOnly => self.store.update(id, DocumentUpdate::content(content)),
            StorageMode::Hybrid => {
                self.store.update(id, DocumentUpdate::content(content))?;
                self.sync_locked(id, SyncDirection::DbToFile, self.strategy)?;
                self.store.read(id)
            }
        }
    }

    /// Delete a document, its file (hybrid only) and its index entry.
    ///
    /// Files of `file_only` documents are left in place; they are not owned
    /// by the store.
    ///
    /// # Errors
    ///
    /// Returns `DocumentNotFound` or an I/O error removing the file.
    pub fn delete_document(&self, id: &str) -> Result<DocumentReference> {
        let _lock = self.locks.lock(id);
        let doc = self.store.read(id)?;
        if doc.storage_mode == StorageMode::Hybrid {
            remove_if_exists(&self.absolute_path(&doc))?;
        }
        self.store.delete(id)
    }

    /// Sync every document matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the batch cannot start. Per-document
    /// failures are recorded in the report.
    pub fn bulk_sync(&self, filter: &DocumentFilter, dry_run: bool) -> Result<BulkSyncReport> {
        self.bulk_sync_cancellable(filter, dry_run, &CancellationToken::new())
    }

    /// Sync every document matching `filter` until `cancel` fires.
    ///
    /// Cancellation stops new documents from starting; documents already
    /// in flight finish. Unstarted documents are reported as skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the batch cannot start.
    pub fn bulk_sync_cancellable(
        &self,
        filter: &DocumentFilter,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<BulkSyncReport> {
        let docs = self.store.list(filter)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("docsync-sync-{i}"))
            .build()
            .map_err(|e| Error::Other(format!("failed to start sync workers: {e}")))?;

        info!(documents = docs.len(), workers = self.workers, dry_run, "Starting bulk sync");

        let items: Vec<BulkItem> = pool.install(|| {
            docs.par_iter()
                .map(|doc| self.bulk_one(doc, dry_run, cancel))
                .collect()
        });

        let report = BulkSyncReport::from_items(items, dry_run, cancel.is_cancelled());
        info!(
            total = report.total,
            updated = report.updated,
            conflicts = report.conflicts_resolved,
            errors = report.errors,
            skipped = report.skipped,
            "Bulk sync finished"
        );
        Ok(report)
    }

    fn bulk_one(
        &self,
        doc: &DocumentReference,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> BulkItem {
        if cancel.is_cancelled() {
            return BulkItem::new(doc, BulkOutcome::Skipped);
        }

        let _lock = self.locks.lock(&doc.id);

        if dry_run {
            let detected = self
                .store
                .read(&doc.id)
                .and_then(|current| Ok((self.detector.detect(&current)?, current)));
            return match detected {
                Ok((detection, current)) => {
                    let action = planned_action(current.storage_mode, detection.status);
                    let outcome = if action == SyncAction::None {
                        BulkOutcome::AlreadySynced
                    } else {
                        BulkOutcome::Planned
                    };
                    BulkItem {
                        status_before: Some(detection.status),
                        action: Some(action),
                        ..BulkItem::new(&current, outcome)
                    }
                }
                Err(e) => BulkItem::failed(doc, &e),
            };
        }

        match self.sync_locked(&doc.id, SyncDirection::Bidirectional, self.strategy) {
            Ok(report) => {
                let outcome = match report.action {
                    SyncAction::None => BulkOutcome::AlreadySynced,
                    SyncAction::ResolvedConflict | SyncAction::RemovedStrayFile => {
                        BulkOutcome::ConflictResolved
                    }
                    SyncAction::WroteFile | SyncAction::WroteDatabase => BulkOutcome::Updated,
                };
                BulkItem {
                    status_before: Some(report.status_before),
                    action: Some(report.action),
                    ..BulkItem::new(doc, outcome)
                }
            }
            Err(e) => {
                warn!(document_id = %doc.id, error = %e, "Document sync failed");
                BulkItem::failed(doc, &e)
            }
        }
    }
}

/// The reconciliation timestamp, on the filesystem's clock when a file remains.
///
/// Later edits are recognized by an mtime past `last_synced_at`, which only
/// works if both come from the same clock. Kept database content must not
/// look newer than the stamp.
fn sync_stamp(doc: &DocumentReference, file_mtime: Option<i64>) -> i64 {
    match file_mtime {
        Some(mtime) => doc.content_updated_at.map_or(mtime, |db| db.max(mtime)),
        None => chrono::Utc::now().timestamp_millis(),
    }
}

fn candidates<'a>(doc: &'a DocumentReference, detection: &'a Detection) -> ConflictCandidates<'a> {
    ConflictCandidates {
        document_id: &doc.id,
        db_content: doc.content.as_deref(),
        db_updated_at: doc.content_updated_at,
        file_content: detection.file.content(),
        file_modified_at: detection.file.modified_at(),
    }
}

fn db_content(doc: &DocumentReference) -> Result<&str> {
    doc.content.as_deref().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "{} has no database content to write to {}",
            doc.id, doc.file_path
        ))
    })
}

fn file_content<'a>(doc: &DocumentReference, detection: &'a Detection) -> Result<&'a str> {
    detection.file.content().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "{} has no file at {} to read from",
            doc.id, doc.file_path
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentType, NewDocument, Owner};
    use crate::sync::hash::content_hash;
    use filetime::FileTime;
    use std::fs;
    use tempfile::TempDir;

    const PATH: &str = "docs/architecture/adr/0001-storage.md";

    fn setup() -> (TempDir, SyncOrchestrator) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DocumentStore::open_memory().unwrap());
        let orchestrator = SyncOrchestrator::new(store, dir.path()).with_workers(2);
        (dir, orchestrator)
    }

    fn create(orch: &SyncOrchestrator, path: &str, content: Option<&str>) -> DocumentReference {
        let mut new = NewDocument::new(Owner::Project(1), path, DocumentType::Adr);
        new.content = content.map(str::to_string);
        orch.store().create(new).unwrap()
    }

    fn write_file(orch: &SyncOrchestrator, path: &str, content: &str, mtime_ms: Option<i64>) {
        let abs = orch.root().join(path);
        fs::create_dir_all(abs.parent().unwrap()).unwrap();
        fs::write(&abs, content).unwrap();
        if let Some(ms) = mtime_ms {
            let t = FileTime::from_unix_time(ms / 1000, u32::try_from((ms % 1000) * 1_000_000).unwrap());
            filetime::set_file_mtime(&abs, t).unwrap();
        }
    }

    fn read_file(orch: &SyncOrchestrator, path: &str) -> Option<String> {
        fs::read_to_string(orch.root().join(path)).ok()
    }

    /// Pin sync timestamps so classification is deterministic.
    fn pin(orch: &SyncOrchestrator, id: &str, last_synced: Option<i64>, updated: i64) {
        orch.store()
            .read_with(|conn| {
                conn.execute(
                    "UPDATE documents SET last_synced_at = ?2, content_updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![id, last_synced, updated],
                )?;
                Ok(())
            })
            .unwrap();
    }

    /// DB "db version" updated at 2s, file "file version" modified at 3s,
    /// both after the last sync at 1s.
    fn conflicted(orch: &SyncOrchestrator) -> DocumentReference {
        let doc = create(orch, PATH, Some("db version"));
        write_file(orch, PATH, "file version", Some(3_000));
        pin(orch, &doc.id, Some(1_000), 2_000);
        orch.store().read(&doc.id).unwrap()
    }

    #[test]
    fn test_missing_file_written_then_idempotent() {
        let (_dir, orch) = setup();
        let doc = create(&orch, PATH, Some("# Storage"));

        let report = orch.sync_document(&doc.id, SyncDirection::Bidirectional).unwrap();
        assert_eq!(report.status_before, SyncStatus::MissingFile);
        assert_eq!(report.action, SyncAction::WroteFile);
        assert_eq!(read_file(&orch, PATH).as_deref(), Some("# Storage"));

        let synced = orch.store().read(&doc.id).unwrap();
        assert_eq!(synced.sync_status, SyncStatus::Synced);
        assert!(synced.last_synced_at.is_some());

        let again = orch.sync_document(&doc.id, SyncDirection::Bidirectional).unwrap();
        assert_eq!(again.action, SyncAction::None);
        assert_eq!(again.status_before, SyncStatus::Synced);
    }

    #[test]
    fn test_missing_db_pulled_from_file() {
        let (_dir, orch) = setup();
        let doc = create(&orch, PATH, None);
        write_file(&orch, PATH, "# From disk", None);

        let report = orch.sync_document(&doc.id, SyncDirection::Bidirectional).unwrap();
        assert_eq!(report.status_before, SyncStatus::MissingDb);
        assert_eq!(report.action, SyncAction::WroteDatabase);

        let synced = orch.store().read(&doc.id).unwrap();
        assert_eq!(synced.content.as_deref(), Some("# From disk"));
        assert_eq!(synced.content_hash, Some(content_hash("# From disk")));
        assert_eq!(synced.content_size_bytes, 11);
        assert_eq!(synced.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn test_round_trip_through_file_preserves_content() {
        let (_dir, orch) = setup();
        let content = "# Storage\n\nUnicode stays put: \u{e9}\u{4e16}\r\ntrailing\n";
        let source = create(&orch, PATH, Some(content));
        orch.sync_document(&source.id, SyncDirection::DbToFile).unwrap();

        let copy_path = "docs/architecture/adr/0002-copy.md";
        let fresh = create(&orch, copy_path, None);
        fs::copy(orch.root().join(PATH), orch.root().join(copy_path)).unwrap();
        orch.sync_document(&fresh.id, SyncDirection::FileToDb).unwrap();

        let pulled = orch.store().read(&fresh.id).unwrap();
        assert_eq!(pulled.content.as_deref(), Some(content));
        assert_eq!(pulled.content_hash, source.content_hash);
    }

    #[test]
    fn test_pull_stamps_sync_with_file_clock() {
        let (_dir, orch) = setup();
        let doc = create(&orch, PATH, None);
        write_file(&orch, PATH, "first", Some(5_000));

        orch.sync_document(&doc.id, SyncDirection::Bidirectional).unwrap();
        let synced = orch.store().read(&doc.id).unwrap();
        assert_eq!(synced.last_synced_at, Some(5_000));
        assert_eq!(synced.content_updated_at, Some(5_000));

        // An edit one millisecond later on the same clock is a file edit
        write_file(&orch, PATH, "second", Some(5_001));
        assert_eq!(orch.status(&doc.id).unwrap().status, SyncStatus::FileNewer);
    }

    #[test]
    fn test_push_stamp_never_predates_database_edit() {
        let (_dir, orch) = setup();
        let doc = create(&orch, PATH, Some("# Storage"));
        orch.sync_document(&doc.id, SyncDirection::DbToFile).unwrap();

        let synced = orch.store().read(&doc.id).unwrap();
        let mtime = modified_millis(&orch.root().join(PATH)).unwrap();
        let stamp = synced.last_synced_at.unwrap();
        assert_eq!(stamp, mtime.max(synced.content_updated_at.unwrap()));
        assert!(stamp >= synced.content_updated_at.unwrap());
        assert_eq!(orch.status(&doc.id).unwrap().status, SyncStatus::Synced);
    }

    #[test]
    fn test_explicit_direction_overrides_detection() {
        let (_dir, orch) = setup();
        let doc = create(&orch, PATH, Some("db"));
        write_file(&orch, PATH, "disk", Some(1_000));
        pin(&orch, &doc.id, None, 5_000); // db is newer

        let report = orch.sync_document(&doc.id, SyncDirection::FileToDb).unwrap();
        assert_eq!(report.status_before, SyncStatus::DbNewer);
        assert_eq!(report.action, SyncAction::WroteDatabase);
        assert_eq!(orch.store().read(&doc.id).unwrap().content.as_deref(), Some("disk"));
    }

    #[test]
    fn test_missing_source_side_is_invalid() {
        let (_dir, orch) = setup();
        let doc = create(&orch, PATH, None);
        write_file(&orch, PATH, "disk", None);

        let err = orch.sync_document(&doc.id, SyncDirection::DbToFile).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(read_file(&orch, PATH).as_deref(), Some("disk"));
    }

    #[test]
    fn test_manual_conflict_changes_nothing() {
        let (_dir, orch) = setup();
        let doc = conflicted(&orch);

        let err = orch.sync_document(&doc.id, SyncDirection::Bidirectional).unwrap_err();
        match err {
            Error::ManualResolutionRequired {
                db_content,
                file_content,
                ..
            } => {
                assert_eq!(db_content, "db version");
                assert_eq!(file_content, "file version");
            }
            other => panic!("expected ManualResolutionRequired, got {other:?}"),
        }

        let after = orch.store().read(&doc.id).unwrap();
        assert_eq!(after.content.as_deref(), Some("db version"));
        assert_eq!(after.last_synced_at, Some(1_000));
        assert_eq!(after.sync_status, SyncStatus::Conflict);
        assert_eq!(orch.store().status_counts().unwrap().count(SyncStatus::Conflict), 1);
        assert_eq!(read_file(&orch, PATH).as_deref(), Some("file version"));
    }

    #[test]
    fn test_refused_stray_file_cached_as_conflict() {
        let (_dir, orch) = setup();
        let mut new = NewDocument::new(Owner::Project(1), PATH, DocumentType::Adr)
            .with_mode(StorageMode::DatabaseOnly);
        new.content = Some("db only".to_string());
        let doc = orch.store().create(new).unwrap();
        write_file(&orch, PATH, "stray", None);

        let err = orch.sync_document(&doc.id, SyncDirection::Bidirectional).unwrap_err();
        assert!(matches!(err, Error::ManualResolutionRequired { .. }));
        assert_eq!(orch.store().read(&doc.id).unwrap().sync_status, SyncStatus::Conflict);
        assert_eq!(read_file(&orch, PATH).as_deref(), Some("stray"));
    }

    #[test]
    fn test_file_wins_applies_to_both_sides() {
        let (_dir, orch) = setup();
        let doc = conflicted(&orch);

        let report = orch
            .sync_document_with(&doc.id, SyncDirection::Bidirectional, ConflictStrategy::FileWins)
            .unwrap();
        assert_eq!(report.action, SyncAction::ResolvedConflict);
        assert_eq!(report.winner, Some(Winner::File));

        let after = orch.store().read(&doc.id).unwrap();
        assert_eq!(after.content.as_deref(), Some("file version"));
        assert_eq!(read_file(&orch, PATH).as_deref(), Some("file version"));
        assert_eq!(orch.status(&doc.id).unwrap().status, SyncStatus::Synced);
    }

    #[test]
    fn test_db_wins_rewrites_file() {
        let (_dir, orch) = setup();
        let doc = conflicted(&orch);

        orch.sync_document_with(&doc.id, SyncDirection::Bidirectional, ConflictStrategy::DbWins)
            .unwrap();
        assert_eq!(read_file(&orch, PATH).as_deref(), Some("db version"));
        assert_eq!(orch.status(&doc.id).unwrap().status, SyncStatus::Synced);
    }

    #[test]
    fn test_latest_wins_uses_timestamps() {
        let (_dir, orch) = setup();
        let doc = conflicted(&orch); // file at 3s beats db at 2s

        let report = orch
            .sync_document_with(&doc.id, SyncDirection::Bidirectional, ConflictStrategy::LatestWins)
            .unwrap();
        assert_eq!(report.winner, Some(Winner::File));

        let other = "docs/architecture/adr/0002-queue.md";
        let doc = create(&orch, other, Some("db version"));
        write_file(&orch, other, "file version", Some(1_500));
        pin(&orch, &doc.id, Some(1_000), 2_000);

        let report = orch
            .sync_document_with(&doc.id, SyncDirection::Bidirectional, ConflictStrategy::LatestWins)
            .unwrap();
        assert_eq!(report.winner, Some(Winner::Database));
        assert_eq!(read_file(&orch, other).as_deref(), Some("db version"));
    }

    #[test]
    fn test_merge_strategy_refused() {
        let (_dir, orch) = setup();
        let doc = conflicted(&orch);
        let err = orch
            .sync_document_with(&doc.id, SyncDirection::Bidirectional, ConflictStrategy::Merge)
            .unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[test]
    fn test_database_only_stray_file_removed() {
        let (_dir, orch) = setup();
        let doc = orch
            .store()
            .create(
                NewDocument::new(Owner::Project(1), PATH, DocumentType::Adr)
                    .with_mode(StorageMode::DatabaseOnly)
                    .with_content("db only"),
            )
            .unwrap();
        write_file(&orch, PATH, "should not exist", None);
        assert_eq!(orch.status(&doc.id).unwrap().status, SyncStatus::Conflict);

        let report = orch.sync_document(&doc.id, SyncDirection::DbToFile).unwrap();
        assert_eq!(report.action, SyncAction::RemovedStrayFile);
        assert!(read_file(&orch, PATH).is_none());
        assert_eq!(orch.store().read(&doc.id).unwrap().content.as_deref(), Some("db only"));
    }

    #[test]
    fn test_database_only_adopts_file_when_file_wins() {
        let (_dir, orch) = setup();
        let doc = orch
            .store()
            .create(
                NewDocument::new(Owner::Project(1), PATH, DocumentType::Adr)
                    .with_mode(StorageMode::DatabaseOnly),
            )
            .unwrap();
        write_file(&orch, PATH, "rescued", None);

        orch.sync_document(&doc.id, SyncDirection::FileToDb).unwrap();
        assert!(read_file(&orch, PATH).is_none());
        assert_eq!(orch.store().read(&doc.id).unwrap().content.as_deref(), Some("rescued"));
    }

    #[test]
    fn test_file_only_is_never_touched() {
        let (_dir, orch) = setup();
        let doc = orch
            .store()
            .create(
                NewDocument::new(Owner::Project(1), PATH, DocumentType::Adr)
                    .with_mode(StorageMode::FileOnly),
            )
            .unwrap();
        write_file(&orch, PATH, "authoritative", None);

        for direction in [
            SyncDirection::DbToFile,
            SyncDirection::FileToDb,
            SyncDirection::Bidirectional,
        ] {
            let report = orch.sync_document(&doc.id, direction).unwrap();
            assert_eq!(report.action, SyncAction::None);
        }
        assert_eq!(orch.store().read(&doc.id).unwrap().content, None);
        assert_eq!(read_file(&orch, PATH).as_deref(), Some("authoritative"));
    }

    #[test]
    fn test_write_content_writes_through() {
        let (_dir, orch) = setup();
        let doc = create(&orch, PATH, Some("v1"));
        orch.sync_document(&doc.id, SyncDirection::Bidirectional).unwrap();

        let updated = orch.write_content(&doc.id, "v2").unwrap();
        assert_eq!(updated.content.as_deref(), Some("v2"));
        assert_eq!(updated.sync_status, SyncStatus::Synced);
        assert_eq!(read_file(&orch, PATH).as_deref(), Some("v2"));
    }

    #[test]
    fn test_delete_document_removes_file_and_record() {
        let (_dir, orch) = setup();
        let doc = create(&orch, PATH, Some("bye"));
        orch.sync_document(&doc.id, SyncDirection::Bidirectional).unwrap();

        orch.delete_document(&doc.id).unwrap();
        assert!(read_file(&orch, PATH).is_none());
        assert!(orch.store().get(&doc.id).unwrap().is_none());
        assert!(orch.store().search("bye", 5).unwrap().is_empty());
        assert!(matches!(
            orch.delete_document(&doc.id),
            Err(Error::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn test_not_found_propagates() {
        let (_dir, orch) = setup();
        let err = orch
            .sync_document("doc_missing", SyncDirection::Bidirectional)
            .unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound { .. }));
    }

    #[test]
    fn test_bulk_sync_partial_failure() {
        let (_dir, orch) = setup();
        create(&orch, "docs/architecture/adr/a.md", Some("a"));
        create(&orch, "docs/architecture/adr/b.md", Some("b"));
        let already = create(&orch, "docs/architecture/adr/c.md", Some("c"));
        orch.sync_document(&already.id, SyncDirection::Bidirectional).unwrap();
        let broken = create(&orch, "docs/architecture/adr/d.md", None);
        let abs = orch.root().join(&broken.file_path);
        fs::write(&abs, [0xff, 0xfe, 0xfd]).unwrap(); // not UTF-8

        let report = orch.bulk_sync(&DocumentFilter::default(), false).unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.updated, 2);
        assert_eq!(report.already_synced, 1);
        assert_eq!(report.errors, 1);
        assert!(report.has_failures());

        let failure = report.failures().next().unwrap();
        assert_eq!(failure.document_id, broken.id);
        assert_eq!(failure.error_code.as_deref(), Some("IO_ERROR"));

        assert_eq!(read_file(&orch, "docs/architecture/adr/a.md").as_deref(), Some("a"));
    }

    #[test]
    fn test_bulk_dry_run_mutates_nothing() {
        let (_dir, orch) = setup();
        let doc = create(&orch, PATH, Some("pending"));

        let report = orch.bulk_sync(&DocumentFilter::default(), true).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.planned, 1);
        assert_eq!(report.items[0].action, Some(SyncAction::WroteFile));
        assert_eq!(report.items[0].status_before, Some(SyncStatus::MissingFile));

        assert!(read_file(&orch, PATH).is_none());
        let after = orch.store().read(&doc.id).unwrap();
        assert_eq!(after.last_synced_at, None);
    }

    #[test]
    fn test_bulk_conflicts_counted_and_manual_fails_per_item() {
        let (_dir, orch) = setup();
        conflicted(&orch);

        let report = orch.bulk_sync(&DocumentFilter::default(), false).unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(
            report.items[0].error_code.as_deref(),
            Some("MANUAL_RESOLUTION_REQUIRED")
        );

        let orch = SyncOrchestrator::new(Arc::clone(orch.store()), orch.root().to_path_buf())
            .with_strategy(ConflictStrategy::FileWins);
        let report = orch.bulk_sync(&DocumentFilter::default(), false).unwrap();
        assert_eq!(report.conflicts_resolved, 1);
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn test_cancelled_bulk_sync_starts_nothing() {
        let (_dir, orch) = setup();
        create(&orch, "docs/architecture/adr/a.md", Some("a"));
        create(&orch, "docs/architecture/adr/b.md", Some("b"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = orch
            .bulk_sync_cancellable(&DocumentFilter::default(), false, &cancel)
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.skipped, 2);
        assert!(read_file(&orch, "docs/architecture/adr/a.md").is_none());
    }

    #[test]
    fn test_concurrent_syncs_of_one_document_write_once() {
        let (_dir, orch) = setup();
        let doc = create(&orch, PATH, Some("contended"));
        let orch = Arc::new(orch);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let orch = Arc::clone(&orch);
                let id = doc.id.clone();
                std::thread::spawn(move || {
                    orch.sync_document(&id, SyncDirection::Bidirectional)
                        .unwrap()
                        .action
                })
            })
            .collect();
        let actions: Vec<SyncAction> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(actions.iter().filter(|a| **a == SyncAction::WroteFile).count(), 1);
        assert_eq!(actions.iter().filter(|a| **a == SyncAction::None).count(), 7);
        assert_eq!(orch.locks().tracked(), 0);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(SyncDirection::parse("db-to-file").unwrap(), SyncDirection::DbToFile);
        assert_eq!(SyncDirection::parse("file_to_db").unwrap(), SyncDirection::FileToDb);
        assert!(SyncDirection::parse("sideways").is_err());
    }
}
