//! SQLite storage implementation.
//!
//! `DocumentStore` is the authoritative home of document content and
//! metadata. It follows the MutationContext pattern for transaction
//! discipline, audit logging, and search index maintenance.

use crate::error::{Error, Result};
use crate::model::{
    derive_title, Category, DocumentFilter, DocumentFormat, DocumentReference, DocumentType,
    DocumentUpdate, NewDocument, Owner, StorageMode, SyncStatus,
};
use crate::storage::events::{get_events, insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use crate::storage::search;
use crate::sync::hash::{content_hash, has_changed};
use crate::validate::{filename_of, normalize_path, PathContract};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

/// SQLite-backed content store.
///
/// The connection sits behind a mutex that is held only for the duration of
/// one statement batch or transaction, never across file I/O.
#[derive(Debug)]
pub struct DocumentStore {
    conn: Mutex<Connection>,
    contract: PathContract,
    actor: String,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures to record audit events and to mark which
/// documents need their search entry rewritten or removed before commit.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation.
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
    /// Documents whose search entry must be rewritten.
    pub reindex: BTreeSet<String>,
    /// Documents whose search entry must be dropped.
    pub unindex: BTreeSet<String>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
            reindex: BTreeSet::new(),
            unindex: BTreeSet::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }

    /// Record a commented event.
    pub fn record_note(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        comment: &str,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor).with_comment(comment),
        );
    }

    /// Mark a document's search entry as stale.
    pub fn mark_reindex(&mut self, document_id: &str) {
        self.unindex.remove(document_id);
        self.reindex.insert(document_id.to_string());
    }

    /// Mark a document's search entry for removal.
    pub fn mark_unindex(&mut self, document_id: &str) {
        self.reindex.remove(document_id);
        self.unindex.insert(document_id.to_string());
    }
}

/// Summary of cached sync status across tracked documents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_mode: BTreeMap<String, usize>,
    /// Search index writes waiting for retry.
    pub pending_index: usize,
}

impl StatusCounts {
    /// Number of documents with the given cached status.
    #[must_use]
    pub fn count(&self, status: SyncStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }

    /// Documents whose cached status is anything other than synced.
    #[must_use]
    pub fn out_of_sync(&self) -> usize {
        self.total - self.count(SyncStatus::Synced)
    }
}

/// A compare-and-set reconciliation of one document.
///
/// Applied only if the stored hash still equals `expected_hash`, which is the
/// hash observed when the document was classified.
#[derive(Debug, Clone)]
pub struct SyncCommit<'a> {
    pub expected_hash: Option<&'a str>,
    /// New database content, when the file side won.
    pub content: Option<&'a str>,
    pub synced_at: i64,
    pub event: EventType,
    pub comment: Option<String>,
}

const DOCUMENT_COLUMNS: &str = "id, entity_type, entity_id, file_path, filename, document_type, \
     category, content, content_hash, storage_mode, sync_status, content_updated_at, \
     last_synced_at, content_size_bytes, format, title, description, created_at, updated_at";

impl DocumentStore {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            contract: PathContract::default(),
            actor: "unknown".to_string(),
        }
    }

    /// Use a project-specific path contract.
    #[must_use]
    pub fn with_contract(mut self, contract: PathContract) -> Self {
        self.contract = contract;
        self
    }

    /// Attribute audit events to `actor`.
    #[must_use]
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    #[must_use]
    pub fn contract(&self) -> &PathContract {
        &self.contract
    }

    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Run read-only queries against the connection.
    ///
    /// # Errors
    ///
    /// Propagates whatever the closure returns.
    pub fn read_with<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Applies search index changes, queueing any that fail
    /// 5. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, &self.actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        search::apply_index_changes(&tx, &ctx)?;

        tx.commit()?;

        Ok(result)
    }

    // ==================
    // Document Operations
    // ==================

    /// Register a document whose path satisfies the path contract.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` or `CategoryMismatch` when the path violates the
    /// contract, `InvalidArgument` when a `file_only` document carries content
    /// or the path is already registered.
    pub fn create(&self, new: NewDocument) -> Result<DocumentReference> {
        let path = normalize_path(&new.file_path)?;
        self.contract.check(&path, new.document_type)?;
        self.insert_document(new, path, EventType::DocumentCreated)
    }

    /// Register a document that predates the path contract.
    ///
    /// The path is normalized but not validated. Structure migration moves
    /// such documents into place later.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create`], minus the contract check.
    pub fn import_legacy(&self, new: NewDocument) -> Result<DocumentReference> {
        let path = normalize_path(&new.file_path)?;
        self.insert_document(new, path, EventType::LegacyImported)
    }

    fn insert_document(
        &self,
        new: NewDocument,
        path: String,
        event: EventType,
    ) -> Result<DocumentReference> {
        if new.storage_mode == StorageMode::FileOnly && new.content.is_some() {
            return Err(Error::InvalidArgument(
                "file_only documents keep their content on disk; omit content".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp_millis();
        let has_content = new.content.is_some();
        let doc = DocumentReference {
            id: format!("doc_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            owner: new.owner,
            filename: filename_of(&path).to_string(),
            document_type: new.document_type,
            category: new.document_type.category(),
            content_hash: new.content.as_deref().map(content_hash),
            content_size_bytes: new.content.as_deref().map_or(0, byte_len),
            storage_mode: new.storage_mode,
            sync_status: initial_status(new.storage_mode, has_content),
            content_updated_at: has_content.then_some(now),
            last_synced_at: None,
            format: new.format.unwrap_or_else(|| DocumentFormat::from_path(&path)),
            title: new
                .title
                .unwrap_or_else(|| derive_title(&path, new.content.as_deref())),
            description: new.description,
            content: new.content,
            file_path: path,
            created_at: now,
            updated_at: now,
        };

        self.mutate("create_document", |tx, ctx| {
            ensure_path_free(tx, &doc.file_path, None)?;
            tx.execute(
                &format!(
                    "INSERT INTO documents ({DOCUMENT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
                ),
                rusqlite::params![
                    doc.id,
                    doc.owner.entity_type(),
                    doc.owner.entity_id(),
                    doc.file_path,
                    doc.filename,
                    doc.document_type.as_str(),
                    doc.category.as_str(),
                    doc.content,
                    doc.content_hash,
                    doc.storage_mode.as_str(),
                    doc.sync_status.as_str(),
                    doc.content_updated_at,
                    doc.last_synced_at,
                    doc.content_size_bytes,
                    doc.format.as_str(),
                    doc.title,
                    doc.description,
                    doc.created_at,
                    doc.updated_at,
                ],
            )?;
            ctx.record_change("document", &doc.id, event, None, Some(doc.file_path.clone()));
            ctx.mark_reindex(&doc.id);
            Ok(())
        })?;

        Ok(doc)
    }

    /// Get a document by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<DocumentReference>> {
        let conn = self.conn.lock();
        get_document(&conn, id)
    }

    /// Get a document by ID, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `DocumentNotFound` if no such document exists.
    pub fn read(&self, id: &str) -> Result<DocumentReference> {
        self.get(id)?
            .ok_or_else(|| Error::DocumentNotFound { id: id.to_string() })
    }

    /// Look up a document by its project-relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is malformed or the query fails.
    pub fn find_by_path(&self, path: &str) -> Result<Option<DocumentReference>> {
        let path = normalize_path(path)?;
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE file_path = ?1"),
            [&path],
            map_document_row,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List documents matching a filter, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, filter: &DocumentFilter) -> Result<Vec<DocumentReference>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(owner) = filter.owner {
            conditions.push(format!(
                "entity_type = ?{} AND entity_id = ?{}",
                params.len() + 1,
                params.len() + 2
            ));
            params.push(Box::new(owner.entity_type()));
            params.push(Box::new(owner.entity_id()));
        }

        if let Some(mode) = filter.storage_mode {
            conditions.push(format!("storage_mode = ?{}", params.len() + 1));
            params.push(Box::new(mode.as_str()));
        }

        if let Some(category) = filter.category {
            conditions.push(format!("category = ?{}", params.len() + 1));
            params.push(Box::new(category.as_str()));
        }

        if let Some(prefix) = &filter.path_prefix {
            conditions.push(format!("file_path LIKE ?{} ESCAPE '\\'", params.len() + 1));
            params.push(Box::new(format!("{}%", escape_like(prefix))));
        }

        if let Some(ids) = &filter.ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = (0..ids.len())
                .map(|i| format!("?{}", params.len() + i + 1))
                .collect();
            conditions.push(format!("id IN ({})", placeholders.join(", ")));
            for id in ids {
                params.push(Box::new(id.clone()));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents{where_clause} ORDER BY file_path"
        ))?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let rows = stmt.query_map(params_refs.as_slice(), map_document_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    /// Apply field changes to a document.
    ///
    /// Content changes recompute hash and size together. A content change on
    /// a hybrid document that was cached as synced flips it to `db_newer`.
    ///
    /// # Errors
    ///
    /// Returns `DocumentNotFound`, a path contract error for a new path, or
    /// `InvalidArgument` when the result would give a `file_only` document
    /// content.
    pub fn update(&self, id: &str, update: DocumentUpdate) -> Result<DocumentReference> {
        let new_path = update.file_path.as_deref().map(normalize_path).transpose()?;

        self.mutate("update_document", |tx, ctx| {
            let current = get_document(tx, id)?
                .ok_or_else(|| Error::DocumentNotFound { id: id.to_string() })?;
            let mut doc = current.clone();
            let now = chrono::Utc::now().timestamp_millis();

            if let Some(path) = new_path {
                if path != doc.file_path {
                    self.contract.check(&path, doc.document_type)?;
                    ensure_path_free(tx, &path, Some(id))?;
                    doc.filename = filename_of(&path).to_string();
                    doc.category = doc.document_type.category();
                    doc.file_path = path;
                }
            }

            if let Some(mode) = update.storage_mode {
                doc.storage_mode = mode;
            }

            let mut content_changed = false;
            if let Some(content) = update.content {
                let hash = content.as_deref().map(content_hash);
                let changed = match (&hash, &doc.content_hash) {
                    (Some(new), old) => has_changed(new, old.as_deref()),
                    (None, old) => old.is_some(),
                };
                if changed {
                    doc.content_size_bytes = content.as_deref().map_or(0, byte_len);
                    doc.content = content;
                    doc.content_hash = hash;
                    doc.content_updated_at = Some(now);
                    content_changed = true;
                }
            }

            if doc.storage_mode == StorageMode::FileOnly && doc.content.is_some() {
                return Err(Error::InvalidArgument(
                    "file_only documents cannot carry content; clear it in the same update"
                        .to_string(),
                ));
            }

            if let Some(title) = update.title {
                doc.title = title;
            }
            if let Some(description) = update.description {
                doc.description = description;
            }

            if doc.storage_mode == StorageMode::FileOnly {
                doc.sync_status = SyncStatus::Synced;
            } else if content_changed
                && doc.storage_mode == StorageMode::Hybrid
                && doc.sync_status == SyncStatus::Synced
            {
                doc.sync_status = SyncStatus::DbNewer;
            }

            if doc == current {
                return Ok(doc);
            }
            doc.updated_at = now;
            write_row(tx, &doc)?;

            if content_changed {
                ctx.record_change(
                    "document",
                    id,
                    EventType::ContentUpdated,
                    current.content_hash.clone(),
                    doc.content_hash.clone(),
                );
            }
            if current.file_path != doc.file_path
                || current.title != doc.title
                || current.description != doc.description
                || current.storage_mode != doc.storage_mode
            {
                ctx.record_change(
                    "document",
                    id,
                    EventType::MetadataUpdated,
                    Some(current.file_path.clone()),
                    Some(doc.file_path.clone()),
                );
            }
            ctx.mark_reindex(id);

            Ok(doc)
        })
    }

    /// Remove a document record and its search entry.
    ///
    /// Files are not touched here; see `SyncOrchestrator::delete_document`.
    ///
    /// # Errors
    ///
    /// Returns `DocumentNotFound` if no such document exists.
    pub fn delete(&self, id: &str) -> Result<DocumentReference> {
        self.mutate("delete_document", |tx, ctx| {
            let doc = get_document(tx, id)?
                .ok_or_else(|| Error::DocumentNotFound { id: id.to_string() })?;
            tx.execute("DELETE FROM documents WHERE id = ?1", [id])?;
            ctx.record_change(
                "document",
                id,
                EventType::DocumentDeleted,
                Some(doc.file_path.clone()),
                None,
            );
            ctx.mark_unindex(id);
            Ok(doc)
        })
    }

    /// Count documents by cached sync status and storage mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn status_counts(&self) -> Result<StatusCounts> {
        let conn = self.conn.lock();
        let mut counts = StatusCounts::default();

        let mut stmt = conn.prepare(
            "SELECT sync_status, storage_mode, COUNT(*) FROM documents GROUP BY sync_status, storage_mode",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (status, mode, n) = row?;
            let n = usize::try_from(n).unwrap_or(0);
            counts.total += n;
            *counts.by_status.entry(status).or_default() += n;
            *counts.by_mode.entry(mode).or_default() += n;
        }
        for status in SyncStatus::ALL {
            counts.by_status.entry(status.as_str().to_string()).or_default();
        }

        counts.pending_index = conn.query_row(
            "SELECT COUNT(*) FROM search_index_pending",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| usize::try_from(n).unwrap_or(0))?;

        Ok(counts)
    }

    /// Audit history for a document, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn history(&self, id: &str, limit: Option<u32>) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        get_events(&conn, "document", id, limit).map_err(Error::from)
    }

    // ==================
    // Sync bookkeeping
    // ==================

    /// Overwrite the cached sync status without touching content.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub(crate) fn record_status(&self, id: &str, status: SyncStatus) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET sync_status = ?2 WHERE id = ?1 AND sync_status != ?2",
            rusqlite::params![id, status.as_str()],
        )?;
        Ok(())
    }

    /// Apply a reconciliation if the document is unchanged since it was
    /// classified.
    ///
    /// Returns `None` when the stored hash no longer matches
    /// `commit.expected_hash`; nothing is written in that case.
    ///
    /// # Errors
    ///
    /// Returns `DocumentNotFound` if the document vanished, or a database error.
    pub(crate) fn commit_sync(
        &self,
        id: &str,
        commit: &SyncCommit<'_>,
    ) -> Result<Option<DocumentReference>> {
        self.mutate("commit_sync", |tx, ctx| {
            let current = get_document(tx, id)?
                .ok_or_else(|| Error::DocumentNotFound { id: id.to_string() })?;
            if current.content_hash.as_deref() != commit.expected_hash {
                return Ok(None);
            }

            let mut doc = current;
            if let Some(content) = commit.content {
                let hash = content_hash(content);
                if has_changed(&hash, doc.content_hash.as_deref()) {
                    ctx.record_change(
                        "document",
                        id,
                        EventType::ContentUpdated,
                        doc.content_hash.clone(),
                        Some(hash.clone()),
                    );
                    doc.content = Some(content.to_string());
                    doc.content_hash = Some(hash);
                    doc.content_size_bytes = byte_len(content);
                    doc.content_updated_at = Some(commit.synced_at);
                    ctx.mark_reindex(id);
                }
            }

            doc.last_synced_at = Some(commit.synced_at);
            doc.sync_status = SyncStatus::Synced;
            doc.updated_at = commit.synced_at;
            write_row(tx, &doc)?;

            match &commit.comment {
                Some(comment) => ctx.record_note("document", id, commit.event, comment),
                None => ctx.record_event("document", id, commit.event),
            }

            Ok(Some(doc))
        })
    }
}

// ==================
// Transaction helpers
// ==================

/// Move a document record from `from` to `to` inside an open transaction.
///
/// Returns `false` without writing when the document is no longer at `from`.
///
/// # Errors
///
/// Returns an error if the update fails (including a path collision).
pub(crate) fn relocate_in(
    tx: &Transaction,
    ctx: &mut MutationContext,
    id: &str,
    from: &str,
    to: &str,
    category: Category,
    event: EventType,
) -> Result<bool> {
    let changed = tx.execute(
        "UPDATE documents SET file_path = ?3, filename = ?4, category = ?5, updated_at = ?6
         WHERE id = ?1 AND file_path = ?2",
        rusqlite::params![
            id,
            from,
            to,
            filename_of(to),
            category.as_str(),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    if changed == 1 {
        ctx.record_change("document", id, event, Some(from.to_string()), Some(to.to_string()));
        ctx.mark_reindex(id);
    }
    Ok(changed == 1)
}

pub(crate) fn get_document(conn: &Connection, id: &str) -> Result<Option<DocumentReference>> {
    conn.query_row(
        &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
        [id],
        map_document_row,
    )
    .optional()
    .map_err(Error::from)
}

fn ensure_path_free(conn: &Connection, path: &str, except: Option<&str>) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM documents WHERE file_path = ?1",
            [path],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(other) if except != Some(other.as_str()) => Err(Error::InvalidArgument(format!(
            "'{path}' is already registered as {other}"
        ))),
        _ => Ok(()),
    }
}

fn write_row(conn: &Connection, doc: &DocumentReference) -> Result<()> {
    conn.execute(
        "UPDATE documents SET
            file_path = ?2, filename = ?3, category = ?4, content = ?5, content_hash = ?6,
            storage_mode = ?7, sync_status = ?8, content_updated_at = ?9, last_synced_at = ?10,
            content_size_bytes = ?11, title = ?12, description = ?13, updated_at = ?14
         WHERE id = ?1",
        rusqlite::params![
            doc.id,
            doc.file_path,
            doc.filename,
            doc.category.as_str(),
            doc.content,
            doc.content_hash,
            doc.storage_mode.as_str(),
            doc.sync_status.as_str(),
            doc.content_updated_at,
            doc.last_synced_at,
            doc.content_size_bytes,
            doc.title,
            doc.description,
            doc.updated_at,
        ],
    )?;
    Ok(())
}

/// Cached status for a freshly registered document.
fn initial_status(mode: StorageMode, has_content: bool) -> SyncStatus {
    if mode == StorageMode::Hybrid && has_content {
        SyncStatus::MissingFile
    } else {
        SyncStatus::Synced
    }
}

fn byte_len(content: &str) -> i64 {
    i64::try_from(content.len()).unwrap_or(i64::MAX)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn unrecognized(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unrecognized value '{value}'").into(),
    )
}

// Helper to map document rows
fn map_document_row(row: &rusqlite::Row) -> rusqlite::Result<DocumentReference> {
    let entity_type: String = row.get(1)?;
    let entity_id: i64 = row.get(2)?;
    let document_type: String = row.get(5)?;
    let category: String = row.get(6)?;
    let storage_mode: String = row.get(9)?;
    let sync_status: String = row.get(10)?;
    let format: String = row.get(14)?;

    Ok(DocumentReference {
        id: row.get(0)?,
        owner: Owner::from_parts(&entity_type, entity_id)
            .ok_or_else(|| unrecognized(1, &entity_type))?,
        file_path: row.get(3)?,
        filename: row.get(4)?,
        document_type: DocumentType::parse(&document_type)
            .ok_or_else(|| unrecognized(5, &document_type))?,
        category: Category::parse(&category).ok_or_else(|| unrecognized(6, &category))?,
        content: row.get(7)?,
        content_hash: row.get(8)?,
        storage_mode: StorageMode::parse(&storage_mode)
            .ok_or_else(|| unrecognized(9, &storage_mode))?,
        sync_status: SyncStatus::parse(&sync_status)
            .ok_or_else(|| unrecognized(10, &sync_status))?,
        content_updated_at: row.get(11)?,
        last_synced_at: row.get(12)?,
        content_size_bytes: row.get(13)?,
        format: DocumentFormat::parse(&format),
        title: row.get(15)?,
        description: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const ADR_PATH: &str = "docs/architecture/adr/0001-storage.md";

    fn adr(path: &str) -> NewDocument {
        NewDocument::new(Owner::Project(1), path, DocumentType::Adr)
    }

    #[test]
    fn test_open_memory() {
        let store = DocumentStore::open_memory();
        assert!(store.is_ok());
    }

    #[test]
    fn test_document_crud() {
        let store = DocumentStore::open_memory().unwrap().with_actor("tester");

        // Create
        let doc = store
            .create(adr(ADR_PATH).with_content("# Use SQLite\n\nBecause."))
            .unwrap();
        assert!(doc.id.starts_with("doc_"));
        assert_eq!(doc.category, Category::Architecture);
        assert_eq!(doc.filename, "0001-storage.md");
        assert_eq!(doc.title, "Use SQLite");
        assert_eq!(doc.content_hash.as_deref(), Some(content_hash("# Use SQLite\n\nBecause.").as_str()));
        assert_eq!(doc.content_size_bytes, 22);

        // Read
        let read = store.read(&doc.id).unwrap();
        assert_eq!(read, doc);
        let by_path = store.find_by_path(&format!("./{ADR_PATH}")).unwrap();
        assert_eq!(by_path.map(|d| d.id), Some(doc.id.clone()));

        // Update
        let updated = store
            .update(&doc.id, DocumentUpdate::content("# Use SQLite\n\nRevised."))
            .unwrap();
        assert_ne!(updated.content_hash, doc.content_hash);
        assert_eq!(
            updated.content_hash.as_deref(),
            Some(content_hash("# Use SQLite\n\nRevised.").as_str())
        );

        // Delete
        store.delete(&doc.id).unwrap();
        assert!(store.get(&doc.id).unwrap().is_none());
        assert!(matches!(
            store.read(&doc.id),
            Err(Error::DocumentNotFound { .. })
        ));

        let history = store.history(&doc.id, None).unwrap();
        assert_eq!(history[0].event_type, EventType::DocumentDeleted);
        assert!(history.iter().all(|e| e.actor == "tester"));
    }

    #[test]
    fn test_create_rejects_contract_violations() {
        let store = DocumentStore::open_memory().unwrap();

        let err = store.create(adr("docs/adr.md")).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));

        let err = store
            .create(adr("docs/guides/adr/0001-storage.md"))
            .unwrap_err();
        assert!(matches!(err, Error::CategoryMismatch { .. }));

        // Nothing was written
        assert!(store.list(&DocumentFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_file_only_rejects_content() {
        let store = DocumentStore::open_memory().unwrap();
        let err = store
            .create(
                adr(ADR_PATH)
                    .with_mode(StorageMode::FileOnly)
                    .with_content("nope"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let doc = store
            .create(adr(ADR_PATH).with_mode(StorageMode::FileOnly))
            .unwrap();
        assert_eq!(doc.content, None);
        assert_eq!(doc.sync_status, SyncStatus::Synced);

        let err = store
            .update(&doc.id, DocumentUpdate::content("still no"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let store = DocumentStore::open_memory().unwrap();
        store.create(adr(ADR_PATH)).unwrap();
        let err = store.create(adr(ADR_PATH)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_import_legacy_skips_validation() {
        let store = DocumentStore::open_memory().unwrap();
        let doc = store
            .import_legacy(adr("notes/storage-decision.md").with_content("# Storage"))
            .unwrap();
        assert_eq!(doc.file_path, "notes/storage-decision.md");
        assert!(!store.contract().conforms(&doc.file_path, doc.document_type));

        // Still normalized
        assert!(store.import_legacy(adr("../outside.md")).is_err());
    }

    #[test]
    fn test_content_update_invalidates_synced_status() {
        let store = DocumentStore::open_memory().unwrap();
        let doc = store.create(adr(ADR_PATH).with_content("v1")).unwrap();
        store
            .commit_sync(
                &doc.id,
                &SyncCommit {
                    expected_hash: doc.content_hash.as_deref(),
                    content: None,
                    synced_at: 1_000,
                    event: EventType::DocumentSynced,
                    comment: None,
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(store.read(&doc.id).unwrap().sync_status, SyncStatus::Synced);

        let updated = store.update(&doc.id, DocumentUpdate::content("v2")).unwrap();
        assert_eq!(updated.sync_status, SyncStatus::DbNewer);

        // Unchanged content is a no-op
        let again = store.update(&doc.id, DocumentUpdate::content("v2")).unwrap();
        assert_eq!(again.updated_at, updated.updated_at);
    }

    #[test]
    fn test_update_path_validates() {
        let store = DocumentStore::open_memory().unwrap();
        let doc = store.create(adr(ADR_PATH)).unwrap();

        let err = store
            .update(
                &doc.id,
                DocumentUpdate {
                    file_path: Some("docs/guides/adr/x.md".to_string()),
                    ..DocumentUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::CategoryMismatch { .. }));

        let moved = store
            .update(
                &doc.id,
                DocumentUpdate {
                    file_path: Some("docs/architecture/adr/0002-renamed.md".to_string()),
                    ..DocumentUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(moved.filename, "0002-renamed.md");
    }

    #[test]
    fn test_commit_sync_is_compare_and_set() {
        let store = DocumentStore::open_memory().unwrap();
        let doc = store.create(adr(ADR_PATH).with_content("v1")).unwrap();
        let stale = doc.content_hash.clone();

        store.update(&doc.id, DocumentUpdate::content("v2")).unwrap();

        let result = store
            .commit_sync(
                &doc.id,
                &SyncCommit {
                    expected_hash: stale.as_deref(),
                    content: Some("from file"),
                    synced_at: 2_000,
                    event: EventType::DocumentSynced,
                    comment: None,
                },
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(store.read(&doc.id).unwrap().content.as_deref(), Some("v2"));
    }

    #[test]
    fn test_commit_sync_adopts_file_content() {
        let store = DocumentStore::open_memory().unwrap();
        let doc = store.create(adr(ADR_PATH).with_content("v1")).unwrap();

        let synced = store
            .commit_sync(
                &doc.id,
                &SyncCommit {
                    expected_hash: doc.content_hash.as_deref(),
                    content: Some("edited on disk"),
                    synced_at: 5_000,
                    event: EventType::DocumentSynced,
                    comment: Some("file_to_db".to_string()),
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(synced.content.as_deref(), Some("edited on disk"));
        assert_eq!(synced.content_hash, Some(content_hash("edited on disk")));
        assert_eq!(synced.content_updated_at, Some(5_000));
        assert_eq!(synced.last_synced_at, Some(5_000));
        assert_eq!(synced.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn test_list_filters() {
        let store = DocumentStore::open_memory().unwrap();
        store.create(adr(ADR_PATH)).unwrap();
        store
            .create(NewDocument::new(
                Owner::WorkItem(7),
                "docs/operations/runbook/failover.md",
                DocumentType::Runbook,
            ))
            .unwrap();
        store
            .create(
                NewDocument::new(Owner::WorkItem(7), "README.md", DocumentType::ReferenceDoc)
                    .with_mode(StorageMode::DatabaseOnly),
            )
            .unwrap();

        let all = store.list(&DocumentFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].file_path, "README.md");

        let owned = store
            .list(&DocumentFilter {
                owner: Some(Owner::WorkItem(7)),
                ..DocumentFilter::default()
            })
            .unwrap();
        assert_eq!(owned.len(), 2);

        let ops = store
            .list(&DocumentFilter {
                category: Some(Category::Operations),
                ..DocumentFilter::default()
            })
            .unwrap();
        assert_eq!(ops.len(), 1);

        let under_docs = store
            .list(&DocumentFilter {
                path_prefix: Some("docs/".to_string()),
                storage_mode: Some(StorageMode::Hybrid),
                ..DocumentFilter::default()
            })
            .unwrap();
        assert_eq!(under_docs.len(), 2);

        let none = store
            .list(&DocumentFilter {
                ids: Some(Vec::new()),
                ..DocumentFilter::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_status_counts() {
        let store = DocumentStore::open_memory().unwrap();
        store.create(adr(ADR_PATH).with_content("x")).unwrap();
        store
            .create(adr("docs/architecture/adr/0002.md").with_mode(StorageMode::DatabaseOnly))
            .unwrap();

        let counts = store.status_counts().unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.count(SyncStatus::MissingFile), 1);
        assert_eq!(counts.count(SyncStatus::Synced), 1);
        assert_eq!(counts.count(SyncStatus::Conflict), 0);
        assert_eq!(counts.out_of_sync(), 1);
        assert_eq!(counts.by_mode.get("database_only"), Some(&1));
    }

    #[test]
    fn test_concurrent_writers_share_store() {
        let store = Arc::new(DocumentStore::open_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .create(adr(&format!("docs/architecture/adr/{i:04}.md")).with_content("c"))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.list(&DocumentFilter::default()).unwrap().len(), 8);
    }
}
