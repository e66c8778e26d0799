//! Document model.
//!
//! A `DocumentReference` is the authoritative record for one tracked
//! document: its content, where its file lives, and the cached result of the
//! last change detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::taxonomy::{Category, DocumentType};

/// The entity a document documents.
///
/// Owners are managed elsewhere; the store only keeps the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Owner {
    Project(i64),
    WorkItem(i64),
    Task(i64),
    Idea(i64),
}

impl Owner {
    /// Entity type column value.
    #[must_use]
    pub const fn entity_type(&self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::WorkItem(_) => "work_item",
            Self::Task(_) => "task",
            Self::Idea(_) => "idea",
        }
    }

    /// Entity id column value.
    #[must_use]
    pub const fn entity_id(&self) -> i64 {
        match self {
            Self::Project(id) | Self::WorkItem(id) | Self::Task(id) | Self::Idea(id) => *id,
        }
    }

    /// Rebuild an owner from its stored columns.
    #[must_use]
    pub fn from_parts(entity_type: &str, entity_id: i64) -> Option<Self> {
        match entity_type {
            "project" => Some(Self::Project(entity_id)),
            "work_item" => Some(Self::WorkItem(entity_id)),
            "task" => Some(Self::Task(entity_id)),
            "idea" => Some(Self::Idea(entity_id)),
            _ => None,
        }
    }

    /// Parse the `kind:id` form used on the command line (`work-item:12`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, id) = s.split_once(':')?;
        let id = id.trim().parse().ok()?;
        let kind = kind.trim().to_lowercase().replace('-', "_");
        Self::from_parts(&kind, id)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type(), self.entity_id())
    }
}

/// Where a document's content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Database is authoritative; the file is a synchronized cache.
    Hybrid,
    /// Content lives only in the database; no file may exist.
    DatabaseOnly,
    /// The file is authoritative; the database holds metadata only.
    FileOnly,
}

impl StorageMode {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::DatabaseOnly => "database_only",
            Self::FileOnly => "file_only",
        }
    }

    /// Parse from string (accepts `-` or `_` separators).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "hybrid" => Some(Self::Hybrid),
            "database_only" | "db_only" => Some(Self::DatabaseOnly),
            "file_only" => Some(Self::FileOnly),
            _ => None,
        }
    }
}

impl Default for StorageMode {
    fn default() -> Self {
        Self::Hybrid
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of how the database and file copies relate.
///
/// Only the change detector produces these; the stored column is a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    DbNewer,
    FileNewer,
    Conflict,
    MissingFile,
    MissingDb,
}

impl SyncStatus {
    pub const ALL: [Self; 6] = [
        Self::Synced,
        Self::DbNewer,
        Self::FileNewer,
        Self::Conflict,
        Self::MissingFile,
        Self::MissingDb,
    ];

    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::DbNewer => "db_newer",
            Self::FileNewer => "file_newer",
            Self::Conflict => "conflict",
            Self::MissingFile => "missing_file",
            Self::MissingDb => "missing_db",
        }
    }

    /// Parse from the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File format, derived from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Markdown,
    Text,
    Yaml,
    Json,
    Other,
}

impl DocumentFormat {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "markdown" => Self::Markdown,
            "text" => Self::Text,
            "yaml" => Self::Yaml,
            "json" => Self::Json,
            _ => Self::Other,
        }
    }

    /// Infer the format from a file path's extension.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match ext.as_deref() {
            Some("md" | "markdown" | "mdc") => Self::Markdown,
            Some("txt" | "rst") => Self::Text,
            Some("yml" | "yaml") => Self::Yaml,
            Some("json") => Self::Json,
            _ => Self::Other,
        }
    }
}

/// The authoritative record for one tracked document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReference {
    /// Unique identifier (`doc_` prefix)
    pub id: String,

    /// Entity this document documents
    pub owner: Owner,

    /// Path relative to the project root, `/`-separated
    pub file_path: String,

    /// Last path segment of `file_path`
    pub filename: String,

    pub document_type: DocumentType,

    pub category: Category,

    /// Full text; always `None` for `file_only` documents
    pub content: Option<String>,

    /// SHA-256 hex digest of `content`
    pub content_hash: Option<String>,

    pub storage_mode: StorageMode,

    /// Cached classification from the last change detection
    pub sync_status: SyncStatus,

    /// When `content` last changed (Unix milliseconds)
    pub content_updated_at: Option<i64>,

    /// When the two copies were last reconciled (Unix milliseconds)
    pub last_synced_at: Option<i64>,

    pub content_size_bytes: i64,

    pub format: DocumentFormat,

    pub title: String,

    pub description: Option<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

/// Input for registering a document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner: Owner,
    pub file_path: String,
    pub document_type: DocumentType,
    pub storage_mode: StorageMode,
    pub content: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub format: Option<DocumentFormat>,
}

impl NewDocument {
    /// Create a hybrid document with no content yet.
    #[must_use]
    pub fn new(owner: Owner, file_path: impl Into<String>, document_type: DocumentType) -> Self {
        Self {
            owner,
            file_path: file_path.into(),
            document_type,
            storage_mode: StorageMode::Hybrid,
            content: None,
            title: None,
            description: None,
            format: None,
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = mode;
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Field changes for [`crate::storage::DocumentStore::update`].
///
/// `None` leaves a field untouched. `content: Some(None)` clears content.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub content: Option<Option<String>>,
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub file_path: Option<String>,
    pub storage_mode: Option<StorageMode>,
}

impl DocumentUpdate {
    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(Some(content.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.file_path.is_none()
            && self.storage_mode.is_none()
    }
}

/// Selection criteria for listing documents and bulk sync.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub owner: Option<Owner>,
    pub storage_mode: Option<StorageMode>,
    pub category: Option<Category>,
    pub path_prefix: Option<String>,
    pub ids: Option<Vec<String>>,
}

/// Derive a display title: first markdown heading, else the file stem.
#[must_use]
pub fn derive_title(file_path: &str, content: Option<&str>) -> String {
    if let Some(heading) = content.and_then(|c| {
        c.lines()
            .map(str::trim)
            .find(|l| l.starts_with('#'))
            .map(|l| l.trim_start_matches('#').trim().to_string())
    }) {
        if !heading.is_empty() {
            return heading;
        }
    }

    Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_path)
        .replace(['-', '_'], " ")
}
