//! Error types for docsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for docsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    DatabaseError,

    // Not Found (exit 3)
    DocumentNotFound,
    MigrationRunNotFound,

    // Validation (exit 4)
    InvalidPath,
    CategoryMismatch,
    InvalidArgument,
    ConfirmationRequired,
    NotImplemented,

    // Conflict (exit 5)
    ManualResolutionRequired,
    ConcurrentModification,

    // Sync (exit 6)
    ChecksumMismatch,
    PartialBatchFailure,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,
    WatchError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            Self::MigrationRunNotFound => "MIGRATION_RUN_NOT_FOUND",
            Self::InvalidPath => "INVALID_PATH",
            Self::CategoryMismatch => "CATEGORY_MISMATCH",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::ManualResolutionRequired => "MANUAL_RESOLUTION_REQUIRED",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::ChecksumMismatch => "CHECKSUM_MISMATCH",
            Self::PartialBatchFailure => "PARTIAL_BATCH_FAILURE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::WatchError => "WATCH_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::DatabaseError => 2,
            Self::DocumentNotFound | Self::MigrationRunNotFound => 3,
            Self::InvalidPath
            | Self::CategoryMismatch
            | Self::InvalidArgument
            | Self::ConfirmationRequired
            | Self::NotImplemented => 4,
            Self::ManualResolutionRequired | Self::ConcurrentModification => 5,
            Self::ChecksumMismatch | Self::PartialBatchFailure => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError | Self::WatchError => 8,
        }
    }

    /// Whether a caller should retry with corrected input.
    ///
    /// True for validation errors that name the offending value and for
    /// transient database contention. False for not-found, I/O, or
    /// conflicts that need a human decision.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath
                | Self::CategoryMismatch
                | Self::InvalidArgument
                | Self::ConfirmationRequired
                | Self::DatabaseError
                | Self::ConcurrentModification
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in docsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `docsync init` first")]
    NotInitialized,

    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    #[error("Migration run not found: {id}")]
    MigrationRunNotFound { id: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Category mismatch for '{path}': document type maps to '{expected}', path says '{actual}'")]
    CategoryMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Manual resolution required for {id}: database and file both changed")]
    ManualResolutionRequired {
        id: String,
        db_content: String,
        file_content: String,
    },

    #[error("Document {id} changed while it was being synced")]
    ConcurrentModification { id: String },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Batch finished with {failed} of {total} documents failed")]
    PartialBatchFailure { failed: usize, total: usize },

    #[error("Confirmation required: re-run with --yes to apply changes")]
    ConfirmationRequired,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            Self::MigrationRunNotFound { .. } => ErrorCode::MigrationRunNotFound,
            Self::InvalidPath { .. } => ErrorCode::InvalidPath,
            Self::CategoryMismatch { .. } => ErrorCode::CategoryMismatch,
            Self::ManualResolutionRequired { .. } => ErrorCode::ManualResolutionRequired,
            Self::ConcurrentModification { .. } => ErrorCode::ConcurrentModification,
            Self::NotImplemented(_) => ErrorCode::NotImplemented,
            Self::ChecksumMismatch { .. } => ErrorCode::ChecksumMismatch,
            Self::PartialBatchFailure { .. } => ErrorCode::PartialBatchFailure,
            Self::ConfirmationRequired => ErrorCode::ConfirmationRequired,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Watch(_) => ErrorCode::WatchError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for scripts and humans.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `docsync init` in the project root to create .docsync/".to_string())
            }

            Self::DocumentNotFound { id } => Some(format!(
                "No document with ID '{id}'. Use `docsync status` to list tracked documents."
            )),

            Self::InvalidPath { .. } => Some(
                "Paths must look like docs/<category>/<document_type>/<filename>. \
                 Run `docsync migrate-to-structure --dry-run` to see suggested locations."
                    .to_string(),
            ),

            Self::CategoryMismatch { expected, .. } => Some(format!(
                "Move the file under the '{expected}' category or pick a document type that belongs to the path's category."
            )),

            Self::ManualResolutionRequired { id, .. } => Some(format!(
                "Inspect both versions, then re-run with an explicit strategy:\n  \
                 docsync sync {id} --strategy db-wins\n  \
                 docsync sync {id} --strategy file-wins"
            )),

            Self::ConcurrentModification { id } => Some(format!(
                "Another writer updated the database copy. Re-run `docsync sync {id}`."
            )),

            Self::NotImplemented(_) => Some(
                "Supported strategies: db-wins, file-wins, latest-wins, manual".to_string(),
            ),

            Self::ConfirmationRequired => Some(
                "Review the plan with --dry-run first, then pass --execute --yes".to_string(),
            ),

            Self::MigrationRunNotFound { .. } => Some(
                "Run IDs are printed at the end of every `migrate-to-structure --execute`".to_string(),
            ),

            Self::PartialBatchFailure { .. } => Some(
                "Per-document errors are listed in the report; fix them and re-run the batch"
                    .to_string(),
            ),

            Self::InvalidArgument(msg) => {
                if msg.contains("strategy") {
                    Some("Valid strategies: db-wins, file-wins, latest-wins, manual".to_string())
                } else if msg.contains("type") {
                    Some("Run `docsync types` to list document types and their categories".to_string())
                } else if msg.contains("owner") {
                    Some("Owners look like project:1, work-item:12, task:7, idea:3".to_string())
                } else {
                    None
                }
            }

            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Watch(_)
            | Self::ChecksumMismatch { .. }
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint. Conflicts also carry both candidate contents.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        if let Self::ManualResolutionRequired {
            db_content,
            file_content,
            ..
        } = self
        {
            obj["error"]["candidates"] = serde_json::json!({
                "database": db_content,
                "file": file_content,
            });
        }

        obj
    }
}
