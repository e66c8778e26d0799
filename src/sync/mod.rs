//! Database/filesystem synchronization.
//!
//! - **Hashing**: SHA-256 digests used for every change comparison
//! - **Files**: atomic writes and file observation
//! - **Detection**: classify a document against its file
//! - **Resolution**: pick a winner for conflicts by strategy
//! - **Orchestration**: single and bulk syncs under per-document locks
//! - **Watching**: debounced `file_to_db` syncs driven by filesystem events
//!
//! # Example
//!
//! ```ignore
//! use docsync::sync::{SyncDirection, SyncOrchestrator};
//!
//! let orchestrator = SyncOrchestrator::new(store, project_root);
//! let report = orchestrator.sync_document(&id, SyncDirection::Bidirectional)?;
//! let batch = orchestrator.bulk_sync(&DocumentFilter::default(), true)?;
//! ```

pub mod detector;
pub mod file;
pub mod hash;
pub mod locks;
pub mod orchestrator;
pub mod report;
pub mod resolver;
pub mod watch;

pub use detector::{classify, ChangeDetector, Detection};
pub use file::{atomic_write, ensure_gitignore, FileObservation, TEMP_SUFFIX};
pub use hash::{content_hash, file_checksum, has_changed};
pub use locks::{DocumentLock, LockTable};
pub use orchestrator::{
    planned_action, BulkItem, BulkOutcome, BulkSyncReport, SyncAction, SyncDirection,
    SyncOrchestrator, SyncReport, DEFAULT_WORKERS,
};
pub use resolver::{ConflictCandidates, ConflictResolver, ConflictStrategy, Winner};
pub use watch::{Debouncer, WatchStats, WatchTrigger, DEFAULT_DEBOUNCE};
