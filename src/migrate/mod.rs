//! Structure migration.
//!
//! Moves documents whose paths predate the path contract into
//! `<docs_root>/<category>/<document_type>/<filename>`:
//!
//! - **Plan**: find non-conforming documents, compute collision-free targets
//! - **Execute**: back up, copy, verify checksums, commit the new path
//! - **Rollback**: replay a run's moves in reverse from its ledger
//!
//! # Example
//!
//! ```ignore
//! use docsync::migrate::{MigrationOptions, StructureMigrator};
//!
//! let migrator = StructureMigrator::new(orchestrator, backup_root);
//! let plan = migrator.plan(&MigrationOptions::default())?;   // dry run
//! let report = migrator.execute_plan(&plan, true, confirmed)?;
//! migrator.rollback(&report.run_id, confirmed)?;
//! ```

pub mod executor;
pub mod ledger;
pub mod plan;

pub use executor::{
    CopyTransfer, FileTransfer, MigrationReport, MoveOutcome, MoveResult, StructureMigrator,
};
pub use ledger::{MigrationRun, MoveRecord, MoveStatus, RunStatus};
pub use plan::{plan_migration, MigrationOptions, MigrationPlan, PlannedMove};
