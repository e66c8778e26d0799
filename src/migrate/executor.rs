//! Migration execution and rollback.
//!
//! Each document moves under its per-document lock in four steps: back up
//! the source, copy it to the target, verify the checksum, then commit the
//! new path together with its ledger row in one transaction. The source is
//! removed only after that commit, so a reader never sees a path whose file
//! has not landed.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::migrate::ledger::{
    self, MigrationRun, MoveRecord, MoveStatus, NewMove, RunStatus,
};
use crate::migrate::plan::{plan_migration, MigrationOptions, MigrationPlan, PlannedMove};
use crate::model::StorageMode;
use crate::storage::events::EventType;
use crate::storage::sqlite::relocate_in;
use crate::sync::file::{copy_durable, remove_if_exists};
use crate::sync::hash::file_checksum;
use crate::sync::orchestrator::SyncOrchestrator;

/// Moves bytes from one path to another.
///
/// The migrator never assumes the transfer is faithful; it verifies the
/// destination checksum afterwards.
pub trait FileTransfer: Send + Sync {
    /// Copy `from` to `to`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    fn transfer(&self, from: &Path, to: &Path) -> io::Result<u64>;
}

/// Durable filesystem copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyTransfer;

impl FileTransfer for CopyTransfer {
    fn transfer(&self, from: &Path, to: &Path) -> io::Result<u64> {
        copy_durable(from, to)
    }
}

/// Per-document result of an execution or rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOutcome {
    Migrated,
    RolledBack,
    Failed,
    /// The document changed since planning and was left alone.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveResult {
    pub document_id: String,
    pub from_path: String,
    pub to_path: String,
    pub outcome: MoveOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl MoveResult {
    fn new(document_id: &str, from: &str, to: &str, outcome: MoveOutcome) -> Self {
        Self {
            document_id: document_id.to_string(),
            from_path: from.to_string(),
            to_path: to.to_string(),
            outcome,
            error: None,
            error_code: None,
        }
    }

    fn with_error(mut self, err: &Error) -> Self {
        self.error = Some(err.to_string());
        self.error_code = Some(err.error_code().as_str().to_string());
        self
    }
}

/// Result of executing or rolling back a run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<String>,
    pub migrated: usize,
    pub rolled_back: usize,
    pub failed: usize,
    pub skipped: usize,
    pub items: Vec<MoveResult>,
}

impl MigrationReport {
    fn new(run_id: &str, backup_dir: Option<String>, items: Vec<MoveResult>) -> Self {
        let count = |outcome| items.iter().filter(|i| i.outcome == outcome).count();
        let migrated = count(MoveOutcome::Migrated);
        let rolled_back = count(MoveOutcome::RolledBack);
        let failed = count(MoveOutcome::Failed);
        let skipped = count(MoveOutcome::Skipped);
        Self {
            run_id: run_id.to_string(),
            status: RunStatus::Running,
            backup_dir,
            migrated,
            rolled_back,
            failed,
            skipped,
            items,
        }
    }

    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Relocates documents into the canonical layout.
pub struct StructureMigrator {
    orchestrator: Arc<SyncOrchestrator>,
    backup_root: PathBuf,
    transfer: Box<dyn FileTransfer>,
}

impl std::fmt::Debug for StructureMigrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructureMigrator")
            .field("root", &self.orchestrator.root())
            .field("backup_root", &self.backup_root)
            .finish_non_exhaustive()
    }
}

impl StructureMigrator {
    /// Backups for run `R` land under `backup_root/R/<original path>`.
    #[must_use]
    pub fn new(orchestrator: Arc<SyncOrchestrator>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            backup_root: backup_root.into(),
            transfer: Box::new(CopyTransfer),
        }
    }

    #[must_use]
    pub fn with_transfer(mut self, transfer: Box<dyn FileTransfer>) -> Self {
        self.transfer = transfer;
        self
    }

    fn root(&self) -> &Path {
        self.orchestrator.root()
    }

    /// Compute the plan without touching anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn plan(&self, options: &MigrationOptions) -> Result<MigrationPlan> {
        plan_migration(self.orchestrator.store(), self.root(), options)
    }

    /// Plan and execute in one step.
    ///
    /// # Errors
    ///
    /// `ConfirmationRequired` unless `confirmed`; nothing is touched in that
    /// case. Otherwise only setup failures are returned; per-document
    /// failures are recorded in the report.
    pub fn execute(
        &self,
        options: &MigrationOptions,
        backup: bool,
        confirmed: bool,
    ) -> Result<MigrationReport> {
        if !confirmed {
            return Err(Error::ConfirmationRequired);
        }
        let plan = self.plan(options)?;
        self.execute_plan(&plan, backup, confirmed)
    }

    /// Execute a previously computed plan.
    ///
    /// # Errors
    ///
    /// Same as [`Self::execute`].
    pub fn execute_plan(
        &self,
        plan: &MigrationPlan,
        backup: bool,
        confirmed: bool,
    ) -> Result<MigrationReport> {
        if !confirmed {
            return Err(Error::ConfirmationRequired);
        }

        let store = self.orchestrator.store();
        let run_id = format!("mig_{}", &uuid::Uuid::new_v4().to_string()[..12]);
        let backup_dir = backup.then(|| self.backup_root.join(&run_id));
        let backup_label = backup_dir.as_ref().map(|p| p.display().to_string());

        store.mutate("migration_start", |tx, ctx| {
            ledger::insert_run(
                tx,
                &run_id,
                plan.category_override,
                backup_label.as_deref(),
                plan.len(),
                &ctx.actor,
            )?;
            ctx.record_event("migration_run", &run_id, EventType::MigrationStarted);
            Ok(())
        })?;

        info!(run_id = %run_id, moves = plan.len(), backup, "Starting structure migration");

        let items: Vec<MoveResult> = plan
            .moves
            .iter()
            .map(|mv| self.migrate_one(&run_id, mv, backup_dir.as_deref()))
            .collect();

        let mut report = MigrationReport::new(&run_id, backup_label, items);
        report.status = if report.failed == 0 {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };

        store.mutate("migration_finish", |tx, ctx| {
            ledger::finish_run(tx, &run_id, report.status, report.migrated, report.failed)?;
            ctx.record_note(
                "migration_run",
                &run_id,
                EventType::MigrationFinished,
                &format!("{} migrated, {} failed", report.migrated, report.failed),
            );
            Ok(())
        })?;

        info!(
            run_id = %run_id,
            migrated = report.migrated,
            failed = report.failed,
            skipped = report.skipped,
            "Structure migration finished"
        );
        Ok(report)
    }

    fn migrate_one(&self, run_id: &str, mv: &PlannedMove, backup_dir: Option<&Path>) -> MoveResult {
        let result = MoveResult::new(&mv.document_id, &mv.from_path, &mv.to_path, MoveOutcome::Migrated);
        let _lock = self.orchestrator.locks().lock(&mv.document_id);

        match self.try_migrate(run_id, mv, backup_dir) {
            Ok(true) => result,
            Ok(false) => MoveResult {
                outcome: MoveOutcome::Skipped,
                ..result
            },
            Err(e) => {
                warn!(
                    document_id = %mv.document_id,
                    from = %mv.from_path,
                    to = %mv.to_path,
                    error = %e,
                    "Document migration failed"
                );
                self.record_failure(run_id, mv, &e);
                MoveResult {
                    outcome: MoveOutcome::Failed,
                    ..result
                }
                .with_error(&e)
            }
        }
    }

    /// Returns `Ok(false)` if the document no longer matches the plan.
    fn try_migrate(&self, run_id: &str, mv: &PlannedMove, backup_dir: Option<&Path>) -> Result<bool> {
        let store = self.orchestrator.store();
        let Some(doc) = store.get(&mv.document_id)? else {
            return Ok(false);
        };
        if doc.file_path != mv.from_path {
            return Ok(false);
        }

        let source = self.root().join(&mv.from_path);
        let target = self.root().join(&mv.to_path);
        let has_file = doc.storage_mode != StorageMode::DatabaseOnly && source.is_file();

        if target.exists() {
            return Err(Error::InvalidArgument(format!(
                "target {} appeared after planning",
                mv.to_path
            )));
        }

        let mut backup_path = None;
        let mut checksum = None;

        if has_file {
            if let Some(dir) = backup_dir {
                let path = dir.join(&mv.from_path);
                copy_durable(&source, &path)?;
                backup_path = Some(path);
            }

            let before = file_checksum(&source)?;
            if let Err(e) = self.transfer.transfer(&source, &target) {
                remove_if_exists(&target)?;
                return Err(e.into());
            }

            let after = file_checksum(&target)?;
            if after != before {
                remove_if_exists(&target)?;
                self.restore_source(&source, &before, backup_path.as_deref())?;
                return Err(Error::ChecksumMismatch {
                    path: target,
                    expected: before,
                    actual: after,
                });
            }
            checksum = Some(before);
        }

        let backup_label = backup_path.as_ref().map(|p| p.display().to_string());
        let committed = store.mutate("migrate_document", |tx, ctx| {
            let moved = relocate_in(
                tx,
                ctx,
                &mv.document_id,
                &mv.from_path,
                &mv.to_path,
                mv.to_category,
                EventType::PathMigrated,
            )?;
            if !moved {
                return Ok(false);
            }
            ledger::insert_move(
                tx,
                &NewMove {
                    run_id,
                    document_id: &mv.document_id,
                    from_path: &mv.from_path,
                    to_path: &mv.to_path,
                    from_category: mv.from_category,
                    to_category: mv.to_category,
                    backup_path: backup_label.as_deref(),
                    checksum: checksum.as_deref(),
                    status: MoveStatus::Migrated,
                    error: None,
                },
            )?;
            Ok(true)
        });

        match committed {
            Ok(true) => {}
            Ok(false) => {
                if has_file {
                    remove_if_exists(&target)?;
                }
                return Ok(false);
            }
            Err(e) => {
                if has_file {
                    remove_if_exists(&target)?;
                }
                return Err(e);
            }
        }

        if has_file {
            if let Err(e) = remove_if_exists(&source) {
                warn!(path = %source.display(), error = %e, "Could not remove migrated source file");
            }
        }

        info!(
            document_id = %mv.document_id,
            from = %mv.from_path,
            to = %mv.to_path,
            "Migrated document"
        );
        Ok(true)
    }

    /// Put the source back if the transfer disturbed it.
    fn restore_source(&self, source: &Path, expected: &str, backup: Option<&Path>) -> Result<()> {
        let intact = source.is_file() && file_checksum(source)? == expected;
        if intact {
            return Ok(());
        }
        match backup {
            Some(backup) => {
                self.transfer.transfer(backup, source)?;
                Ok(())
            }
            None => Err(Error::Other(format!(
                "source {} was damaged and no backup exists",
                source.display()
            ))),
        }
    }

    fn record_failure(&self, run_id: &str, mv: &PlannedMove, err: &Error) {
        let message = err.to_string();
        let recorded = self.orchestrator.store().mutate("migrate_document_failed", |tx, _ctx| {
            ledger::insert_move(
                tx,
                &NewMove {
                    run_id,
                    document_id: &mv.document_id,
                    from_path: &mv.from_path,
                    to_path: &mv.to_path,
                    from_category: mv.from_category,
                    to_category: mv.to_category,
                    backup_path: None,
                    checksum: None,
                    status: MoveStatus::Failed,
                    error: Some(&message),
                },
            )
        });
        if let Err(e) = recorded {
            warn!(run_id = %run_id, error = %e, "Could not record failed move");
        }
    }

    /// The run and its recorded moves.
    ///
    /// # Errors
    ///
    /// Returns `MigrationRunNotFound` for unknown ids.
    pub fn run(&self, run_id: &str) -> Result<(MigrationRun, Vec<MoveRecord>)> {
        self.orchestrator.store().read_with(|conn| {
            let run = ledger::get_run(conn, run_id)?;
            let moves = ledger::get_moves(conn, run_id)?;
            Ok((run, moves))
        })
    }

    /// Undo every successful move of a run, newest first.
    ///
    /// Moves already undone by an earlier attempt are left alone, so a run
    /// whose rollback stopped at `rollback_incomplete` can be retried.
    ///
    /// # Errors
    ///
    /// `ConfirmationRequired` unless `confirmed`, `MigrationRunNotFound` for
    /// unknown ids, `InvalidArgument` if the run was already rolled back.
    pub fn rollback(&self, run_id: &str, confirmed: bool) -> Result<MigrationReport> {
        if !confirmed {
            return Err(Error::ConfirmationRequired);
        }

        let (run, moves) = self.run(run_id)?;
        let pending: Vec<&MoveRecord> = moves
            .iter()
            .rev()
            .filter(|m| m.status == MoveStatus::Migrated)
            .collect();
        if run.status == RunStatus::RolledBack && pending.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "migration run {run_id} was already rolled back"
            )));
        }

        info!(run_id = %run_id, pending = pending.len(), "Rolling back structure migration");

        let items: Vec<MoveResult> = pending.into_iter().map(|m| self.restore_one(m)).collect();

        let mut report = MigrationReport::new(run_id, run.backup_dir.clone(), items);
        report.status = if report.failed == 0 {
            RunStatus::RolledBack
        } else {
            RunStatus::RollbackIncomplete
        };

        self.orchestrator.store().mutate("migration_rollback", |tx, ctx| {
            ledger::finish_run(tx, run_id, report.status, run.migrated, run.failed)?;
            ctx.record_note(
                "migration_run",
                run_id,
                EventType::MigrationRolledBack,
                &format!("{} restored, {} failed", report.rolled_back, report.failed),
            );
            Ok(())
        })?;

        Ok(report)
    }

    fn restore_one(&self, mv: &MoveRecord) -> MoveResult {
        let result = MoveResult::new(&mv.document_id, &mv.to_path, &mv.from_path, MoveOutcome::RolledBack);
        let _lock = self.orchestrator.locks().lock(&mv.document_id);

        match self.try_restore(mv) {
            Ok(true) => result,
            Ok(false) => MoveResult {
                outcome: MoveOutcome::Skipped,
                ..result
            },
            Err(e) => {
                warn!(document_id = %mv.document_id, error = %e, "Rollback of move failed");
                MoveResult {
                    outcome: MoveOutcome::Failed,
                    ..result
                }
                .with_error(&e)
            }
        }
    }

    fn try_restore(&self, mv: &MoveRecord) -> Result<bool> {
        let store = self.orchestrator.store();
        let Some(doc) = store.get(&mv.document_id)? else {
            return Ok(false);
        };
        if doc.file_path != mv.to_path {
            return Ok(false);
        }

        let original = self.root().join(&mv.from_path);
        let relocated = self.root().join(&mv.to_path);

        if original.exists() {
            return Err(Error::InvalidArgument(format!(
                "{} is occupied; refusing to overwrite it",
                mv.from_path
            )));
        }

        let has_file = mv.checksum.is_some();
        if let Some(recorded) = &mv.checksum {
            let (source, expected) = Self::restore_origin(mv, &relocated, recorded)?;
            self.transfer.transfer(&source, &original)?;

            let actual = file_checksum(&original)?;
            if actual != expected {
                remove_if_exists(&original)?;
                return Err(Error::ChecksumMismatch {
                    path: original,
                    expected,
                    actual,
                });
            }
        }

        let committed = store.mutate("restore_document", |tx, ctx| {
            let moved = relocate_in(
                tx,
                ctx,
                &mv.document_id,
                &mv.to_path,
                &mv.from_path,
                mv.from_category,
                EventType::PathRestored,
            )?;
            if moved {
                ledger::set_move_status(tx, mv.id, MoveStatus::RolledBack)?;
            }
            Ok(moved)
        });

        let moved = match committed {
            Ok(moved) => moved,
            Err(e) => {
                if has_file {
                    remove_if_exists(&original)?;
                }
                return Err(e);
            }
        };
        if !moved {
            if has_file {
                remove_if_exists(&original)?;
            }
            return Ok(false);
        }

        if has_file {
            if let Err(e) = remove_if_exists(&relocated) {
                warn!(path = %relocated.display(), error = %e, "Could not remove relocated file");
            }
        }

        info!(document_id = %mv.document_id, path = %mv.from_path, "Restored document path");
        Ok(true)
    }

    /// The file to copy back and the checksum the copy must have.
    ///
    /// The relocated file is preferred over the backup so edits made after
    /// the migration travel back with it. The backup is used only when the
    /// relocated file is gone.
    fn restore_origin(
        mv: &MoveRecord,
        relocated: &Path,
        recorded: &str,
    ) -> Result<(PathBuf, String)> {
        if relocated.is_file() {
            let current = file_checksum(relocated)?;
            if current != recorded {
                warn!(
                    document_id = %mv.document_id,
                    path = %mv.to_path,
                    "File changed after migration; restoring the edited copy"
                );
            }
            return Ok((relocated.to_path_buf(), current));
        }

        match &mv.backup_path {
            Some(backup) => Ok((PathBuf::from(backup), recorded.to_string())),
            None => Err(Error::Other(format!(
                "{} is missing and the run kept no backup",
                mv.to_path
            ))),
        }
    }
}
