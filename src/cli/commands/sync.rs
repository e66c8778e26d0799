//! Sync command implementation.
//!
//! `docsync sync <id>` reconciles one document; `docsync sync --all` runs a
//! batch over every document matching the filters on the worker pool.
//! Ctrl-C during a batch stops new documents from starting.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::commands::workspace::Workspace;
use crate::cli::{GlobalOptions, SyncArgs};
use crate::error::{Error, Result};
use crate::sync::report::{print_bulk_report, print_sync_report};
use crate::sync::{ConflictStrategy, SyncDirection};

/// Execute the sync command.
///
/// # Errors
///
/// Single-document sync propagates the sync error. A batch returns
/// `PartialBatchFailure` after printing its report if any document failed.
pub fn execute(args: &SyncArgs, global: &GlobalOptions, json: bool) -> Result<()> {
    let direction = SyncDirection::parse(&args.direction)?;
    let strategy = args
        .strategy
        .as_deref()
        .map(ConflictStrategy::parse)
        .transpose()?;
    let ws = Workspace::open_with_strategy(global, strategy)?;

    match (&args.id, args.all) {
        (Some(id), _) => sync_one(&ws, id, direction, json),
        (None, true) => sync_all(&ws, args, json),
        (None, false) => Err(Error::InvalidArgument(
            "give a document ID or --all".to_string(),
        )),
    }
}

fn sync_one(ws: &Workspace, id: &str, direction: SyncDirection, json: bool) -> Result<()> {
    let report = ws.orchestrator.sync_document(id, direction)?;
    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_sync_report(&report);
    }
    Ok(())
}

fn sync_all(ws: &Workspace, args: &SyncArgs, json: bool) -> Result<()> {
    let filter = args.filter.to_filter()?;
    let cancel = cancel_on_ctrl_c();
    let report = ws
        .orchestrator
        .bulk_sync_cancellable(&filter, args.dry_run, &cancel)?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_bulk_report(&report);
    }

    if report.has_failures() {
        return Err(Error::PartialBatchFailure {
            failed: report.errors,
            total: report.total,
        });
    }
    Ok(())
}

/// A token that fires when the process receives Ctrl-C.
///
/// The batch runs on blocking worker threads, so the signal is awaited on a
/// small runtime of its own.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let spawned = std::thread::Builder::new()
        .name("docsync-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "Ctrl-C handling unavailable");
                    return;
                }
            };
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; finishing documents in flight");
                    trigger.cancel();
                }
            });
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Ctrl-C handling unavailable");
    }
    cancel
}
