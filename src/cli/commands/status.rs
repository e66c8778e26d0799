//! Status command implementation.

use colored::Colorize;
use serde::Serialize;

use crate::cli::commands::workspace::Workspace;
use crate::cli::GlobalOptions;
use crate::error::Result;
use crate::model::{DocumentFilter, SyncStatus};
use crate::storage::StatusCounts;
use crate::sync::report::print_status_counts;

#[derive(Serialize)]
struct OutOfSync {
    id: String,
    file_path: String,
    storage_mode: String,
    sync_status: SyncStatus,
}

#[derive(Serialize)]
struct StatusOutput {
    root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refreshed: Option<usize>,
    #[serde(flatten)]
    counts: StatusCounts,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    out_of_sync: Vec<OutOfSync>,
}

/// Execute the status command.
///
/// Counts come from the cached status of each document. `--refresh`
/// re-detects every document first.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or detection fails.
pub fn execute(refresh: bool, all: bool, global: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(global)?;

    let refreshed = if refresh {
        Some(ws.orchestrator.refresh_statuses(&DocumentFilter::default())?)
    } else {
        None
    };

    let counts = ws.store().status_counts()?;
    let out_of_sync: Vec<OutOfSync> = if all {
        ws.store()
            .list(&DocumentFilter::default())?
            .into_iter()
            .filter(|d| d.sync_status != SyncStatus::Synced)
            .map(|d| OutOfSync {
                id: d.id,
                file_path: d.file_path,
                storage_mode: d.storage_mode.as_str().to_string(),
                sync_status: d.sync_status,
            })
            .collect()
    } else {
        Vec::new()
    };

    if json {
        let output = StatusOutput {
            root: ws.root.display().to_string(),
            refreshed,
            counts,
            out_of_sync,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("Project: {}", ws.root.display());
    if let Some(n) = refreshed {
        println!("{}", format!("Re-detected {n} document(s)").dimmed());
    }
    println!();
    print_status_counts(&counts);

    if !out_of_sync.is_empty() {
        println!();
        println!("{}", "Out of sync:".yellow().bold());
        for doc in &out_of_sync {
            println!(
                "  {}  {:<11} {}",
                doc.id.cyan(),
                doc.sync_status.as_str(),
                doc.file_path
            );
        }
    }
    Ok(())
}
