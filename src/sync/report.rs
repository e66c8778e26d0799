//! Human-readable rendering of sync results.
//!
//! JSON output serializes the report structs directly; these functions
//! cover the terminal case.

use colored::Colorize;

use crate::model::SyncStatus;
use crate::storage::StatusCounts;
use crate::sync::orchestrator::{BulkOutcome, BulkSyncReport, SyncAction, SyncReport};

fn status_label(status: SyncStatus) -> colored::ColoredString {
    let text = status.as_str();
    match status {
        SyncStatus::Synced => text.green(),
        SyncStatus::Conflict => text.red().bold(),
        SyncStatus::MissingFile | SyncStatus::MissingDb => text.yellow(),
        SyncStatus::DbNewer | SyncStatus::FileNewer => text.cyan(),
    }
}

fn action_label(action: SyncAction) -> colored::ColoredString {
    let text = action.as_str();
    match action {
        SyncAction::None => text.dimmed(),
        SyncAction::WroteFile | SyncAction::WroteDatabase => text.green(),
        SyncAction::ResolvedConflict | SyncAction::RemovedStrayFile => text.yellow(),
    }
}

/// Print the outcome of a single-document sync.
pub fn print_sync_report(report: &SyncReport) {
    if report.action == SyncAction::None {
        println!(
            "{} {} {}",
            "✓".green(),
            report.file_path,
            "already in sync".dimmed()
        );
        return;
    }

    println!(
        "{} {} ({} → {})",
        "✓".green(),
        report.file_path,
        status_label(report.status_before),
        status_label(report.status_after)
    );
    println!("  Action:    {}", action_label(report.action));
    println!("  Direction: {}", report.direction);
    if let Some(winner) = report.winner {
        println!("  Winner:    {winner:?}");
    }
}

/// Print a bulk sync summary followed by per-document failures.
pub fn print_bulk_report(report: &BulkSyncReport) {
    let heading = if report.dry_run {
        "Sync Plan (dry run)"
    } else {
        "Sync Summary"
    };
    println!("{}", heading.bold().underline());
    println!();
    println!("  Total:              {}", report.total);
    println!("  Already synced:     {}", report.already_synced);
    if report.dry_run {
        println!("  Would sync:         {}", report.planned);
    } else {
        println!("  Updated:            {}", report.updated);
        println!("  Conflicts resolved: {}", report.conflicts_resolved);
    }
    if report.skipped > 0 {
        println!("  Skipped:            {}", report.skipped.to_string().yellow());
    }
    if report.errors > 0 {
        println!("  Errors:             {}", report.errors.to_string().red().bold());
    }

    if report.dry_run && report.planned > 0 {
        println!();
        println!("{}", "Planned:".blue().bold());
        for item in report
            .items
            .iter()
            .filter(|i| i.outcome == BulkOutcome::Planned)
        {
            let status = item.status_before.map_or_else(|| "?".normal(), status_label);
            let action = item.action.map_or_else(|| "?".normal(), action_label);
            println!("  {} [{}] → {}", item.file_path, status, action);
        }
    }

    if report.has_failures() {
        println!();
        println!("{}", "Failures:".red().bold());
        for item in report.failures() {
            println!(
                "  {} {}",
                item.file_path,
                item.error.as_deref().unwrap_or("unknown error").dimmed()
            );
        }
    }

    if report.cancelled {
        println!();
        println!("{}", "Cancelled before all documents were started.".yellow());
    }
}

/// Print cached sync status counts.
pub fn print_status_counts(counts: &StatusCounts) {
    println!("{}", "Document Status".bold().underline());
    println!();

    if counts.total == 0 {
        println!("{}", "No documents registered.".dimmed());
        return;
    }

    println!("{}", "By sync status:".blue().bold());
    for status in SyncStatus::ALL {
        let n = counts.count(status);
        if n > 0 {
            println!("  {:<13} {}", status_label(status), n);
        }
    }
    println!();

    println!("{}", "By storage mode:".blue().bold());
    for (mode, n) in &counts.by_mode {
        println!("  {mode:<13} {n}");
    }
    println!();

    println!("  {}: {}", "Total".bold(), counts.total);
    if counts.pending_index > 0 {
        println!(
            "  {}: {} (run `docsync reindex`)",
            "Search index backlog".yellow(),
            counts.pending_index
        );
    }

    let out_of_sync = counts.out_of_sync();
    println!();
    if out_of_sync == 0 {
        println!("{}", "Everything is in sync.".green());
    } else {
        println!(
            "{}",
            format!("{out_of_sync} document(s) need attention. Run `docsync sync --all --dry-run` to preview.")
                .dimmed()
        );
    }
}

/// Format a byte size as a human-readable string.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
