//! Structure migration command implementation.
//!
//! Without `--execute` or `--rollback` the command only prints the plan.
//! Both destructive forms require `--yes`.

use colored::Colorize;

use crate::cli::commands::workspace::Workspace;
use crate::cli::{GlobalOptions, MigrateArgs};
use crate::error::{Error, Result};
use crate::migrate::{
    ledger, MigrationOptions, MigrationPlan, MigrationReport, MoveOutcome, StructureMigrator,
};
use crate::model::DocumentFilter;
use crate::sync::report::format_size;
use crate::validate::parse_category;

const RUN_LIST_LIMIT: u32 = 20;

/// Execute the migrate-to-structure command.
///
/// # Errors
///
/// `ConfirmationRequired` for `--execute`/`--rollback` without `--yes`,
/// `PartialBatchFailure` if any move failed, or setup errors.
pub fn execute(args: &MigrateArgs, global: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(global)?;
    let migrator = StructureMigrator::new(ws.orchestrator.clone(), ws.backup_root());

    if args.runs {
        return list_runs(&ws, json);
    }

    if let Some(run_id) = &args.rollback {
        let report = migrator.rollback(run_id, args.yes)?;
        return finish(&report, "Rollback", json);
    }

    let options = MigrationOptions {
        category_override: args.category.as_deref().map(parse_category).transpose()?,
        filter: DocumentFilter {
            path_prefix: args.prefix.clone(),
            ..DocumentFilter::default()
        },
    };
    let plan = migrator.plan(&options)?;

    if !args.execute {
        if json {
            println!("{}", serde_json::to_string(&plan)?);
        } else {
            print_plan(&plan);
        }
        return Ok(());
    }

    if plan.is_empty() {
        if json {
            println!("{}", serde_json::to_string(&plan)?);
        } else {
            println!("{}", "Nothing to migrate; every document is in place.".green());
        }
        return Ok(());
    }

    let report = migrator.execute_plan(&plan, !args.no_backup, args.yes)?;
    finish(&report, "Migration", json)
}

fn finish(report: &MigrationReport, label: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        print_report(report, label);
    }

    if report.has_failures() {
        return Err(Error::PartialBatchFailure {
            failed: report.failed,
            total: report.items.len(),
        });
    }
    Ok(())
}

fn list_runs(ws: &Workspace, json: bool) -> Result<()> {
    let runs = ws
        .store()
        .read_with(|conn| ledger::list_runs(conn, RUN_LIST_LIMIT))?;

    if json {
        println!("{}", serde_json::to_string(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No migration runs recorded.");
        return Ok(());
    }

    for run in &runs {
        println!(
            "{}  {:<22} {} migrated, {} failed  ({})",
            run.id.cyan(),
            run.status.as_str(),
            run.migrated,
            run.failed,
            run.actor
        );
    }
    Ok(())
}

fn print_plan(plan: &MigrationPlan) {
    println!("{}", "Migration Plan (dry run)".bold().underline());
    println!();
    println!("  Examined:   {}", plan.examined);
    println!("  In place:   {}", plan.conforming);
    println!("  To move:    {}", plan.len());
    if plan.renamed() > 0 {
        println!("  Renamed:    {}", plan.renamed().to_string().yellow());
    }
    println!("  Data:       {}", format_size(plan.estimated_bytes));
    if let Some(category) = plan.category_override {
        println!("  Category:   {category} (override)");
    }

    if plan.is_empty() {
        println!();
        println!("{}", "Every document is in place.".green());
        return;
    }

    println!();
    for mv in &plan.moves {
        let marker = if mv.renamed { "*".yellow() } else { " ".normal() };
        println!("  {marker}{} → {}", mv.from_path, mv.to_path.green());
    }
    println!();
    println!(
        "{}",
        "Apply with: docsync migrate-to-structure --execute --yes".dimmed()
    );
}

fn print_report(report: &MigrationReport, label: &str) {
    println!("{} {}", format!("{label} {}", report.run_id).bold(), report.status.as_str());
    println!();
    println!("  Migrated:    {}", report.migrated);
    if report.rolled_back > 0 {
        println!("  Rolled back: {}", report.rolled_back);
    }
    if report.skipped > 0 {
        println!("  Skipped:     {}", report.skipped.to_string().yellow());
    }
    if report.failed > 0 {
        println!("  Failed:      {}", report.failed.to_string().red().bold());
    }
    if let Some(dir) = &report.backup_dir {
        println!("  Backups:     {dir}");
    }

    let failures: Vec<_> = report
        .items
        .iter()
        .filter(|i| i.outcome == MoveOutcome::Failed)
        .collect();
    if !failures.is_empty() {
        println!();
        println!("{}", "Failures:".red().bold());
        for item in failures {
            println!(
                "  {} {}",
                item.from_path,
                item.error.as_deref().unwrap_or("unknown error").dimmed()
            );
        }
    }

    if label == "Migration" && report.migrated > 0 {
        println!();
        println!(
            "{}",
            format!(
                "Undo with: docsync migrate-to-structure --rollback {} --yes",
                report.run_id
            )
            .dimmed()
        );
    }
}
