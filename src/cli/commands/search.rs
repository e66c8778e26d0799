//! Search and reindex command implementations.

use colored::Colorize;

use crate::cli::commands::workspace::Workspace;
use crate::cli::GlobalOptions;
use crate::error::{Error, Result};

/// Execute the search command.
///
/// # Errors
///
/// Returns `InvalidArgument` for an empty query, or store errors.
pub fn execute_search(query: &str, limit: usize, global: &GlobalOptions, json: bool) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::InvalidArgument("search query is empty".to_string()));
    }
    let ws = Workspace::open(global)?;
    let hits = ws.store().search(query, limit)?;

    if json {
        let output = serde_json::json!({ "query": query, "count": hits.len(), "hits": hits });
        println!("{output}");
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matches for '{query}'.");
        return Ok(());
    }

    for hit in &hits {
        println!("{} {}", hit.document_id.cyan(), hit.title.bold());
        println!("  {} ({}/{})", hit.file_path, hit.category, hit.document_type);
        if !hit.snippet.is_empty() {
            println!("  {}", hit.snippet.dimmed());
        }
    }
    Ok(())
}

/// Execute the reindex command.
///
/// # Errors
///
/// Returns store errors.
pub fn execute_reindex(rebuild: bool, global: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(global)?;

    if rebuild {
        let indexed = ws.store().rebuild_search_index()?;
        if json {
            println!("{}", serde_json::json!({ "rebuilt": true, "indexed": indexed }));
        } else {
            println!("Rebuilt search index: {indexed} document(s)");
        }
        return Ok(());
    }

    let stats = ws.store().reindex_pending()?;
    if json {
        println!("{}", serde_json::to_string(&stats)?);
    } else if stats.reindexed == 0 && stats.failed == 0 {
        println!("Search index is up to date.");
    } else {
        println!("Reindexed {} document(s)", stats.reindexed);
        if stats.failed > 0 {
            println!("  {} still pending", stats.failed.to_string().yellow());
        }
    }
    Ok(())
}
