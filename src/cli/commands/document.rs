//! Document command implementations.

use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::commands::workspace::{parse_owner, Workspace};
use crate::cli::{GlobalOptions, ListArgs, RegisterArgs, UpdateArgs};
use crate::error::{Error, Result};
use crate::model::{
    Category, DocumentReference, DocumentType, DocumentUpdate, NewDocument, StorageMode,
    SyncStatus,
};
use crate::sync::{FileObservation, SyncDirection};
use crate::validate::{normalize_document_type, parse_category};

#[derive(Serialize)]
struct DeleteOutput {
    id: String,
    file_path: String,
    deleted: bool,
}

#[derive(Serialize)]
struct TypeEntry {
    document_type: &'static str,
    category: &'static str,
}

/// Parse a document type, suggesting the closest one on a miss.
fn parse_document_type(input: &str) -> Result<DocumentType> {
    normalize_document_type(input).map_err(|(given, suggestion)| {
        let hint = suggestion
            .map(|s| format!(" (did you mean '{s}'?)"))
            .unwrap_or_default();
        Error::InvalidArgument(format!("unknown document type '{given}'{hint}"))
    })
}

fn read_content(inline: Option<&String>, file: Option<&PathBuf>) -> Result<Option<String>> {
    match (inline, file) {
        (Some(text), _) => Ok(Some(text.clone())),
        (None, Some(path)) => Ok(Some(std::fs::read_to_string(path)?)),
        (None, None) => Ok(None),
    }
}

/// Execute the register command.
///
/// Hybrid documents are brought in line with disk right away: given content
/// is written to a missing file, an existing file with no content given is
/// adopted. When both exist nothing is overwritten and the status shows the
/// conflict.
///
/// # Errors
///
/// Returns path contract errors, `InvalidArgument` for bad flags, or store errors.
pub fn execute_register(args: &RegisterArgs, global: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(global)?;
    let document_type = parse_document_type(&args.document_type)?;
    let owner = parse_owner(&args.owner)?;
    let content = read_content(args.content.as_ref(), args.content_file.as_ref())?;
    let mode: StorageMode = args.mode.into();

    let mut new = NewDocument::new(owner, ws.relative_path(&args.path), document_type).with_mode(mode);
    let has_content = content.is_some();
    if let Some(content) = content {
        new = new.with_content(content);
    }
    if let Some(title) = &args.title {
        new = new.with_title(title);
    }
    if let Some(description) = &args.description {
        new = new.with_description(description);
    }

    let doc = if args.legacy {
        ws.store().import_legacy(new)?
    } else {
        ws.store().create(new)?
    };

    let orch = &ws.orchestrator;
    let file_exists = orch.absolute_path(&doc).exists();
    if mode == StorageMode::Hybrid && !(has_content && file_exists) {
        orch.sync_document(&doc.id, SyncDirection::Bidirectional)?;
    } else {
        orch.status(&doc.id)?;
    }
    let doc = ws.store().read(&doc.id)?;

    if json {
        println!("{}", serde_json::to_string(&doc)?);
    } else {
        println!("Registered {}: {}", doc.id.cyan(), doc.file_path);
        println!("  Type:   {} ({})", doc.document_type, doc.category);
        println!("  Mode:   {}", doc.storage_mode.as_str());
        println!("  Status: {}", doc.sync_status);
    }
    Ok(())
}

/// Execute the show command.
///
/// # Errors
///
/// Returns `DocumentNotFound` or store/file errors.
pub fn execute_show(id: &str, content: bool, global: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(global)?;
    let detection = ws.orchestrator.status(id)?;
    let doc = ws.store().read(id)?;

    if content {
        let text = match doc.storage_mode {
            StorageMode::FileOnly => match &detection.file {
                FileObservation::Present { content, .. } => Some(content.clone()),
                FileObservation::Absent => None,
            },
            StorageMode::Hybrid | StorageMode::DatabaseOnly => doc.content.clone(),
        };
        if json {
            let output = serde_json::json!({ "id": doc.id, "content": text });
            println!("{output}");
        } else if let Some(text) = text {
            print!("{text}");
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string(&doc)?);
        return Ok(());
    }

    println!("{} {}", doc.id.cyan(), doc.title.bold());
    println!("  Path:     {}", doc.file_path);
    println!("  Owner:    {}", doc.owner);
    println!("  Type:     {} ({})", doc.document_type, doc.category);
    println!("  Mode:     {}", doc.storage_mode.as_str());
    println!("  Format:   {}", doc.format.as_str());
    println!("  Status:   {}", status_text(doc.sync_status));
    println!("  Size:     {} bytes", doc.content_size_bytes);
    if let Some(hash) = &doc.content_hash {
        println!("  Hash:     {}", &hash[..hash.len().min(16)]);
    }
    if let Some(description) = &doc.description {
        println!("  About:    {description}");
    }
    println!("  Updated:  {}", format_millis(doc.updated_at));
    if let Some(synced) = doc.last_synced_at {
        println!("  Synced:   {}", format_millis(synced));
    }
    Ok(())
}

/// Execute the update command.
///
/// Metadata changes are applied first, then content is written through
/// the orchestrator so hybrid files follow.
///
/// # Errors
///
/// Returns `InvalidArgument` when nothing is given to change, or store errors.
pub fn execute_update(args: &UpdateArgs, global: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(global)?;
    let content = read_content(args.content.as_ref(), args.content_file.as_ref())?;

    let metadata = DocumentUpdate {
        title: args.title.clone(),
        description: args.description.clone().map(Some),
        storage_mode: args.mode.map(Into::into),
        ..DocumentUpdate::default()
    };
    if metadata.is_empty() && content.is_none() {
        return Err(Error::InvalidArgument(
            "nothing to update: pass --content, --content-file, --title, --description or --mode"
                .to_string(),
        ));
    }

    if !metadata.is_empty() {
        ws.store().update(&args.id, metadata)?;
    }
    if let Some(content) = content {
        ws.orchestrator.write_content(&args.id, &content)?;
    }
    let doc = ws.store().read(&args.id)?;

    if json {
        println!("{}", serde_json::to_string(&doc)?);
    } else {
        println!("Updated {}: {}", doc.id.cyan(), doc.file_path);
        println!("  Status: {}", status_text(doc.sync_status));
    }
    Ok(())
}

/// Execute the delete command.
///
/// # Errors
///
/// Returns `DocumentNotFound` or an I/O error removing the file.
pub fn execute_delete(id: &str, global: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(global)?;
    let doc = ws.orchestrator.delete_document(id)?;

    if json {
        let output = DeleteOutput {
            id: doc.id,
            file_path: doc.file_path,
            deleted: true,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Deleted {}: {}", doc.id.cyan(), doc.file_path);
    }
    Ok(())
}

/// Execute the list command.
///
/// # Errors
///
/// Returns filter parse errors or store errors.
pub fn execute_list(args: &ListArgs, global: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut docs = ws.store().list(&args.filter.to_filter()?)?;
    if let Some(limit) = args.limit {
        docs.truncate(limit);
    }

    if json {
        let output = serde_json::json!({ "count": docs.len(), "documents": docs });
        println!("{output}");
        return Ok(());
    }

    if docs.is_empty() {
        println!("No documents found.");
        return Ok(());
    }

    for doc in &docs {
        print_row(doc);
    }
    println!();
    println!("{} document(s)", docs.len());
    Ok(())
}

/// Execute the history command.
///
/// # Errors
///
/// Returns `DocumentNotFound` or store errors.
pub fn execute_history(id: &str, limit: u32, global: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(global)?;
    // Surface a missing document instead of an empty history
    ws.store().read(id)?;
    let events = ws.store().history(id, Some(limit))?;

    if json {
        let output = serde_json::json!({ "id": id, "events": events });
        println!("{output}");
        return Ok(());
    }

    for event in &events {
        let comment = event.comment.as_deref().unwrap_or("");
        println!(
            "{}  {:<22} {:<12} {}",
            format_millis(event.created_at).dimmed(),
            event.event_type.as_str(),
            event.actor,
            comment
        );
    }
    Ok(())
}

/// Execute the types command. Needs no project.
///
/// # Errors
///
/// Returns `InvalidArgument` for an unknown category.
pub fn execute_types(category: Option<&str>, json: bool) -> Result<()> {
    let only = category.map(parse_category).transpose()?;
    let categories: Vec<Category> = match only {
        Some(c) => vec![c],
        None => Category::ALL.to_vec(),
    };

    if json {
        let entries: Vec<TypeEntry> = categories
            .iter()
            .flat_map(|c| c.document_types())
            .map(|t| TypeEntry {
                document_type: t.as_str(),
                category: t.category().as_str(),
            })
            .collect();
        println!("{}", serde_json::to_string(&entries)?);
        return Ok(());
    }

    for c in categories {
        println!("{}", c.as_str().bold());
        for t in c.document_types() {
            println!("  {}", t.as_str());
        }
    }
    Ok(())
}

fn print_row(doc: &DocumentReference) {
    println!(
        "{}  {:<11} {:<14} {}",
        doc.id.cyan(),
        status_text(doc.sync_status),
        doc.storage_mode.as_str(),
        doc.file_path
    );
}

fn status_text(status: SyncStatus) -> colored::ColoredString {
    match status {
        SyncStatus::Synced => status.as_str().green(),
        SyncStatus::Conflict => status.as_str().red(),
        _ => status.as_str().yellow(),
    }
}

fn format_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_type_suggests() {
        assert_eq!(parse_document_type("ADR").unwrap(), DocumentType::Adr);
        match parse_document_type("tutoral") {
            Err(Error::InvalidArgument(msg)) => assert!(msg.contains("tutorial")),
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01 00:00:00");
    }
}
