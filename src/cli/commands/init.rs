//! Initialize a docsync project.
//!
//! Creates `.docsync/` at the project root with:
//! - `.gitignore` that keeps everything but the settings out of git
//! - `config.json` with the default settings
//! - `docsync.db`, with the schema applied
//!
//! Running it again is harmless: existing settings are kept unless
//! `--force` is given.

use crate::config::{data_dir, resolve_db_path, Settings};
use crate::error::{Error, Result};
use crate::storage::DocumentStore;
use crate::sync::ensure_gitignore;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    root: PathBuf,
    database: PathBuf,
    config: PathBuf,
    docs_root: String,
    already_initialized: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the directory, settings or database cannot be created.
pub fn execute(
    root: Option<&Path>,
    docs_root: Option<&str>,
    force: bool,
    json: bool,
) -> Result<()> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir()?,
    };
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "project root {} is not a directory",
            root.display()
        )));
    }

    let base_dir = data_dir(&root);
    let config_path = Settings::project_path(&root);
    let already_initialized = config_path.exists();

    fs::create_dir_all(&base_dir)?;
    ensure_gitignore(&base_dir)?;

    let settings = if already_initialized && !force {
        Settings::from_file(&config_path)?
    } else {
        let mut settings = Settings::default();
        if let Some(docs_root) = docs_root {
            settings.docs_root = docs_root.to_string();
        }
        let settings = settings.validated()?;
        settings.write(&config_path)?;
        settings
    };

    // Opening applies the schema
    let db_path = resolve_db_path(None, &root);
    DocumentStore::open(&db_path)?;

    if json {
        let output = InitOutput {
            root,
            database: db_path,
            config: config_path,
            docs_root: settings.docs_root,
            already_initialized,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        if already_initialized && !force {
            println!("Project already initialized in {}", root.display());
        } else {
            println!("Initialized docsync project in {}", root.display());
        }
        println!("  Database:  {}", db_path.display());
        println!("  Settings:  {}", config_path.display());
        println!("  Docs root: {}/", settings.docs_root);
    }

    Ok(())
}
