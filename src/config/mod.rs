//! Configuration management.
//!
//! This module provides functions for discovering the project root,
//! resolving the database path, and loading settings.
//!
//! # Layout
//!
//! Every project keeps its state in a `.docsync/` directory at the root:
//! - **Database**: `.docsync/docsync.db` (ignored by git)
//! - **Settings**: `.docsync/config.json` (committed)
//! - **Backups**: `.docsync/backups/<run-id>/` for structure migrations
//!
//! The directory containing `.docsync/` is the project root that every
//! document path is relative to.

mod settings;

pub use settings::{Settings, DEFAULT_BACKUP_DIR, DEFAULT_DEBOUNCE_MS};

use crate::error::{Error, Result};

use std::path::{Path, PathBuf};

/// Name of the per-project data directory.
pub const DATA_DIR: &str = ".docsync";

/// Database filename inside the data directory.
pub const DB_FILENAME: &str = "docsync.db";

/// Settings filename inside the data directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Discover the project root.
///
/// Resolution strategy:
/// 1. Check the **git root** first: if it has `.docsync/`, use it.
///    This prevents a nested data dir from shadowing the real project root.
/// 2. Fall back to walking up from CWD (for non-git projects).
#[must_use]
pub fn discover_project_root() -> Option<PathBuf> {
    // Strategy 1: Use git root as the anchor (handles monorepos/subdirectories)
    if let Some(git_root) = git_toplevel() {
        if git_root.join(DATA_DIR).is_dir() {
            return Some(git_root);
        }
    }

    // Strategy 2: Walk up from CWD (non-git projects)
    std::env::current_dir()
        .ok()
        .and_then(|cwd| find_root_from(&cwd))
}

/// Walk up from `start` to the first directory containing `.docsync/`.
#[must_use]
pub fn find_root_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(DATA_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// Get the git repository root directory.
fn git_toplevel() -> Option<PathBuf> {
    std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

/// Resolve the project root.
///
/// Priority:
/// 1. `explicit` (the `--root` flag)
/// 2. `DOCSYNC_ROOT` environment variable
/// 3. Discovery via [`discover_project_root`]
///
/// # Errors
///
/// Returns `NotInitialized` if no root is given and none can be discovered,
/// and `Config` if an explicit root is not a directory.
pub fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf> {
    let given = explicit.map(Path::to_path_buf).or_else(|| {
        std::env::var("DOCSYNC_ROOT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    });

    match given {
        Some(root) if root.is_dir() => Ok(root),
        Some(root) => Err(Error::Config(format!(
            "project root {} is not a directory",
            root.display()
        ))),
        None => discover_project_root().ok_or(Error::NotInitialized),
    }
}

/// The data directory of a project.
#[must_use]
pub fn data_dir(root: &Path) -> PathBuf {
    root.join(DATA_DIR)
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `DOCSYNC_DB` environment variable
/// 3. Project location: `<root>/.docsync/docsync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>, root: &Path) -> PathBuf {
    // Priority 1: Explicit path from CLI flag
    if let Some(path) = explicit_path {
        return path.to_path_buf();
    }

    // Priority 2: DOCSYNC_DB environment variable
    if let Ok(db_path) = std::env::var("DOCSYNC_DB") {
        if !db_path.trim().is_empty() {
            return PathBuf::from(db_path);
        }
    }

    // Priority 3: Per-project database
    data_dir(root).join(DB_FILENAME)
}

/// User-level settings file, used when a project has none.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "docsync").map(|d| d.config_dir().join(CONFIG_FILENAME))
}

/// Get the default actor name.
///
/// Priority:
/// 1. `explicit` (the `--actor` flag)
/// 2. `DOCSYNC_ACTOR` environment variable
/// 3. Git user name
/// 4. System username
/// 5. "unknown"
#[must_use]
pub fn default_actor(explicit: Option<&str>) -> String {
    if let Some(actor) = explicit.filter(|a| !a.trim().is_empty()) {
        return actor.to_string();
    }

    // Check environment variable
    if let Ok(actor) = std::env::var("DOCSYNC_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    // Try git user name
    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    // Try system username
    if let Ok(user) = std::env::var("USER") {
        return user;
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_actor() {
        assert_eq!(default_actor(Some("ci-bot")), "ci-bot");
        assert!(!default_actor(None).is_empty());
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Some(&explicit), Path::new("/project"));
        assert_eq!(result, explicit);
    }

    #[test]
    fn test_find_root_walks_up() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(DATA_DIR)).unwrap();
        let nested = temp.path().join("docs/guides/tutorial");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_root_from(&nested).as_deref(), Some(temp.path()));
    }

    #[test]
    fn test_find_root_none_without_data_dir() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        // An ancestor of the temp dir could in principle have .docsync/,
        // so only assert that the temp dir itself is not chosen.
        assert_ne!(find_root_from(&nested).as_deref(), Some(temp.path()));
    }

    #[test]
    fn test_resolve_root_explicit() {
        let temp = TempDir::new().unwrap();
        assert_eq!(resolve_root(Some(temp.path())).unwrap(), temp.path());

        let missing = temp.path().join("nope");
        assert!(matches!(resolve_root(Some(&missing)), Err(Error::Config(_))));
    }
}
