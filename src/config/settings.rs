//! Project settings from `.docsync/config.json`.
//!
//! Every field is optional in the file. Lookup order for the file is the
//! project's data directory, then the user config directory; environment
//! variables override whatever was loaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{data_dir, user_config_path, CONFIG_FILENAME};
use crate::error::{Error, Result};
use crate::sync::{ConflictStrategy, DEFAULT_WORKERS};
use crate::validate::{PathContract, DEFAULT_DOCS_ROOT};

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_BACKUP_DIR: &str = ".docsync/backups";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Top-level directory of canonical document paths.
    pub docs_root: String,
    /// Watcher quiet window in milliseconds.
    pub debounce_ms: u64,
    /// Bulk sync worker pool size.
    pub workers: usize,
    /// Conflict strategy when none is given on the command line.
    pub default_strategy: ConflictStrategy,
    /// Migration backup location, relative to the project root unless absolute.
    pub backup_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docs_root: DEFAULT_DOCS_ROOT.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            workers: DEFAULT_WORKERS,
            default_strategy: ConflictStrategy::default(),
            backup_dir: DEFAULT_BACKUP_DIR.to_string(),
        }
    }
}

impl Settings {
    /// Load settings for a project and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a settings file exists but is malformed, or an
    /// override has an invalid value.
    pub fn load(root: &Path) -> Result<Self> {
        let project = Self::project_path(root);
        let loaded = if project.is_file() {
            Self::from_file(&project)?
        } else {
            match user_config_path().filter(|p| p.is_file()) {
                Some(user) => Self::from_file(&user)?,
                None => Self::default(),
            }
        };
        loaded.with_overrides(|key| std::env::var(key).ok())
    }

    /// Location of the project settings file.
    #[must_use]
    pub fn project_path(root: &Path) -> PathBuf {
        data_dir(root).join(CONFIG_FILENAME)
    }

    /// Parse a settings file.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the file on read or parse failure.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let settings: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        settings.validated()
    }

    /// Apply `DOCSYNC_DEBOUNCE_MS` / `DOCSYNC_WORKERS` from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a value does not parse.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DOCSYNC_DEBOUNCE_MS").filter(|v| !v.trim().is_empty()) {
            self.debounce_ms = raw.trim().parse().map_err(|_| {
                Error::Config(format!("DOCSYNC_DEBOUNCE_MS must be milliseconds, got '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup("DOCSYNC_WORKERS").filter(|v| !v.trim().is_empty()) {
            self.workers = raw.trim().parse().map_err(|_| {
                Error::Config(format!("DOCSYNC_WORKERS must be a positive integer, got '{raw}'"))
            })?;
        }
        self.validated()
    }

    /// Check field constraints.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the offending field.
    pub fn validated(self) -> Result<Self> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        let root = self.docs_root.trim_matches('/');
        if root.is_empty() || root.contains('/') || root.starts_with('.') {
            return Err(Error::Config(format!(
                "docs_root must be a single directory name, got '{}'",
                self.docs_root
            )));
        }
        Ok(self)
    }

    /// Write settings as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        crate::sync::atomic_write(path, &format!("{json}\n"))?;
        Ok(())
    }

    #[must_use]
    pub fn contract(&self) -> PathContract {
        PathContract::new(&self.docs_root)
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Absolute backup directory for a project.
    #[must_use]
    pub fn backup_root(&self, root: &Path) -> PathBuf {
        let dir = Path::new(&self.backup_dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            root.join(dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.docs_root, "docs");
        assert_eq!(settings.debounce(), Duration::from_millis(500));
        assert_eq!(settings.default_strategy, ConflictStrategy::Manual);
        assert_eq!(
            settings.backup_root(Path::new("/p")),
            PathBuf::from("/p/.docsync/backups")
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"workers": 8, "default_strategy": "latest-wins"}"#).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.workers, 8);
        assert_eq!(settings.default_strategy, ConflictStrategy::LatestWins);
        assert_eq!(settings.debounce_ms, DEFAULT_DEBOUNCE_MS);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::from_file(&path), Err(Error::Config(_))));

        std::fs::write(&path, r#"{"wokers": 2}"#).unwrap();
        assert!(matches!(Settings::from_file(&path), Err(Error::Config(_))));

        std::fs::write(&path, r#"{"docs_root": "a/b"}"#).unwrap();
        assert!(matches!(Settings::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_reads_project_file() {
        let temp = TempDir::new().unwrap();
        let settings = Settings {
            docs_root: "documentation".to_string(),
            ..Settings::default()
        };
        settings.write(&Settings::project_path(temp.path())).unwrap();

        let loaded = Settings::from_file(&Settings::project_path(temp.path())).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.contract().docs_root(), "documentation");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [("DOCSYNC_DEBOUNCE_MS", "50"), ("DOCSYNC_WORKERS", "2")]
            .into_iter()
            .collect();
        let settings = Settings::default()
            .with_overrides(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(settings.debounce_ms, 50);
        assert_eq!(settings.workers, 2);

        let bad = Settings::default().with_overrides(|k| {
            (k == "DOCSYNC_WORKERS").then(|| "many".to_string())
        });
        assert!(matches!(bad, Err(Error::Config(_))));

        let zero = Settings::default().with_overrides(|k| {
            (k == "DOCSYNC_WORKERS").then(|| "0".to_string())
        });
        assert!(matches!(zero, Err(Error::Config(_))));
    }
}
