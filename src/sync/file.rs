//! File operations for sync.
//!
//! Safe file primitives that prevent partial writes reaching readers:
//! - Atomic writes: write to a temp file beside the target, fsync, then rename
//! - Observation: read a document file with its hash and modification time
//! - Durable copies for structure migration and backups

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::sync::hash::content_hash;

/// Suffix of in-flight temp files. The watcher ignores paths ending in it.
pub const TEMP_SUFFIX: &str = ".docsync-tmp";

/// What was found on disk at a document's path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileObservation {
    Absent,
    Present {
        content: String,
        hash: String,
        /// Modification time (Unix milliseconds), if the platform reports one
        modified_at: Option<i64>,
    },
}

impl FileObservation {
    #[must_use]
    pub const fn exists(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Present { content, .. } => Some(content),
            Self::Absent => None,
        }
    }

    #[must_use]
    pub const fn modified_at(&self) -> Option<i64> {
        match self {
            Self::Present { modified_at, .. } => *modified_at,
            Self::Absent => None,
        }
    }
}

/// Temp file used while atomically replacing `path`.
#[must_use]
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "document".into(), |n| n.to_string_lossy());
    path.with_file_name(format!(".{name}{TEMP_SUFFIX}"))
}

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file in the same directory
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let temp_path = temp_path_for(path);

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let written = (|| {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        // Sync to disk before rename
        writer.get_ref().sync_all()
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, path)
}

/// Read a document file, or report it absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or is not UTF-8.
pub fn observe(path: &Path) -> io::Result<FileObservation> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileObservation::Absent),
        Err(e) => return Err(e),
    };

    Ok(FileObservation::Present {
        hash: content_hash(&content),
        modified_at: modified_millis(path),
        content,
    })
}

/// A file's modification time in Unix milliseconds, if the platform has one.
#[must_use]
pub fn modified_millis(path: &Path) -> Option<i64> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(system_time_millis)
}

/// Convert a `SystemTime` to Unix milliseconds.
#[must_use]
pub fn system_time_millis(time: SystemTime) -> i64 {
    chrono::DateTime::<chrono::Utc>::from(time).timestamp_millis()
}

/// Remove a file, treating "already gone" as success.
///
/// Returns whether a file was removed.
///
/// # Errors
///
/// Returns an error for anything other than `NotFound`.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Copy a file, creating parent directories and syncing the destination.
///
/// # Errors
///
/// Returns an error if the copy or sync fails.
pub fn copy_durable(source: &Path, destination: &Path) -> io::Result<u64> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = fs::copy(source, destination)?;
    File::open(destination)?.sync_all()?;
    Ok(bytes)
}

/// Get the size of a file in bytes.
///
/// Returns 0 if the file doesn't exist.
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Generate .gitignore content for the .docsync directory.
///
/// Whitelist pattern: ignore everything by default, keep the config.
#[must_use]
pub fn gitignore_content() -> &'static str {
    r"# docsync data directory
# The database, backups and temp files stay local

*

!.gitignore
!config.json
"
}

/// Ensure .gitignore exists in the data directory.
///
/// An existing file is left untouched (user may have customized it).
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn ensure_gitignore(data_dir: &Path) -> io::Result<()> {
    let gitignore_path = data_dir.join(".gitignore");

    if gitignore_path.exists() {
        return Ok(());
    }

    fs::create_dir_all(data_dir)?;

    let mut file = File::create(&gitignore_path)?;
    file.write_all(gitignore_content().as_bytes())?;
    file.sync_all()?;

    Ok(())
}
