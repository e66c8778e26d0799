//! Content hashing for change detection and migration checksums.
//!
//! Every stored content value carries a SHA-256 hex digest. Comparing digests
//! is how the detector decides whether two copies differ, and how the
//! migrator verifies that a file survived a move byte-for-byte.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Compute the SHA-256 hex digest of document content.
#[must_use]
pub fn content_hash(content: &str) -> String {
    bytes_hash(content.as_bytes())
}

/// Compute the SHA-256 hex digest of raw bytes.
#[must_use]
pub fn bytes_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Stream a file through SHA-256 without loading it into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn file_checksum(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check if content has changed relative to a stored hash.
///
/// Returns `true` when there is no stored hash or the hashes differ.
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.is_none_or(|h| h != current_hash)
}
