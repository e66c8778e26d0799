//! Conflict resolution strategies.
//!
//! A resolver only picks a winner. Applying the winning content to both
//! sides is the orchestrator's job.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// How to settle a `conflict` classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    DbWins,
    FileWins,
    /// Later of `content_updated_at` and file mtime; ties go to the database.
    LatestWins,
    /// Refuse and hand both versions back to the caller.
    #[default]
    Manual,
    /// Textual merge. Recognized so it can be refused explicitly.
    Merge,
}

impl ConflictStrategy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DbWins => "db-wins",
            Self::FileWins => "file-wins",
            Self::LatestWins => "latest-wins",
            Self::Manual => "manual",
            Self::Merge => "merge",
        }
    }

    /// Parse a strategy name (accepts `_` or `-`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "db-wins" | "db" | "database" => Ok(Self::DbWins),
            "file-wins" | "file" => Ok(Self::FileWins),
            "latest-wins" | "latest" | "newest" => Ok(Self::LatestWins),
            "manual" => Ok(Self::Manual),
            "merge" => Ok(Self::Merge),
            other => Err(Error::InvalidArgument(format!(
                "unknown conflict strategy '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which copy won a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Database,
    File,
}

/// The two versions in a conflict.
#[derive(Debug, Clone, Copy)]
pub struct ConflictCandidates<'a> {
    pub document_id: &'a str,
    pub db_content: Option<&'a str>,
    pub db_updated_at: Option<i64>,
    pub file_content: Option<&'a str>,
    pub file_modified_at: Option<i64>,
}

/// Picks a winner per strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    #[must_use]
    pub const fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    #[must_use]
    pub const fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Decide which side wins.
    ///
    /// # Errors
    ///
    /// `ManualResolutionRequired` (carrying both contents) under the manual
    /// strategy, `NotImplemented` for merge.
    pub fn resolve(&self, candidates: &ConflictCandidates<'_>) -> Result<Winner> {
        match self.strategy {
            ConflictStrategy::DbWins => Ok(Winner::Database),
            ConflictStrategy::FileWins => Ok(Winner::File),
            ConflictStrategy::LatestWins => {
                // An unknown timestamp never beats the database
                match (candidates.file_modified_at, candidates.db_updated_at) {
                    (Some(file), Some(db)) if file > db => Ok(Winner::File),
                    _ => Ok(Winner::Database),
                }
            }
            ConflictStrategy::Manual => Err(Error::ManualResolutionRequired {
                id: candidates.document_id.to_string(),
                db_content: candidates.db_content.unwrap_or_default().to_string(),
                file_content: candidates.file_content.unwrap_or_default().to_string(),
            }),
            ConflictStrategy::Merge => Err(Error::NotImplemented(
                "automatic content merging is not supported".to_string(),
            )),
        }
    }
}
