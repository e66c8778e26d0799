//! SQLite storage layer for docsync.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Full-text index maintenance inside the same transactions
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`schema`] - Database schema definitions
//! - [`search`] - FTS5 index maintenance and queries
//! - [`sqlite`] - The content store

pub mod events;
pub mod migrations;
pub mod schema;
pub mod search;
pub mod sqlite;

pub use search::{ReindexStats, SearchHit};
pub use sqlite::{DocumentStore, MutationContext, StatusCounts, SyncCommit};
