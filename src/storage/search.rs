//! Full-text index maintenance and search.
//!
//! The `document_search` FTS5 table mirrors filename, title, content,
//! category and document type for every tracked document. Entries are
//! rewritten inside the same transaction as the primary write, each under
//! its own savepoint. An index write that fails is rolled back to the
//! savepoint and queued in `search_index_pending`; the primary write still
//! commits. Queued entries are retried by [`DocumentStore::reindex_pending`].

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::sqlite::{DocumentStore, MutationContext};

const SAVEPOINT: &str = "search_index";

/// A ranked full-text match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub file_path: String,
    pub title: String,
    pub category: String,
    pub document_type: String,
    /// Content excerpt with matches wrapped in `[` `]`.
    pub snippet: String,
    /// Higher is better.
    pub score: f64,
}

/// Outcome of retrying queued index writes.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReindexStats {
    pub reindexed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexOp {
    Upsert,
    Delete,
}

impl IndexOp {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "delete" {
            Self::Delete
        } else {
            Self::Upsert
        }
    }
}

/// Apply the index changes a mutation recorded.
///
/// Called by `DocumentStore::mutate` before commit.
///
/// # Errors
///
/// Returns an error only if a savepoint cannot be opened or closed; failed
/// index writes are queued instead.
pub(crate) fn apply_index_changes(conn: &Connection, ctx: &MutationContext) -> Result<()> {
    let upserts = ctx.reindex.iter().map(|id| (id, IndexOp::Upsert));
    let deletes = ctx.unindex.iter().map(|id| (id, IndexOp::Delete));

    for (id, op) in upserts.chain(deletes) {
        conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))?;
        match run_op(conn, id, op) {
            Ok(()) => {
                conn.execute_batch(&format!("RELEASE {SAVEPOINT}"))?;
                clear_pending(conn, id);
            }
            Err(e) => {
                conn.execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"))?;
                warn!(
                    document_id = %id,
                    op = %ctx.op_name,
                    error = %e,
                    "Search index update failed, queued for retry"
                );
                if let Err(queue_err) = enqueue(conn, id, op, &e.to_string()) {
                    warn!(document_id = %id, error = %queue_err, "Could not queue index retry");
                }
            }
        }
    }

    Ok(())
}

fn run_op(conn: &Connection, id: &str, op: IndexOp) -> rusqlite::Result<()> {
    match op {
        IndexOp::Upsert => upsert_entry(conn, id),
        IndexOp::Delete => delete_entry(conn, id),
    }
}

/// Rewrite the index entry for one document from its current row.
fn upsert_entry(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    delete_entry(conn, id)?;
    conn.execute(
        "INSERT INTO document_search (document_id, filename, title, content, category, document_type)
         SELECT id, filename, title, COALESCE(content, ''), category, document_type
         FROM documents WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

fn delete_entry(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM document_search WHERE document_id = ?1", [id])?;
    Ok(())
}

fn enqueue(conn: &Connection, id: &str, op: IndexOp, error: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO search_index_pending (document_id, operation, last_error, attempts, queued_at)
         VALUES (?1, ?2, ?3, 1, ?4)
         ON CONFLICT(document_id) DO UPDATE SET
            operation = excluded.operation,
            last_error = excluded.last_error,
            attempts = attempts + 1",
        rusqlite::params![id, op.as_str(), error, chrono::Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

fn clear_pending(conn: &Connection, id: &str) {
    if let Err(e) = conn.execute("DELETE FROM search_index_pending WHERE document_id = ?1", [id]) {
        debug!(document_id = %id, error = %e, "Could not clear pending index entry");
    }
}

/// Turn free text into an FTS5 query of quoted terms (implicit AND).
///
/// Quoting keeps FTS5 operators in user input from being interpreted.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

impl DocumentStore {
    /// Ranked full-text search over tracked documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(expr) = match_expression(query) else {
            return Ok(Vec::new());
        };

        self.read_with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT document_search.document_id, d.file_path, d.title, d.category, d.document_type,
                        snippet(document_search, 3, '[', ']', '...', 16),
                        bm25(document_search)
                 FROM document_search
                 JOIN documents d ON d.id = document_search.document_id
                 WHERE document_search MATCH ?1
                 ORDER BY bm25(document_search)
                 LIMIT ?2",
            )?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = stmt.query_map(rusqlite::params![expr, limit], |row| {
                Ok(SearchHit {
                    document_id: row.get(0)?,
                    file_path: row.get(1)?,
                    title: row.get(2)?,
                    category: row.get(3)?,
                    document_type: row.get(4)?,
                    snippet: row.get(5)?,
                    score: -row.get::<_, f64>(6)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Number of index writes waiting for retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pending_index_count(&self) -> Result<usize> {
        self.read_with(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM search_index_pending", [], |row| {
                    row.get(0)
                })?;
            Ok(usize::try_from(n).unwrap_or(0))
        })
    }

    /// Retry queued index writes.
    ///
    /// Entries whose document has since been deleted are turned into
    /// removals. Entries that fail again stay queued with a bumped attempt
    /// count.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending queue cannot be read.
    pub fn reindex_pending(&self) -> Result<ReindexStats> {
        self.mutate("reindex_pending", |tx, _ctx| {
            let pending: Vec<(String, String)> = tx
                .prepare("SELECT document_id, operation FROM search_index_pending ORDER BY queued_at")?
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<_>>()?;

            let mut stats = ReindexStats::default();
            for (id, op) in pending {
                let exists = tx
                    .query_row("SELECT 1 FROM documents WHERE id = ?1", [&id], |_| Ok(()))
                    .optional()?
                    .is_some();
                let op = match IndexOp::parse(&op) {
                    IndexOp::Upsert if exists => IndexOp::Upsert,
                    _ => IndexOp::Delete,
                };

                tx.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))?;
                match run_op(tx, &id, op) {
                    Ok(()) => {
                        tx.execute_batch(&format!("RELEASE {SAVEPOINT}"))?;
                        tx.execute("DELETE FROM search_index_pending WHERE document_id = ?1", [&id])?;
                        stats.reindexed += 1;
                    }
                    Err(e) => {
                        tx.execute_batch(&format!(
                            "ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"
                        ))?;
                        warn!(document_id = %id, error = %e, "Index retry failed");
                        tx.execute(
                            "UPDATE search_index_pending
                             SET attempts = attempts + 1, last_error = ?2
                             WHERE document_id = ?1",
                            rusqlite::params![id, e.to_string()],
                        )?;
                        stats.failed += 1;
                    }
                }
            }
            Ok(stats)
        })
    }

    /// Drop and rebuild every index entry from the documents table.
    ///
    /// Returns the number of documents indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild fails; the previous index is kept.
    pub fn rebuild_search_index(&self) -> Result<usize> {
        self.mutate("rebuild_search_index", |tx, _ctx| {
            tx.execute("DELETE FROM document_search", [])?;
            let n = tx.execute(
                "INSERT INTO document_search (document_id, filename, title, content, category, document_type)
                 SELECT id, filename, title, COALESCE(content, ''), category, document_type
                 FROM documents",
                [],
            )?;
            tx.execute("DELETE FROM search_index_pending", [])?;
            Ok(n)
        })
    }
}
