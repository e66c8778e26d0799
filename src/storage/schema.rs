//! Database schema definitions.
//!
//! This module contains the base SQLite schema for docsync. Incremental
//! changes live in `migrations/` and are applied by [`super::migrations`].

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The base SQL schema for the docsync database.
///
/// Note: Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Core Tables
-- ====================

-- Documents: authoritative content plus sync bookkeeping
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    file_path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    document_type TEXT NOT NULL,
    category TEXT NOT NULL,
    content TEXT,
    content_hash TEXT,
    storage_mode TEXT NOT NULL DEFAULT 'hybrid',
    sync_status TEXT NOT NULL DEFAULT 'synced',
    content_updated_at INTEGER,
    last_synced_at INTEGER,
    content_size_bytes INTEGER NOT NULL DEFAULT 0,
    format TEXT NOT NULL DEFAULT 'markdown',
    title TEXT NOT NULL,
    description TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK (entity_type IN ('project', 'work_item', 'task', 'idea')),
    CHECK (storage_mode IN ('hybrid', 'database_only', 'file_only')),
    CHECK (sync_status IN ('synced', 'db_newer', 'file_newer', 'conflict', 'missing_file', 'missing_db')),
    CHECK (storage_mode != 'file_only' OR content IS NULL),
    CHECK ((content IS NULL) = (content_hash IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category);
CREATE INDEX IF NOT EXISTS idx_documents_mode ON documents(storage_mode);

-- ====================
-- Full-Text Search
-- ====================

CREATE VIRTUAL TABLE IF NOT EXISTS document_search USING fts5(
    document_id UNINDEXED,
    filename,
    title,
    content,
    category,
    document_type,
    tokenize = 'porter unicode61'
);

-- Index writes that failed and must be retried
CREATE TABLE IF NOT EXISTS search_index_pending (
    document_id TEXT PRIMARY KEY,
    operation TEXT NOT NULL,
    last_error TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    queued_at INTEGER NOT NULL,
    CHECK (operation IN ('upsert', 'delete'))
);

-- ====================
-- Audit
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at DESC);
"#;

/// Apply the schema to the database.
///
/// This uses `execute_batch` to run the entire DDL script.
/// It is idempotent because all statements use `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    // Run migrations for existing databases
    super::migrations::run_migrations(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables = table_names(&conn);
        for expected in [
            "documents",
            "document_search",
            "search_index_pending",
            "events",
            "migration_runs",
            "migration_moves",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");
    }

    #[test]
    fn test_file_only_rows_cannot_hold_content() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO documents (id, entity_type, entity_id, file_path, filename, document_type,
                                    category, content, content_hash, storage_mode, title, created_at, updated_at)
             VALUES ('doc_1', 'project', 1, 'a.bin', 'a.bin', 'reference_doc', 'reference',
                     'x', 'h', 'file_only', 'a', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_hash_required_with_content() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO documents (id, entity_type, entity_id, file_path, filename, document_type,
                                    category, content, title, created_at, updated_at)
             VALUES ('doc_1', 'project', 1, 'README.md', 'README.md', 'reference_doc', 'reference',
                     'text without hash', 'a', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
