//! Audit event storage and retrieval.
//!
//! Every mutation of a document or migration run leaves an event behind.

use rusqlite::{Connection, Result};
use serde::Serialize;

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Document lifecycle
    DocumentCreated,
    LegacyImported,
    ContentUpdated,
    MetadataUpdated,
    DocumentDeleted,

    // Sync
    DocumentSynced,
    ConflictResolved,
    StrayFileRemoved,

    // Structure migration
    PathMigrated,
    PathRestored,
    MigrationStarted,
    MigrationFinished,
    MigrationRolledBack,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentCreated => "document_created",
            Self::LegacyImported => "legacy_imported",
            Self::ContentUpdated => "content_updated",
            Self::MetadataUpdated => "metadata_updated",
            Self::DocumentDeleted => "document_deleted",
            Self::DocumentSynced => "document_synced",
            Self::ConflictResolved => "conflict_resolved",
            Self::StrayFileRemoved => "stray_file_removed",
            Self::PathMigrated => "path_migrated",
            Self::PathRestored => "path_restored",
            Self::MigrationStarted => "migration_started",
            Self::MigrationFinished => "migration_finished",
            Self::MigrationRolledBack => "migration_rolled_back",
        }
    }
}

/// An audit event record.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// Add a comment to the event.
    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for an entity, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY created_at DESC, id DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], |row| {
        Ok(Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            event_type: parse_event_type(row.get::<_, String>(3)?.as_str()),
            actor: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            comment: row.get(7)?,
            created_at: row.get(8)?,
        })
    })?;

    rows.collect()
}

fn parse_event_type(s: &str) -> EventType {
    match s {
        "document_created" => EventType::DocumentCreated,
        "legacy_imported" => EventType::LegacyImported,
        "content_updated" => EventType::ContentUpdated,
        "document_deleted" => EventType::DocumentDeleted,
        "document_synced" => EventType::DocumentSynced,
        "conflict_resolved" => EventType::ConflictResolved,
        "stray_file_removed" => EventType::StrayFileRemoved,
        "path_migrated" => EventType::PathMigrated,
        "path_restored" => EventType::PathRestored,
        "migration_started" => EventType::MigrationStarted,
        "migration_finished" => EventType::MigrationFinished,
        "migration_rolled_back" => EventType::MigrationRolledBack,
        _ => EventType::MetadataUpdated, // Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_event_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new("document", "doc_123", EventType::DocumentCreated, "test-actor")
            .with_comment("registered");

        let id = insert_event(&conn, &event).unwrap();
        assert!(id > 0);

        let events = get_events(&conn, "document", "doc_123", Some(10)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "test-actor");
        assert_eq!(events[0].event_type, EventType::DocumentCreated);
        assert_eq!(events[0].comment, Some("registered".to_string()));
    }

    #[test]
    fn test_event_types_round_trip() {
        for t in [
            EventType::ContentUpdated,
            EventType::ConflictResolved,
            EventType::PathMigrated,
            EventType::MigrationRolledBack,
        ] {
            assert_eq!(parse_event_type(t.as_str()), t);
        }
    }
}
