//! Persistence for structure migration runs.
//!
//! Each run gets a `migration_runs` row and one `migration_moves` row per
//! document it touched. Rollback reads the moves back in reverse order.

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::Category;

/// Lifecycle of one migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    RolledBack,
    /// Some moves could not be undone; rollback can be retried.
    RollbackIncomplete,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::RolledBack => "rolled_back",
            Self::RollbackIncomplete => "rollback_incomplete",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "completed_with_errors" => Some(Self::CompletedWithErrors),
            "rolled_back" => Some(Self::RolledBack),
            "rollback_incomplete" => Some(Self::RollbackIncomplete),
            _ => None,
        }
    }
}

/// Outcome of one recorded move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStatus {
    Migrated,
    Failed,
    RolledBack,
}

impl MoveStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Migrated => "migrated",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "migrated" => Some(Self::Migrated),
            "failed" => Some(Self::Failed),
            "rolled_back" => Some(Self::RolledBack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationRun {
    pub id: String,
    pub status: RunStatus,
    pub category_override: Option<Category>,
    pub backup_dir: Option<String>,
    pub planned: usize,
    pub migrated: usize,
    pub failed: usize,
    pub actor: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveRecord {
    pub id: i64,
    pub run_id: String,
    pub document_id: String,
    pub from_path: String,
    pub to_path: String,
    pub from_category: Category,
    pub to_category: Category,
    pub backup_path: Option<String>,
    pub checksum: Option<String>,
    pub status: MoveStatus,
    pub error: Option<String>,
    pub moved_at: i64,
}

/// Fields of a move about to be recorded.
#[derive(Debug, Clone)]
pub struct NewMove<'a> {
    pub run_id: &'a str,
    pub document_id: &'a str,
    pub from_path: &'a str,
    pub to_path: &'a str,
    pub from_category: Category,
    pub to_category: Category,
    pub backup_path: Option<&'a str>,
    pub checksum: Option<&'a str>,
    pub status: MoveStatus,
    pub error: Option<&'a str>,
}

pub fn insert_run(
    conn: &Connection,
    id: &str,
    category_override: Option<Category>,
    backup_dir: Option<&str>,
    planned: usize,
    actor: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO migration_runs (id, status, category_override, backup_dir, planned, actor, started_at)
         VALUES (?1, 'running', ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id,
            category_override.map(|c| c.as_str()),
            backup_dir,
            to_i64(planned),
            actor,
            chrono::Utc::now().timestamp_millis()
        ],
    )?;
    Ok(())
}

pub fn finish_run(
    conn: &Connection,
    id: &str,
    status: RunStatus,
    migrated: usize,
    failed: usize,
) -> Result<()> {
    conn.execute(
        "UPDATE migration_runs SET status = ?2, migrated = ?3, failed = ?4, finished_at = ?5
         WHERE id = ?1",
        rusqlite::params![
            id,
            status.as_str(),
            to_i64(migrated),
            to_i64(failed),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;
    Ok(())
}

pub fn insert_move(conn: &Connection, mv: &NewMove<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO migration_moves
            (run_id, document_id, from_path, to_path, from_category, to_category,
             backup_path, checksum, status, error, moved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            mv.run_id,
            mv.document_id,
            mv.from_path,
            mv.to_path,
            mv.from_category.as_str(),
            mv.to_category.as_str(),
            mv.backup_path,
            mv.checksum,
            mv.status.as_str(),
            mv.error,
            chrono::Utc::now().timestamp_millis()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_move_status(conn: &Connection, move_id: i64, status: MoveStatus) -> Result<()> {
    conn.execute(
        "UPDATE migration_moves SET status = ?2 WHERE id = ?1",
        rusqlite::params![move_id, status.as_str()],
    )?;
    Ok(())
}

/// Load a run.
///
/// # Errors
///
/// Returns `MigrationRunNotFound` if no run has this id.
pub fn get_run(conn: &Connection, id: &str) -> Result<MigrationRun> {
    conn.query_row(
        "SELECT id, status, category_override, backup_dir, planned, migrated, failed,
                actor, started_at, finished_at
         FROM migration_runs WHERE id = ?1",
        [id],
        map_run_row,
    )
    .optional()?
    .ok_or_else(|| Error::MigrationRunNotFound { id: id.to_string() })
}

/// Most recent runs first.
pub fn list_runs(conn: &Connection, limit: u32) -> Result<Vec<MigrationRun>> {
    let mut stmt = conn.prepare(
        "SELECT id, status, category_override, backup_dir, planned, migrated, failed,
                actor, started_at, finished_at
         FROM migration_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], map_run_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Moves of a run in the order they were made.
pub fn get_moves(conn: &Connection, run_id: &str) -> Result<Vec<MoveRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, run_id, document_id, from_path, to_path, from_category, to_category,
                backup_path, checksum, status, error, moved_at
         FROM migration_moves WHERE run_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([run_id], map_move_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn bad_value(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unrecognized value '{value}'").into(),
    )
}

fn map_run_row(row: &rusqlite::Row) -> rusqlite::Result<MigrationRun> {
    let status: String = row.get(1)?;
    let category_override: Option<String> = row.get(2)?;
    let planned: i64 = row.get(4)?;
    let migrated: i64 = row.get(5)?;
    let failed: i64 = row.get(6)?;

    Ok(MigrationRun {
        id: row.get(0)?,
        status: RunStatus::parse(&status).ok_or_else(|| bad_value(1, &status))?,
        category_override: match category_override {
            Some(c) => Some(Category::parse(&c).ok_or_else(|| bad_value(2, &c))?),
            None => None,
        },
        backup_dir: row.get(3)?,
        planned: usize::try_from(planned).unwrap_or(0),
        migrated: usize::try_from(migrated).unwrap_or(0),
        failed: usize::try_from(failed).unwrap_or(0),
        actor: row.get(7)?,
        started_at: row.get(8)?,
        finished_at: row.get(9)?,
    })
}

fn map_move_row(row: &rusqlite::Row) -> rusqlite::Result<MoveRecord> {
    let from_category: String = row.get(5)?;
    let to_category: String = row.get(6)?;
    let status: String = row.get(9)?;

    Ok(MoveRecord {
        id: row.get(0)?,
        run_id: row.get(1)?,
        document_id: row.get(2)?,
        from_path: row.get(3)?,
        to_path: row.get(4)?,
        from_category: Category::parse(&from_category)
            .ok_or_else(|| bad_value(5, &from_category))?,
        to_category: Category::parse(&to_category).ok_or_else(|| bad_value(6, &to_category))?,
        backup_path: row.get(7)?,
        checksum: row.get(8)?,
        status: MoveStatus::parse(&status).ok_or_else(|| bad_value(9, &status))?,
        error: row.get(10)?,
        moved_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_run_lifecycle() {
        let conn = conn();
        insert_run(&conn, "mig_1", Some(Category::Guides), Some("/b/mig_1"), 2, "alice").unwrap();

        let run = get_run(&conn, "mig_1").unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.category_override, Some(Category::Guides));
        assert_eq!(run.planned, 2);
        assert!(run.finished_at.is_none());

        finish_run(&conn, "mig_1", RunStatus::CompletedWithErrors, 1, 1).unwrap();
        let run = get_run(&conn, "mig_1").unwrap();
        assert_eq!(run.status, RunStatus::CompletedWithErrors);
        assert_eq!((run.migrated, run.failed), (1, 1));
        assert!(run.finished_at.is_some());

        assert_eq!(list_runs(&conn, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_run() {
        let conn = conn();
        assert!(matches!(
            get_run(&conn, "mig_nope"),
            Err(Error::MigrationRunNotFound { .. })
        ));
    }

    #[test]
    fn test_moves_in_order() {
        let conn = conn();
        insert_run(&conn, "mig_1", None, None, 2, "alice").unwrap();
        for (i, status) in [MoveStatus::Migrated, MoveStatus::Failed].into_iter().enumerate() {
            let from = format!("old/{i}.md");
            insert_move(
                &conn,
                &NewMove {
                    run_id: "mig_1",
                    document_id: "doc_1",
                    from_path: &from,
                    to_path: "docs/guides/tutorial/x.md",
                    from_category: Category::Guides,
                    to_category: Category::Guides,
                    backup_path: None,
                    checksum: Some("abc"),
                    status,
                    error: None,
                },
            )
            .unwrap();
        }

        let moves = get_moves(&conn, "mig_1").unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].from_path, "old/0.md");
        assert_eq!(moves[1].status, MoveStatus::Failed);

        set_move_status(&conn, moves[0].id, MoveStatus::RolledBack).unwrap();
        assert_eq!(get_moves(&conn, "mig_1").unwrap()[0].status, MoveStatus::RolledBack);
    }
}
