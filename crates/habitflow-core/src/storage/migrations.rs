//! Database schema migrations for habitflow.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.
//!
//! Timestamps are stored as INTEGER microseconds since the Unix epoch so that
//! range predicates compare numerically.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{debug, warn};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// v1: habits, completions and streaks.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    debug!("applying schema migration v1");
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS habits (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            policy      TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS completions (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            habit_id          TEXT NOT NULL,
            completed_at      INTEGER NOT NULL,
            notes             TEXT,
            duration_minutes  INTEGER,
            mood_rating       INTEGER,
            difficulty_rating INTEGER
        );

        CREATE TABLE IF NOT EXISTS streaks (
            habit_id          TEXT PRIMARY KEY,
            current_streak    INTEGER NOT NULL DEFAULT 0,
            best_streak       INTEGER NOT NULL DEFAULT 0,
            last_completed_at INTEGER,
            next_due_at       INTEGER,
            completion_rate   REAL NOT NULL DEFAULT 0,
            version           INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_habits_user_id ON habits(user_id);
        CREATE INDEX IF NOT EXISTS idx_completions_habit_time ON completions(habit_id, completed_at);",
    )?;
    set_schema_version(conn, 1)
}

/// v2: index backing the expiration sweep query.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    debug!("applying schema migration v2");
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_streaks_expiry ON streaks(next_due_at, current_streak);",
    )?;
    set_schema_version(conn, 2)
}

/// v3: event ids on completions, unique so that re-sent events are dropped.
///
/// Rows logged before v3 get a random v4 UUID.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    debug!("applying schema migration v3");
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "ALTER TABLE completions ADD COLUMN event_id TEXT;

        UPDATE completions SET event_id =
            lower(hex(randomblob(4))) || '-' || lower(hex(randomblob(2))) || '-4' ||
            substr(lower(hex(randomblob(2))), 2) || '-' ||
            substr('89ab', 1 + (abs(random()) % 4), 1) ||
            substr(lower(hex(randomblob(2))), 2) || '-' || lower(hex(randomblob(6)))
        WHERE event_id IS NULL;

        CREATE UNIQUE INDEX IF NOT EXISTS idx_completions_event ON completions(event_id);",
    )?;
    set_schema_version(&tx, 3)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_fresh_database_to_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn migration_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('habits', 'completions', 'streaks')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn v3_assigns_event_ids_to_existing_completions() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        migrate_v2(&conn).unwrap();
        conn.execute(
            "INSERT INTO completions (habit_id, completed_at) VALUES ('h', 1), ('h', 2)",
            [],
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 3);

        let ids: Vec<String> = conn
            .prepare("SELECT event_id FROM completions")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        for id in &ids {
            assert!(uuid::Uuid::parse_str(id).is_ok(), "{id}");
        }
    }
}
