//! SQLite-backed registry, completion log and streak store.
//!
//! One database file holds all three tables so that several processes (the
//! CLI and a sweep daemon, say) share state. Streak writes are guarded by the
//! `version` column: an update only lands if the row still carries the
//! version the writer read.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{
    data_dir, migrations, CompletionLog, Config, HabitCatalog, HabitRegistry, StreakStore,
    WriteOutcome,
};
use crate::error::{CoreError, StoreError};
use crate::habit::{CompletionRecord, Habit, HabitId, StreakState};
use crate::policy::RecurrencePolicy;

/// Upper bound on how long a statement waits for another writer.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const STREAK_COLUMNS: &str = "habit_id, current_streak, best_streak, last_completed_at, \
                              next_due_at, completion_rate, version";

const COMPLETION_COLUMNS: &str =
    "event_id, habit_id, completed_at, notes, duration_minutes, mood_rating, difficulty_rating";

/// SQLite database for habits, completions and streaks.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply migrations.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open the database configured in `config` inside the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be prepared.
    pub fn open_default(config: &Config) -> Result<Self, CoreError> {
        let path = data_dir()?.join(&config.storage.database_file);
        Ok(Self::open(path)?)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Register or replace a habit.
    pub fn insert_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        let policy = serde_json::to_string(&habit.policy)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.conn.lock()?.execute(
            "INSERT OR REPLACE INTO habits (id, user_id, policy, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                habit.id.to_string(),
                habit.user_id,
                policy,
                habit.created_at.timestamp_micros(),
            ],
        )?;
        Ok(())
    }

    /// Remove a habit and its completions. The streak record is removed
    /// separately through [`StreakStore::delete`].
    pub fn remove_habit(&self, id: HabitId) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM completions WHERE habit_id = ?1", [id.to_string()])?;
        let removed = tx.execute("DELETE FROM habits WHERE id = ?1", [id.to_string()])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn query_habits(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Habit>, StoreError> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut habits = Vec::new();
        for row in rows {
            let (id, user_id, policy, created_at) = row?;
            habits.push(Habit {
                id: parse_id(&id)?,
                user_id,
                policy: parse_policy(&policy)?,
                created_at: from_micros(created_at)?,
            });
        }
        Ok(habits)
    }

    fn query_streaks(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<StreakState>, StoreError> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, StreakRow::read)?;
        let mut streaks = Vec::new();
        for row in rows {
            streaks.push(row?.into_state()?);
        }
        Ok(streaks)
    }
}

impl HabitRegistry for SqliteStore {
    fn habit(&self, id: HabitId) -> Result<Option<Habit>, StoreError> {
        let mut habits = self.query_habits(
            "SELECT id, user_id, policy, created_at FROM habits WHERE id = ?1",
            &[&id.to_string()],
        )?;
        Ok(habits.pop())
    }

    fn habits(&self) -> Result<Vec<Habit>, StoreError> {
        self.query_habits(
            "SELECT id, user_id, policy, created_at FROM habits ORDER BY created_at",
            &[],
        )
    }

    fn habits_for_user(&self, user_id: &str) -> Result<Vec<Habit>, StoreError> {
        self.query_habits(
            "SELECT id, user_id, policy, created_at FROM habits
             WHERE user_id = ?1 ORDER BY created_at",
            &[&user_id],
        )
    }
}

impl HabitCatalog for SqliteStore {
    fn register(&self, habit: &Habit) -> Result<(), StoreError> {
        self.insert_habit(habit)
    }

    fn unregister(&self, id: HabitId) -> Result<bool, StoreError> {
        self.remove_habit(id)
    }
}

impl CompletionLog for SqliteStore {
    fn append(&self, record: &CompletionRecord) -> Result<bool, StoreError> {
        let changed = self.conn.lock()?.execute(
            &format!(
                "INSERT OR IGNORE INTO completions ({COMPLETION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                record.event_id.to_string(),
                record.habit_id.to_string(),
                record.completed_at.timestamp_micros(),
                record.notes,
                record.duration_minutes,
                record.mood_rating,
                record.difficulty_rating,
            ],
        )?;
        Ok(changed == 1)
    }

    fn count_between(
        &self,
        habit_id: HabitId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count: i64 = self.conn.lock()?.query_row(
            "SELECT COUNT(*) FROM completions
             WHERE habit_id = ?1 AND completed_at BETWEEN ?2 AND ?3",
            params![
                habit_id.to_string(),
                start.timestamp_micros(),
                end.timestamp_micros()
            ],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn completions_between(
        &self,
        habit_id: HabitId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CompletionRecord>, StoreError> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM completions
             WHERE habit_id = ?1 AND completed_at BETWEEN ?2 AND ?3
             ORDER BY completed_at, id"
        ))?;
        let rows = stmt.query_map(
            params![
                habit_id.to_string(),
                start.timestamp_micros(),
                end.timestamp_micros()
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<u32>>(4)?,
                    row.get::<_, Option<u8>>(5)?,
                    row.get::<_, Option<u8>>(6)?,
                ))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (event_id, id, completed_at, notes, duration_minutes, mood_rating, difficulty_rating) =
                row?;
            records.push(CompletionRecord {
                event_id: Uuid::parse_str(&event_id)
                    .map_err(|_| StoreError::Corrupt(format!("event id '{event_id}'")))?,
                habit_id: parse_id(&id)?,
                completed_at: from_micros(completed_at)?,
                notes,
                duration_minutes,
                mood_rating,
                difficulty_rating,
            });
        }
        Ok(records)
    }
}

impl StreakStore for SqliteStore {
    fn load(&self, habit_id: HabitId) -> Result<Option<StreakState>, StoreError> {
        let conn = self.conn.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {STREAK_COLUMNS} FROM streaks WHERE habit_id = ?1"),
                [habit_id.to_string()],
                StreakRow::read,
            )
            .optional()?;
        row.map(StreakRow::into_state).transpose()
    }

    fn create(&self, state: &StreakState) -> Result<WriteOutcome, StoreError> {
        let changed = self.conn.lock()?.execute(
            &format!(
                "INSERT OR IGNORE INTO streaks ({STREAK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                state.habit_id.to_string(),
                state.current_streak,
                state.best_streak,
                state.last_completed_at.map(|t| t.timestamp_micros()),
                state.next_due_at.map(|t| t.timestamp_micros()),
                state.completion_rate,
                version_to_sql(state.version)?,
            ],
        )?;
        Ok(outcome(changed))
    }

    fn compare_and_swap(
        &self,
        expected_version: u64,
        next: &StreakState,
    ) -> Result<WriteOutcome, StoreError> {
        let changed = self.conn.lock()?.execute(
            "UPDATE streaks
             SET current_streak = ?2, best_streak = ?3, last_completed_at = ?4,
                 next_due_at = ?5, completion_rate = ?6, version = ?7
             WHERE habit_id = ?1 AND version = ?8",
            params![
                next.habit_id.to_string(),
                next.current_streak,
                next.best_streak,
                next.last_completed_at.map(|t| t.timestamp_micros()),
                next.next_due_at.map(|t| t.timestamp_micros()),
                next.completion_rate,
                version_to_sql(next.version)?,
                version_to_sql(expected_version)?,
            ],
        )?;
        Ok(outcome(changed))
    }

    fn expired(&self, now: DateTime<Utc>) -> Result<Vec<StreakState>, StoreError> {
        self.query_streaks(
            &format!(
                "SELECT {STREAK_COLUMNS} FROM streaks
                 WHERE next_due_at IS NOT NULL AND next_due_at < ?1 AND current_streak > 0"
            ),
            &[&now.timestamp_micros()],
        )
    }

    fn all(&self) -> Result<Vec<StreakState>, StoreError> {
        self.query_streaks(&format!("SELECT {STREAK_COLUMNS} FROM streaks"), &[])
    }

    fn delete(&self, habit_id: HabitId) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .lock()?
            .execute("DELETE FROM streaks WHERE habit_id = ?1", [habit_id.to_string()])?;
        Ok(removed > 0)
    }
}

struct StreakRow {
    habit_id: String,
    current_streak: i64,
    best_streak: i64,
    last_completed_at: Option<i64>,
    next_due_at: Option<i64>,
    completion_rate: f64,
    version: i64,
}

impl StreakRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            habit_id: row.get(0)?,
            current_streak: row.get(1)?,
            best_streak: row.get(2)?,
            last_completed_at: row.get(3)?,
            next_due_at: row.get(4)?,
            completion_rate: row.get(5)?,
            version: row.get(6)?,
        })
    }

    fn into_state(self) -> Result<StreakState, StoreError> {
        let count = |field: &str, value: i64| {
            u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} = {value}")))
        };
        Ok(StreakState {
            habit_id: parse_id(&self.habit_id)?,
            current_streak: count("current_streak", self.current_streak)?,
            best_streak: count("best_streak", self.best_streak)?,
            last_completed_at: self.last_completed_at.map(from_micros).transpose()?,
            next_due_at: self.next_due_at.map(from_micros).transpose()?,
            completion_rate: self.completion_rate,
            version: u64::try_from(self.version)
                .map_err(|_| StoreError::Corrupt(format!("version = {}", self.version)))?,
        })
    }
}

fn outcome(changed: usize) -> WriteOutcome {
    if changed == 1 {
        WriteOutcome::Applied
    } else {
        WriteOutcome::Stale
    }
}

fn version_to_sql(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("version {version} out of range")))
}

fn parse_id(raw: &str) -> Result<HabitId, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("habit id '{raw}'")))
}

fn parse_policy(raw: &str) -> Result<RecurrencePolicy, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("policy '{raw}': {e}")))
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {micros}")))
}
