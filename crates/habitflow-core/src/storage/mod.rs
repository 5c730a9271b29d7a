//! Collaborator interfaces and their implementations.
//!
//! The engine reads habits from a [`HabitRegistry`], counts completions in a
//! [`CompletionLog`] and owns the records in a [`StreakStore`]. Habits are
//! created and deleted through a [`HabitCatalog`]. Two
//! implementations ship with the crate:
//!
//! - [`MemoryStore`]: process-local, for tests and embedding
//! - [`SqliteStore`]: durable, shared between processes through one file

mod config;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use config::{Config, EngineConfig, LoggingConfig, StorageConfig, SweepConfig};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::{ConfigError, StoreError};
use crate::habit::{CompletionRecord, Habit, HabitId, StreakState};

/// Source of habit definitions.
pub trait HabitRegistry: Send + Sync {
    fn habit(&self, id: HabitId) -> Result<Option<Habit>, StoreError>;

    fn habits(&self) -> Result<Vec<Habit>, StoreError>;

    fn habits_for_user(&self, user_id: &str) -> Result<Vec<Habit>, StoreError> {
        Ok(self
            .habits()?
            .into_iter()
            .filter(|h| h.user_id == user_id)
            .collect())
    }
}

/// A registry that can also be written, used when habits are created and
/// deleted through the engine.
pub trait HabitCatalog: HabitRegistry {
    /// Register or replace a habit.
    fn register(&self, habit: &Habit) -> Result<(), StoreError>;

    /// Remove a habit and its completions. Returns whether it existed.
    fn unregister(&self, id: HabitId) -> Result<bool, StoreError>;
}

/// Append-only log of completion events.
///
/// Range queries are inclusive at both ends.
pub trait CompletionLog: Send + Sync {
    /// Log a completion. Idempotent per `event_id`: returns `false` and
    /// writes nothing if the event is already logged.
    fn append(&self, record: &CompletionRecord) -> Result<bool, StoreError>;

    fn count_between(
        &self,
        habit_id: HabitId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Completions in range, oldest first.
    fn completions_between(
        &self,
        habit_id: HabitId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CompletionRecord>, StoreError>;

    /// The habit's latest completion, if any.
    fn latest(&self, habit_id: HabitId) -> Result<Option<CompletionRecord>, StoreError> {
        Ok(self
            .completions_between(habit_id, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)?
            .pop())
    }
}

/// Result of a conditional streak write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The stored record did not match the expected version (or, for
    /// `create`, already existed). Nothing was written.
    Stale,
}

/// Durable per-habit streak records.
///
/// Writes are conditional so that concurrent writers never interleave: a
/// writer reads a record, derives the next one and stores it only if the
/// stored version is still the one it read.
pub trait StreakStore: Send + Sync {
    fn load(&self, habit_id: HabitId) -> Result<Option<StreakState>, StoreError>;

    /// Insert a record for a habit that has none.
    fn create(&self, state: &StreakState) -> Result<WriteOutcome, StoreError>;

    /// Replace the record if its stored version equals `expected_version`.
    fn compare_and_swap(
        &self,
        expected_version: u64,
        next: &StreakState,
    ) -> Result<WriteOutcome, StoreError>;

    /// Records with `next_due_at < now` and a streak above zero.
    fn expired(&self, now: DateTime<Utc>) -> Result<Vec<StreakState>, StoreError>;

    fn all(&self) -> Result<Vec<StreakState>, StoreError>;

    /// Remove the record when its habit is deleted. Returns whether a record
    /// existed.
    fn delete(&self, habit_id: HabitId) -> Result<bool, StoreError>;
}

/// Returns `~/.config/habitflow[-dev]/` based on HABITFLOW_ENV.
///
/// Set HABITFLOW_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("HABITFLOW_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("habitflow-dev")
    } else {
        base_dir.join("habitflow")
    };

    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::DataDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}
