//! Core error types for habitflow-core.
//!
//! Errors are split by layer: `StoreError` for the persistence collaborators,
//! `ConfigError` for the TOML configuration, `ValidationError` for records
//! rejected at construction, and `CoreError` for everything the engine
//! surfaces to its callers.

use std::path::PathBuf;
use thiserror::Error;

use crate::habit::HabitId;

/// Core error type for habitflow-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A habit or streak record the caller asked about does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: HabitId },

    /// Streak initialization for a habit that already has a streak record
    #[error("Streak already initialized for habit {0}")]
    AlreadyExists(HabitId),

    /// Optimistic-lock retries exhausted; the caller may retry the event
    #[error("Concurrent update conflict on habit {habit_id} after {attempts} attempts")]
    Conflict { habit_id: HabitId, attempts: u32 },

    /// Storage-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub(crate) fn habit_not_found(id: HabitId) -> Self {
        CoreError::NotFound { entity: "Habit", id }
    }

    pub(crate) fn streak_not_found(id: HabitId) -> Self {
        CoreError::NotFound { entity: "Streak", id }
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Conflict { .. } | CoreError::Store(StoreError::Locked)
        )
    }
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored row could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A thread panicked while holding the store lock
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be created
    #[error("Cannot prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Rating outside the 1-5 scale
    #[error("{field} must be between 1 and 5, got {value}")]
    RatingOutOfRange { field: &'static str, value: u8 },

    /// Look-back window that is negative, too long, or reaches past the
    /// representable date range
    #[error("window of {days} days is out of range")]
    WindowOutOfRange { days: i64 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg)
                if code.code == rusqlite::ErrorCode::DatabaseBusy
                    || code.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Locked
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_transient() {
        let err = CoreError::Conflict {
            habit_id: HabitId::new(),
            attempts: 5,
        };
        assert!(err.is_transient());
        assert!(CoreError::Store(StoreError::Locked).is_transient());
        assert!(!CoreError::habit_not_found(HabitId::new()).is_transient());
    }

    #[test]
    fn not_found_message_names_entity() {
        let id = HabitId::new();
        let msg = CoreError::streak_not_found(id).to_string();
        assert!(msg.starts_with("Streak not found"));
        assert!(msg.contains(&id.to_string()));
    }
}
