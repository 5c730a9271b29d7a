pub mod complete;
pub mod config;
pub mod daemon;
pub mod due;
pub mod habit;
pub mod stats;
pub mod streak;
pub mod sweep;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use habitflow_core::{Config, Engine, HabitId, SqliteStore};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Engine over the configured database.
pub fn open_engine() -> CliResult<(Engine<SqliteStore>, Config)> {
    let config = Config::load()?;
    let store = SqliteStore::open_default(&config)?;
    Ok((Engine::new(Arc::new(store), &config), config))
}

pub fn parse_id(id: &str) -> CliResult<HabitId> {
    id.parse::<HabitId>()
        .map_err(|e| format!("invalid habit id '{id}': {e}").into())
}

/// An RFC 3339 timestamp, or now when absent.
pub fn parse_time(at: Option<&str>) -> CliResult<DateTime<Utc>> {
    match at {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .map_err(|e| format!("invalid timestamp '{s}': {e}"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
