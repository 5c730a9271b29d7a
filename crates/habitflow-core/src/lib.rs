//! # Habitflow Core Library
//!
//! Scheduling and streak bookkeeping for recurring habits. Given a habit's
//! recurrence policy and its completion history, the engine decides when the
//! habit is next due, whether a completion keeps the streak alive, and
//! breaks streaks whose due date passed without a completion.
//!
//! ## Architecture
//!
//! - **Schedule**: pure calendar arithmetic over recurrence policies
//! - **Tracker**: applies completion events to per-habit streak records
//! - **Sweep**: background reset of expired streaks
//! - **Storage**: collaborator traits with in-memory and SQLite
//!   implementations, plus TOML configuration
//!
//! Tracker and sweeper both write streak records. Writes for one habit are
//! serialized by a per-habit lock and a versioned compare-and-swap, so
//! neither can overwrite the other's update.
//!
//! ## Key Components
//!
//! - [`StreakTracker`]: completion handling
//! - [`StreakSweeper`]: expiration sweep
//! - [`Engine`]: both of the above over one store
//! - [`RecurrencePolicy`]: the schedule of a habit
//! - [`Config`]: application configuration management

pub mod clock;
pub mod engine;
pub mod error;
pub mod habit;
pub mod locks;
pub mod policy;
pub mod schedule;
pub mod stats;
pub mod storage;
pub mod sweep;
pub mod tracker;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::Engine;
pub use error::{ConfigError, CoreError, StoreError, ValidationError};
pub use habit::{CompletionRecord, Habit, HabitId, StreakState};
pub use policy::RecurrencePolicy;
pub use schedule::Period;
pub use stats::{CompletionTrends, HabitReport, StreakStatistics, TimeOfDayAnalysis};
pub use storage::{
    CompletionLog, Config, HabitCatalog, HabitRegistry, MemoryStore, SqliteStore, StreakStore,
    WriteOutcome,
};
pub use sweep::{StreakSweeper, SweepHandle, SweepReport};
pub use tracker::StreakTracker;
