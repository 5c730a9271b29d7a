//! Habit, completion and streak records.
//!
//! - [`Habit`] is owned by the habit registry; the engine only reads it.
//! - [`CompletionRecord`] is appended to the completion log and never
//!   mutated.
//! - [`StreakState`] is owned by the engine, one per habit, referenced by
//!   habit id only.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::policy::RecurrencePolicy;

/// Identifier of a habit in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(Uuid);

impl HabitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for HabitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for HabitId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A habit as supplied by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    /// Owning user, used only for per-user statistics
    pub user_id: String,
    pub policy: RecurrencePolicy,
    pub created_at: DateTime<Utc>,
}

impl Habit {
    pub fn new(user_id: impl Into<String>, policy: RecurrencePolicy, created_at: DateTime<Utc>) -> Self {
        Self {
            id: HabitId::new(),
            user_id: user_id.into(),
            policy,
            created_at,
        }
    }
}

/// One completion event in the completion log.
///
/// Mood and difficulty are carried through for analytics and play no part
/// in scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Identifies the event. The log keeps one entry per id, so a record
    /// can be resubmitted after a failure without being counted twice.
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,
    pub habit_id: HabitId,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// 1-5
    #[serde(default)]
    pub mood_rating: Option<u8>,
    /// 1-5
    #[serde(default)]
    pub difficulty_rating: Option<u8>,
}

impl CompletionRecord {
    pub fn new(habit_id: HabitId, completed_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            habit_id,
            completed_at,
            notes: None,
            duration_minutes: None,
            mood_rating: None,
            difficulty_rating: None,
        }
    }

    /// Use a caller-chosen event id, for clients that retry across
    /// processes.
    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn with_mood(mut self, rating: u8) -> Result<Self, ValidationError> {
        self.mood_rating = Some(check_rating("mood_rating", rating)?);
        Ok(self)
    }

    pub fn with_difficulty(mut self, rating: u8) -> Result<Self, ValidationError> {
        self.difficulty_rating = Some(check_rating("difficulty_rating", rating)?);
        Ok(self)
    }
}

fn check_rating(field: &'static str, value: u8) -> Result<u8, ValidationError> {
    if (1..=5).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::RatingOutOfRange { field, value })
    }
}

/// Per-habit streak record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakState {
    pub habit_id: HabitId,
    pub current_streak: u32,
    /// Never below `current_streak`
    pub best_streak: u32,
    pub last_completed_at: Option<DateTime<Utc>>,
    /// `None` only before the first due-date computation
    pub next_due_at: Option<DateTime<Utc>>,
    /// In [0, 1]
    pub completion_rate: f64,
    /// Bumped on every write; stores reject writes against a stale version.
    pub version: u64,
}

impl StreakState {
    /// The record written once at habit creation.
    pub fn initial(habit_id: HabitId, next_due_at: DateTime<Utc>) -> Self {
        Self {
            habit_id,
            current_streak: 0,
            best_streak: 0,
            last_completed_at: None,
            next_due_at: Some(next_due_at),
            completion_rate: 0.0,
            version: 0,
        }
    }

    /// Whether the expiration sweep should break this streak at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.current_streak > 0 && self.next_due_at.is_some_and(|due| due < now)
    }

    /// Copy of this state prepared as the next version.
    pub(crate) fn next_version(&self) -> Self {
        Self {
            version: self.version + 1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn habit_id_round_trips_through_string() {
        let id = HabitId::new();
        let parsed: HabitId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<HabitId>().is_err());
    }

    #[test]
    fn ratings_are_validated() {
        let record = CompletionRecord::new(HabitId::new(), Utc::now());
        assert!(record.clone().with_mood(5).is_ok());
        assert!(matches!(
            record.clone().with_mood(0),
            Err(ValidationError::RatingOutOfRange { field: "mood_rating", value: 0 })
        ));
        assert!(record.with_difficulty(6).is_err());
    }

    #[test]
    fn completions_get_distinct_event_ids() {
        let id = HabitId::new();
        let at = Utc::now();
        let a = CompletionRecord::new(id, at);
        let b = CompletionRecord::new(id, at);
        assert_ne!(a.event_id, b.event_id);

        let event = Uuid::new_v4();
        assert_eq!(a.with_event_id(event).event_id, event);

        let legacy: CompletionRecord = serde_json::from_str(&format!(
            r#"{{"habit_id":"{id}","completed_at":"2024-03-02T09:00:00Z"}}"#
        ))
        .unwrap();
        assert_eq!(legacy.habit_id, id);
        assert!(!legacy.event_id.is_nil());
    }

    #[test]
    fn initial_state_is_zeroed() {
        let due = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        let state = StreakState::initial(HabitId::new(), due);
        assert_eq!(state.current_streak, 0);
        assert_eq!(state.best_streak, 0);
        assert_eq!(state.completion_rate, 0.0);
        assert_eq!(state.next_due_at, Some(due));
        assert!(state.last_completed_at.is_none());
    }

    #[test]
    fn expiry_requires_active_streak_and_lapsed_due_date() {
        let due = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        let mut state = StreakState::initial(HabitId::new(), due);
        assert!(!state.is_expired(due + Duration::hours(1)));

        state.current_streak = 3;
        assert!(!state.is_expired(due));
        assert!(state.is_expired(due + Duration::seconds(1)));

        state.next_due_at = None;
        assert!(!state.is_expired(due + Duration::days(30)));
    }
}
