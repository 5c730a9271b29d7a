//! Streak tracker.
//!
//! The only component that applies completions to streak state. Each
//! update is a read-modify-write of one habit's [`StreakState`] that runs
//! under the habit's lock slot and lands through a versioned
//! compare-and-swap, so concurrent completions for the same habit apply one
//! after the other and none is lost.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result};
use crate::habit::{CompletionRecord, Habit, HabitId, StreakState};
use crate::locks::{acquire, HabitLocks};
use crate::schedule::{self, Period};
use crate::stats::completion_rate;
use crate::storage::{CompletionLog, HabitRegistry, StreakStore, WriteOutcome};

/// Default number of write attempts before a conflict is reported.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

pub struct StreakTracker {
    registry: Arc<dyn HabitRegistry>,
    log: Arc<dyn CompletionLog>,
    streaks: Arc<dyn StreakStore>,
    locks: Arc<HabitLocks>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl StreakTracker {
    pub fn new(
        registry: Arc<dyn HabitRegistry>,
        log: Arc<dyn CompletionLog>,
        streaks: Arc<dyn StreakStore>,
    ) -> Self {
        Self {
            registry,
            log,
            streaks,
            locks: Arc::new(HabitLocks::new()),
            clock: Arc::new(SystemClock),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share lock slots with another writer, normally the sweeper.
    pub fn with_locks(mut self, locks: Arc<HabitLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn locks(&self) -> &Arc<HabitLocks> {
        &self.locks
    }

    /// Write the initial streak record for a newly created habit.
    ///
    /// # Errors
    /// `AlreadyExists` if the habit already has a record.
    pub fn initialize(&self, habit: &Habit) -> Result<StreakState> {
        let next_due = self.next_due(habit, habit.created_at)?;
        let state = StreakState::initial(habit.id, next_due);

        match self.streaks.create(&state)? {
            WriteOutcome::Applied => {
                debug!(habit_id = %habit.id, next_due_at = %next_due, "streak initialized");
                Ok(state)
            }
            WriteOutcome::Stale => Err(CoreError::AlreadyExists(habit.id)),
        }
    }

    /// Append a completion to the log and apply it to the streak.
    ///
    /// Safe to retry with the same record after a transient failure: the log
    /// keeps one entry per event id, and a repeated event is not applied
    /// again once the streak has caught up with it.
    pub fn track_completion(&self, record: &CompletionRecord) -> Result<StreakState> {
        self.habit(record.habit_id)?;
        if !self.log.append(record)? {
            let current = self.streak(record.habit_id)?;
            if current
                .last_completed_at
                .is_some_and(|last| last >= record.completed_at)
            {
                debug!(
                    habit_id = %record.habit_id,
                    event_id = %record.event_id,
                    "completion already applied"
                );
                return Ok(current);
            }
        }
        self.record_completion(record.habit_id, record.completed_at)
    }

    /// Apply a completion that is already in the completion log.
    ///
    /// An on-time completion extends the streak; a late one starts a new
    /// streak of 1. The next due date and completion rate are recomputed.
    ///
    /// # Errors
    /// `NotFound` if the habit or its streak record is missing, `Conflict`
    /// when the write keeps losing to concurrent writers, `Store` on
    /// infrastructure failure.
    pub fn record_completion(
        &self,
        habit_id: HabitId,
        completion_time: DateTime<Utc>,
    ) -> Result<StreakState> {
        self.habit(habit_id)?;

        let next = self.update(habit_id, |current| {
            // Re-read under the lock so a concurrent policy change is seen.
            let habit = self.habit(habit_id)?;
            let on_time = schedule::is_on_schedule(current, completion_time);
            let current_streak = if on_time {
                current.current_streak.saturating_add(1)
            } else {
                1
            };

            let now = self.clock.now();
            let actual = self.log.count_between(habit.id, habit.created_at, now)?;

            Ok(StreakState {
                current_streak,
                best_streak: current.best_streak.max(current_streak),
                last_completed_at: Some(completion_time),
                next_due_at: Some(self.next_due(&habit, completion_time)?),
                completion_rate: completion_rate(&habit.policy, habit.created_at, now, actual),
                ..current.clone()
            })
        })?;

        debug!(
            habit_id = %habit_id,
            current_streak = next.current_streak,
            best_streak = next.best_streak,
            next_due_at = ?next.next_due_at,
            "completion recorded"
        );
        Ok(next)
    }

    /// Recompute the due date after the habit's policy changed. Streak
    /// counts are left alone.
    pub fn reschedule(&self, habit_id: HabitId, reference: DateTime<Utc>) -> Result<StreakState> {
        self.habit(habit_id)?;
        self.update(habit_id, |current| {
            let habit = self.habit(habit_id)?;
            Ok(StreakState {
                next_due_at: Some(self.next_due(&habit, reference)?),
                ..current.clone()
            })
        })
    }

    pub fn streak(&self, habit_id: HabitId) -> Result<StreakState> {
        self.streaks
            .load(habit_id)?
            .ok_or_else(|| CoreError::streak_not_found(habit_id))
    }

    pub fn is_due(&self, habit_id: HabitId, now: DateTime<Utc>) -> Result<bool> {
        Ok(schedule::is_due(&self.streak(habit_id)?, now))
    }

    /// The completion rate as of the last update.
    pub fn completion_rate(&self, habit_id: HabitId) -> Result<f64> {
        Ok(self.streak(habit_id)?.completion_rate)
    }

    /// Delete the streak record of a deleted habit.
    pub fn remove(&self, habit_id: HabitId) -> Result<bool> {
        let removed = {
            let slot = self.locks.slot(habit_id);
            let _guard = acquire(&slot);
            self.streaks.delete(habit_id)?
        };
        self.locks.forget(habit_id);
        Ok(removed)
    }

    fn habit(&self, habit_id: HabitId) -> Result<Habit> {
        self.registry
            .habit(habit_id)?
            .ok_or_else(|| CoreError::habit_not_found(habit_id))
    }

    fn next_due(&self, habit: &Habit, reference: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let due = schedule::next_due_date(&habit.policy, reference, |period: &Period| {
            self.log
                .count_between(habit.id, period.start, period.last_instant())
        })?;
        Ok(due)
    }

    /// Read-modify-write one streak record under the habit's lock, retrying
    /// when another process wrote first.
    fn update<F>(&self, habit_id: HabitId, mut derive: F) -> Result<StreakState>
    where
        F: FnMut(&StreakState) -> Result<StreakState>,
    {
        let slot = self.locks.slot(habit_id);
        let _guard = acquire(&slot);

        for attempt in 1..=self.max_retries {
            let current = self.streak(habit_id)?;
            let mut next = derive(&current)?;
            next.habit_id = current.habit_id;
            next.version = current.version + 1;

            match self.streaks.compare_and_swap(current.version, &next)? {
                WriteOutcome::Applied => return Ok(next),
                WriteOutcome::Stale => {
                    warn!(habit_id = %habit_id, attempt, "streak changed underneath update, retrying");
                }
            }
        }

        Err(CoreError::Conflict {
            habit_id,
            attempts: self.max_retries,
        })
    }
}
