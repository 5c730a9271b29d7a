//! Engine facade.
//!
//! Wires a store implementing all collaborator traits to a tracker and a
//! sweeper that share one set of habit locks, and exposes the habit
//! lifecycle and analytics reads used by the CLI.

use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result, ValidationError};
use crate::habit::{CompletionRecord, Habit, HabitId, StreakState};
use crate::locks::{acquire, HabitLocks};
use crate::policy::RecurrencePolicy;
use crate::schedule;
use crate::stats::{
    self, CompletionTrends, HabitReport, StreakStatistics, TimeOfDayAnalysis, MAX_TREND_DAYS,
    REPORT_WINDOW_DAYS, TIME_OF_DAY_WINDOW_MONTHS,
};
use crate::storage::{CompletionLog, Config, HabitCatalog, StreakStore};
use crate::sweep::StreakSweeper;
use crate::tracker::StreakTracker;

pub struct Engine<S> {
    store: Arc<S>,
    tracker: StreakTracker,
    sweeper: Arc<StreakSweeper>,
    clock: Arc<dyn Clock>,
}

impl<S> Engine<S>
where
    S: HabitCatalog + CompletionLog + StreakStore + 'static,
{
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let locks = Arc::new(HabitLocks::new());
        let retries = config.engine.max_retries;

        let tracker = StreakTracker::new(store.clone(), store.clone(), store.clone())
            .with_locks(locks.clone())
            .with_clock(clock.clone())
            .with_max_retries(retries);
        let sweeper = StreakSweeper::new(store.clone())
            .with_locks(locks)
            .with_clock(clock.clone())
            .with_max_retries(retries);

        Self {
            store,
            tracker,
            sweeper: Arc::new(sweeper),
            clock,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn tracker(&self) -> &StreakTracker {
        &self.tracker
    }

    pub fn sweeper(&self) -> Arc<StreakSweeper> {
        Arc::clone(&self.sweeper)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a habit and write its initial streak record.
    ///
    /// # Errors
    /// `AlreadyExists` if the habit already has a streak record, in which
    /// case the registry is left untouched. If the streak record cannot be
    /// written the registration is rolled back.
    pub fn add_habit(&self, habit: &Habit) -> Result<StreakState> {
        let slot = self.tracker.locks().slot(habit.id);
        let _guard = acquire(&slot);

        if self.store.load(habit.id)?.is_some() {
            return Err(CoreError::AlreadyExists(habit.id));
        }
        let previous = self.store.habit(habit.id)?;
        self.store.register(habit)?;

        match self.tracker.initialize(habit) {
            Ok(state) => {
                info!(habit_id = %habit.id, schedule = %habit.policy.describe(), "habit created");
                Ok(state)
            }
            Err(e) => {
                let restored = match &previous {
                    Some(prior) => self.store.register(prior),
                    None => self.store.unregister(habit.id).map(|_| ()),
                };
                if let Err(rollback) = restored {
                    warn!(habit_id = %habit.id, error = %rollback, "failed to roll back habit registration");
                }
                Err(e)
            }
        }
    }

    /// Replace a habit's policy and recompute its due date from now.
    pub fn change_policy(&self, habit_id: HabitId, policy: RecurrencePolicy) -> Result<StreakState> {
        let habit = self
            .store
            .habit(habit_id)?
            .ok_or_else(|| CoreError::habit_not_found(habit_id))?;
        self.store.register(&Habit { policy, ..habit })?;
        self.tracker.reschedule(habit_id, self.clock.now())
    }

    /// Delete a habit, its completions and its streak record.
    pub fn delete_habit(&self, habit_id: HabitId) -> Result<bool> {
        let had_streak = self.tracker.remove(habit_id)?;
        let had_habit = self.store.unregister(habit_id)?;
        if had_habit {
            info!(habit_id = %habit_id, "habit deleted");
        }
        Ok(had_habit || had_streak)
    }

    /// A user's habits that are due at `now` with their streak records, in
    /// habit creation order. Habits without a streak record are skipped.
    pub fn due_habits(
        &self,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Habit, StreakState)>> {
        let habits = match user_id {
            Some(user) => self.store.habits_for_user(user)?,
            None => self.store.habits()?,
        };

        let mut due = Vec::new();
        for habit in habits {
            match self.tracker.streak(habit.id) {
                Ok(streak) => {
                    if schedule::is_due(&streak, now) {
                        due.push((habit, streak));
                    }
                }
                Err(CoreError::NotFound { .. }) => {
                    warn!(habit_id = %habit.id, "habit has no streak record, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(due)
    }

    /// Streak records of a user's habits, in habit creation order.
    pub fn streaks_for_user(&self, user_id: &str) -> Result<Vec<StreakState>> {
        let mut streaks = Vec::new();
        for habit in self.store.habits_for_user(user_id)? {
            if let Some(state) = self.store.load(habit.id)? {
                streaks.push(state);
            }
        }
        Ok(streaks)
    }

    pub fn statistics(&self, user_id: &str) -> Result<StreakStatistics> {
        Ok(StreakStatistics::from_streaks(&self.streaks_for_user(user_id)?))
    }

    pub fn report(&self, habit_id: HabitId) -> Result<HabitReport> {
        let habit = self
            .store
            .habit(habit_id)?
            .ok_or_else(|| CoreError::habit_not_found(habit_id))?;
        let streak = self.tracker.streak(habit_id)?;
        let now = self.clock.now();
        let recent = self.store.completions_between(
            habit_id,
            now - Duration::days(REPORT_WINDOW_DAYS),
            now,
        )?;
        Ok(HabitReport::build(&habit, &streak, &recent, now))
    }

    pub fn top_streaks(&self, user_id: &str, limit: usize) -> Result<Vec<StreakState>> {
        Ok(stats::top_streaks(&self.streaks_for_user(user_id)?, limit))
    }

    pub fn needing_attention(&self, user_id: &str, limit: usize) -> Result<Vec<StreakState>> {
        Ok(stats::needing_attention(&self.streaks_for_user(user_id)?, limit))
    }

    /// Streaks broken after a completion within the last `days` days.
    ///
    /// # Errors
    /// `Validation` if `days` is negative or reaches past the representable
    /// date range.
    pub fn recently_broken(&self, user_id: &str, days: i64) -> Result<Vec<StreakState>> {
        let since = self.days_ago(days)?;
        Ok(stats::recently_broken(&self.streaks_for_user(user_id)?, since))
    }

    pub fn streaks_by_efficiency(&self, user_id: &str, limit: usize) -> Result<Vec<StreakState>> {
        Ok(stats::streaks_by_efficiency(&self.streaks_for_user(user_id)?, limit))
    }

    /// Hour-of-day breakdown of a user's completions over the last
    /// [`TIME_OF_DAY_WINDOW_MONTHS`] months.
    pub fn time_of_day(&self, user_id: &str) -> Result<TimeOfDayAnalysis> {
        let now = self.clock.now();
        let start = now
            .checked_sub_months(Months::new(TIME_OF_DAY_WINDOW_MONTHS))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let records = self.user_completions(user_id, start, now)?;
        Ok(TimeOfDayAnalysis::from_completions(&records))
    }

    /// Daily and weekly completion counts for a user over the last `days`
    /// days.
    ///
    /// # Errors
    /// `Validation` if `days` is negative or above [`MAX_TREND_DAYS`].
    pub fn completion_trends(&self, user_id: &str, days: i64) -> Result<CompletionTrends> {
        if days > MAX_TREND_DAYS {
            return Err(ValidationError::WindowOutOfRange { days }.into());
        }
        let now = self.clock.now();
        let start = self.days_ago(days)?;
        let records = self.user_completions(user_id, start, now)?;
        Ok(CompletionTrends::build(&records, start, now))
    }

    /// The habit's latest logged completion.
    pub fn most_recent_completion(&self, habit_id: HabitId) -> Result<Option<CompletionRecord>> {
        if self.store.habit(habit_id)?.is_none() {
            return Err(CoreError::habit_not_found(habit_id));
        }
        Ok(self.store.latest(habit_id)?)
    }

    fn user_completions(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CompletionRecord>> {
        let mut records = Vec::new();
        for habit in self.store.habits_for_user(user_id)? {
            records.extend(self.store.completions_between(habit.id, start, end)?);
        }
        records.sort_by_key(|r| r.completed_at);
        Ok(records)
    }

    fn days_ago(&self, days: i64) -> Result<DateTime<Utc>> {
        let out_of_range = || CoreError::from(ValidationError::WindowOutOfRange { days });
        if days < 0 {
            return Err(out_of_range());
        }
        Duration::try_days(days)
            .and_then(|window| self.clock.now().checked_sub_signed(window))
            .ok_or_else(out_of_range)
    }
}
