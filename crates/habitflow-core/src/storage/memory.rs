//! In-memory store implementing all three collaborator traits.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};

use super::{CompletionLog, HabitCatalog, HabitRegistry, StreakStore, WriteOutcome};
use crate::error::StoreError;
use crate::habit::{CompletionRecord, Habit, HabitId, StreakState};

/// Process-local store. Cheap to build; state is lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    habits: RwLock<HashMap<HabitId, Habit>>,
    completions: RwLock<HashMap<HabitId, Vec<CompletionRecord>>>,
    streaks: Mutex<HashMap<HabitId, StreakState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_habit(&self, habit: Habit) -> Result<(), StoreError> {
        self.habits.write()?.insert(habit.id, habit);
        Ok(())
    }

    /// Remove a habit and its completions. The streak record is removed
    /// separately through [`StreakStore::delete`].
    pub fn remove_habit(&self, id: HabitId) -> Result<bool, StoreError> {
        self.completions.write()?.remove(&id);
        Ok(self.habits.write()?.remove(&id).is_some())
    }
}

impl HabitRegistry for MemoryStore {
    fn habit(&self, id: HabitId) -> Result<Option<Habit>, StoreError> {
        Ok(self.habits.read()?.get(&id).cloned())
    }

    fn habits(&self) -> Result<Vec<Habit>, StoreError> {
        let mut habits: Vec<Habit> = self.habits.read()?.values().cloned().collect();
        habits.sort_by_key(|h| h.created_at);
        Ok(habits)
    }
}

impl HabitCatalog for MemoryStore {
    fn register(&self, habit: &Habit) -> Result<(), StoreError> {
        self.insert_habit(habit.clone())
    }

    fn unregister(&self, id: HabitId) -> Result<bool, StoreError> {
        self.remove_habit(id)
    }
}

impl CompletionLog for MemoryStore {
    fn append(&self, record: &CompletionRecord) -> Result<bool, StoreError> {
        let mut completions = self.completions.write()?;
        if completions
            .values()
            .flatten()
            .any(|r| r.event_id == record.event_id)
        {
            return Ok(false);
        }
        let entries = completions.entry(record.habit_id).or_default();
        let pos = entries.partition_point(|r| r.completed_at <= record.completed_at);
        entries.insert(pos, record.clone());
        Ok(true)
    }

    fn count_between(
        &self,
        habit_id: HabitId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let completions = self.completions.read()?;
        let count = completions.get(&habit_id).map_or(0, |entries| {
            entries
                .iter()
                .filter(|r| r.completed_at >= start && r.completed_at <= end)
                .count()
        });
        Ok(count as u64)
    }

    fn completions_between(
        &self,
        habit_id: HabitId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CompletionRecord>, StoreError> {
        let completions = self.completions.read()?;
        Ok(completions
            .get(&habit_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|r| r.completed_at >= start && r.completed_at <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl StreakStore for MemoryStore {
    fn load(&self, habit_id: HabitId) -> Result<Option<StreakState>, StoreError> {
        Ok(self.streaks.lock()?.get(&habit_id).cloned())
    }

    fn create(&self, state: &StreakState) -> Result<WriteOutcome, StoreError> {
        let mut streaks = self.streaks.lock()?;
        if streaks.contains_key(&state.habit_id) {
            return Ok(WriteOutcome::Stale);
        }
        streaks.insert(state.habit_id, state.clone());
        Ok(WriteOutcome::Applied)
    }

    fn compare_and_swap(
        &self,
        expected_version: u64,
        next: &StreakState,
    ) -> Result<WriteOutcome, StoreError> {
        let mut streaks = self.streaks.lock()?;
        match streaks.get_mut(&next.habit_id) {
            Some(stored) if stored.version == expected_version => {
                *stored = next.clone();
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Stale),
        }
    }

    fn expired(&self, now: DateTime<Utc>) -> Result<Vec<StreakState>, StoreError> {
        Ok(self
            .streaks
            .lock()?
            .values()
            .filter(|s| s.is_expired(now))
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<StreakState>, StoreError> {
        Ok(self.streaks.lock()?.values().cloned().collect())
    }

    fn delete(&self, habit_id: HabitId) -> Result<bool, StoreError> {
        Ok(self.streaks.lock()?.remove(&habit_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RecurrencePolicy;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn counts_are_inclusive() {
        let store = MemoryStore::new();
        let id = HabitId::new();
        for day in [0, 1, 2, 5] {
            store
                .append(&CompletionRecord::new(id, t0() + Duration::days(day)))
                .unwrap();
        }
        assert_eq!(store.count_between(id, t0(), t0() + Duration::days(2)).unwrap(), 3);
        assert_eq!(store.count_between(id, t0() + Duration::days(3), t0() + Duration::days(4)).unwrap(), 0);
        assert_eq!(store.count_between(HabitId::new(), t0(), t0() + Duration::days(9)).unwrap(), 0);
    }

    #[test]
    fn completions_come_back_in_time_order() {
        let store = MemoryStore::new();
        let id = HabitId::new();
        store.append(&CompletionRecord::new(id, t0() + Duration::days(2))).unwrap();
        store.append(&CompletionRecord::new(id, t0())).unwrap();
        let listed = store
            .completions_between(id, t0(), t0() + Duration::days(3))
            .unwrap();
        assert_eq!(listed[0].completed_at, t0());
        assert_eq!(listed[1].completed_at, t0() + Duration::days(2));
    }

    #[test]
    fn append_ignores_a_repeated_event() {
        let store = MemoryStore::new();
        let id = HabitId::new();
        let record = CompletionRecord::new(id, t0());
        assert!(store.append(&record).unwrap());
        assert!(!store.append(&record).unwrap());
        assert!(store.append(&CompletionRecord::new(id, t0())).unwrap());
        assert_eq!(store.count_between(id, t0(), t0()).unwrap(), 2);
    }

    #[test]
    fn compare_and_swap_rejects_stale_versions() {
        let store = MemoryStore::new();
        let state = StreakState::initial(HabitId::new(), t0());
        assert_eq!(store.create(&state).unwrap(), WriteOutcome::Applied);
        assert_eq!(store.create(&state).unwrap(), WriteOutcome::Stale);

        let mut next = state.next_version();
        next.current_streak = 1;
        next.best_streak = 1;
        assert_eq!(store.compare_and_swap(0, &next).unwrap(), WriteOutcome::Applied);
        assert_eq!(store.compare_and_swap(0, &next).unwrap(), WriteOutcome::Stale);
        assert_eq!(store.load(state.habit_id).unwrap().unwrap().current_streak, 1);
    }

    #[test]
    fn expired_filters_active_lapsed_streaks() {
        let store = MemoryStore::new();
        let mut active = StreakState::initial(HabitId::new(), t0());
        active.current_streak = 2;
        let idle = StreakState::initial(HabitId::new(), t0());
        store.create(&active).unwrap();
        store.create(&idle).unwrap();

        let expired = store.expired(t0() + Duration::hours(1)).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].habit_id, active.habit_id);
    }

    #[test]
    fn habits_by_user() {
        let store = MemoryStore::new();
        let mine = Habit::new("alice", RecurrencePolicy::Daily, t0());
        store.insert_habit(mine.clone()).unwrap();
        store
            .insert_habit(Habit::new("bob", RecurrencePolicy::Weekly, t0()))
            .unwrap();
        assert_eq!(store.habits_for_user("alice").unwrap(), vec![mine.clone()]);
        assert!(store.remove_habit(mine.id).unwrap());
        assert!(store.habit(mine.id).unwrap().is_none());
    }
}
