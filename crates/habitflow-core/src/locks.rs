//! Per-habit write serialization.
//!
//! Every streak read-modify-write in this process runs under the habit's
//! slot mutex. Writers for different habits hold different slots and never
//! wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::habit::HabitId;

#[derive(Debug, Default)]
pub struct HabitLocks {
    slots: Mutex<HashMap<HabitId, Arc<Mutex<()>>>>,
}

impl HabitLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `habit_id`, created on first use.
    pub fn slot(&self, habit_id: HabitId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(habit_id).or_default().clone()
    }

    /// Drop the slot of a deleted habit.
    pub fn forget(&self, habit_id: HabitId) {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&habit_id);
    }
}

/// Acquire a slot. The mutex guards no data, so a poisoned slot is still
/// safe to enter.
pub fn acquire(slot: &Mutex<()>) -> MutexGuard<'_, ()> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}
