//! Integration tests for concurrent streak writers.
//!
//! Completion handlers and the sweeper race on the same records; every
//! applied update must be visible in the final state.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use habitflow_core::{
    CompletionLog, CompletionRecord, Config, Engine, FixedClock, Habit, HabitId, MemoryStore,
    RecurrencePolicy, SqliteStore, StreakState, StreakStore, StreakTracker, WriteOutcome,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 9, 0, 0).unwrap()
}

/// Retry a transient failure the way a message consumer would.
fn record_until_applied(
    tracker: &StreakTracker,
    habit: &Habit,
    at: DateTime<Utc>,
) -> StreakState {
    loop {
        match tracker.record_completion(habit.id, at) {
            Err(e) if e.is_transient() => continue,
            other => return other.unwrap(),
        }
    }
}

#[test]
fn same_habit_completions_are_never_lost() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let clock = Arc::new(FixedClock::new(start()));
    let engine = Arc::new(Engine::with_clock(
        Arc::new(MemoryStore::new()),
        &Config::default(),
        clock,
    ));
    let habit = Habit::new("user-1", RecurrencePolicy::Daily, start());
    engine.add_habit(&habit).unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let habit = habit.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PER_THREAD {
                    engine
                        .tracker()
                        .track_completion(&CompletionRecord::new(habit.id, start()))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let state = engine.tracker().streak(habit.id).unwrap();
    let total = (THREADS * PER_THREAD) as u32;
    assert_eq!(state.current_streak, total);
    assert_eq!(state.best_streak, total);
    assert_eq!(state.version, u64::from(total));
}

#[test]
fn different_habits_progress_independently() {
    let engine = Arc::new(Engine::with_clock(
        Arc::new(MemoryStore::new()),
        &Config::default(),
        Arc::new(FixedClock::new(start())),
    ));
    let habits: Vec<Habit> = (0..4)
        .map(|i| Habit::new(format!("user-{i}"), RecurrencePolicy::Weekly, start()))
        .collect();
    for habit in &habits {
        engine.add_habit(habit).unwrap();
    }

    let handles: Vec<_> = habits
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, habit)| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..=i {
                    engine
                        .tracker()
                        .track_completion(&CompletionRecord::new(habit.id, start()))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for (i, habit) in habits.iter().enumerate() {
        let state = engine.tracker().streak(habit.id).unwrap();
        assert_eq!(state.current_streak as usize, i + 1);
    }
}

#[test]
fn sweep_and_late_completion_agree_in_either_order() {
    for _ in 0..20 {
        let store = Arc::new(MemoryStore::new());
        let habit = Habit::new("user-1", RecurrencePolicy::Daily, start());
        let engine = Engine::with_clock(
            store.clone(),
            &Config::default(),
            Arc::new(FixedClock::new(start())),
        );
        engine.add_habit(&habit).unwrap();
        engine
            .tracker()
            .track_completion(&CompletionRecord::new(habit.id, start()))
            .unwrap();
        engine
            .tracker()
            .track_completion(&CompletionRecord::new(habit.id, start()))
            .unwrap();

        let late = start() + Duration::days(4);
        store
            .append(&CompletionRecord::new(habit.id, late))
            .unwrap();

        let sweeper = engine.sweeper();
        let sweeping = thread::spawn(move || sweeper.sweep(late).unwrap());
        record_until_applied(engine.tracker(), &habit, late);
        sweeping.join().unwrap();

        // Completion first: sweep finds a fresh due date and skips.
        // Sweep first: the late completion starts over at 1.
        let state = store.load(habit.id).unwrap().unwrap();
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.best_streak, 2);
        assert_eq!(state.last_completed_at, Some(late));
    }
}

#[test]
fn separate_processes_sharing_a_database_do_not_lose_updates() {
    const ROUNDS: usize = 30;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let habit = Habit::new("user-1", RecurrencePolicy::Daily, start());

    let config = {
        let mut config = Config::default();
        config.engine.max_retries = 50;
        config
    };

    // Two engines with their own connections and lock tables stand in for
    // two processes.
    let engines: Vec<_> = (0..2)
        .map(|_| {
            Arc::new(Engine::with_clock(
                Arc::new(SqliteStore::open(&path).unwrap()),
                &config,
                Arc::new(FixedClock::new(start())),
            ))
        })
        .collect();
    engines[0].add_habit(&habit).unwrap();
    for _ in 0..2 * ROUNDS {
        engines[0]
            .store()
            .append(&CompletionRecord::new(habit.id, start()))
            .unwrap();
    }

    let handles: Vec<_> = engines
        .iter()
        .map(|engine| {
            let engine = Arc::clone(engine);
            let habit = habit.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    record_until_applied(engine.tracker(), &habit, start());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let state = engines[1].tracker().streak(habit.id).unwrap();
    assert_eq!(state.current_streak as usize, 2 * ROUNDS);
    assert_eq!(state.version as usize, 2 * ROUNDS);
}

#[test]
fn stale_version_is_rejected_by_both_stores() {
    let stores: Vec<Arc<dyn StreakStore>> = vec![
        Arc::new(MemoryStore::new()),
        Arc::new(SqliteStore::open_memory().unwrap()),
    ];

    for store in stores {
        let state = StreakState::initial(HabitId::new(), start());
        assert_eq!(store.create(&state).unwrap(), WriteOutcome::Applied);
        assert_eq!(store.create(&state).unwrap(), WriteOutcome::Stale);

        let next = StreakState {
            current_streak: 1,
            best_streak: 1,
            version: 1,
            ..state.clone()
        };
        assert_eq!(store.compare_and_swap(0, &next).unwrap(), WriteOutcome::Applied);

        let competing = StreakState {
            current_streak: 7,
            best_streak: 7,
            version: 1,
            ..state.clone()
        };
        assert_eq!(store.compare_and_swap(0, &competing).unwrap(), WriteOutcome::Stale);
        assert_eq!(store.load(state.habit_id).unwrap(), Some(next));
    }
}
