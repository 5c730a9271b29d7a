//! Streak expiration sweep.
//!
//! Breaks streaks whose due date has passed without a completion. The sweep
//! only zeroes `current_streak`; the best streak, timestamps and rate are
//! left as the tracker wrote them. Running it twice at the same instant
//! changes nothing the second time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::habit::{HabitId, StreakState};
use crate::locks::{acquire, HabitLocks};
use crate::storage::{StreakStore, WriteOutcome};
use crate::tracker::DEFAULT_MAX_RETRIES;

/// Shortest period accepted by [`StreakSweeper::spawn_periodic`].
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Records that matched the expiry query
    pub examined: usize,
    pub reset: usize,
    /// Records skipped because concurrent writers kept winning
    pub conflicts: usize,
}

enum Reset {
    Applied,
    /// A completion landed first and the streak is no longer expired
    Skipped,
    Conflict,
}

pub struct StreakSweeper {
    streaks: Arc<dyn StreakStore>,
    locks: Arc<HabitLocks>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl StreakSweeper {
    pub fn new(streaks: Arc<dyn StreakStore>) -> Self {
        Self {
            streaks,
            locks: Arc::new(HabitLocks::new()),
            clock: Arc::new(SystemClock),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_locks(mut self, locks: Arc<HabitLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Reset every streak that expired before `now`.
    ///
    /// Each habit is reset on its own; a habit that loses every retry is
    /// counted as a conflict and picked up by the next pass.
    ///
    /// # Errors
    /// Store failures abort the pass. Resets already applied stay applied.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self.streaks.expired(now)?;
        let mut report = SweepReport {
            examined: expired.len(),
            ..SweepReport::default()
        };

        for state in expired {
            match self.reset(state.habit_id, now)? {
                Reset::Applied => report.reset += 1,
                Reset::Skipped => {}
                Reset::Conflict => report.conflicts += 1,
            }
        }

        info!(
            examined = report.examined,
            reset = report.reset,
            conflicts = report.conflicts,
            "streak sweep finished"
        );
        Ok(report)
    }

    /// [`sweep`](Self::sweep) at the injected clock's current time.
    pub fn sweep_now(&self) -> Result<SweepReport> {
        self.sweep(self.clock.now())
    }

    fn reset(&self, habit_id: HabitId, now: DateTime<Utc>) -> Result<Reset> {
        let slot = self.locks.slot(habit_id);
        let _guard = acquire(&slot);

        for attempt in 1..=self.max_retries {
            // Deleted or completed since the query ran
            let Some(current) = self.streaks.load(habit_id)? else {
                return Ok(Reset::Skipped);
            };
            if !current.is_expired(now) {
                return Ok(Reset::Skipped);
            }

            let next = StreakState {
                current_streak: 0,
                ..current.next_version()
            };
            match self.streaks.compare_and_swap(current.version, &next)? {
                WriteOutcome::Applied => {
                    debug!(habit_id = %habit_id, broken_at = current.current_streak, "streak reset");
                    return Ok(Reset::Applied);
                }
                WriteOutcome::Stale => {
                    warn!(habit_id = %habit_id, attempt, "streak changed during sweep, retrying");
                }
            }
        }

        Ok(Reset::Conflict)
    }

    /// Run [`sweep_now`](Self::sweep_now) every `every`, starting immediately.
    /// Periods below [`MIN_SWEEP_INTERVAL`] are raised to it.
    ///
    /// Must be called from within a tokio runtime. Each pass runs on the
    /// blocking pool since the stores do synchronous I/O.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> SweepHandle {
        let every = every.max(MIN_SWEEP_INTERVAL);
        let (shutdown, mut stop) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sweeper = Arc::clone(&self);
                        match tokio::task::spawn_blocking(move || sweeper.sweep_now()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => error!(error = %e, "streak sweep failed"),
                            Err(e) => error!(error = %e, "streak sweep task panicked"),
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("periodic sweep stopped");
        });

        SweepHandle { shutdown, task }
    }
}

/// Handle to a running periodic sweep.
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Stop the task and wait for an in-flight pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "periodic sweep task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::MemoryStore;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn streak(current: u32, best: u32, due: DateTime<Utc>) -> StreakState {
        StreakState {
            current_streak: current,
            best_streak: best,
            last_completed_at: Some(due - ChronoDuration::days(1)),
            completion_rate: 0.8,
            ..StreakState::initial(HabitId::new(), due)
        }
    }

    fn seeded(states: &[StreakState]) -> (Arc<MemoryStore>, StreakSweeper) {
        let store = Arc::new(MemoryStore::new());
        for s in states {
            store.create(s).unwrap();
        }
        let sweeper = StreakSweeper::new(store.clone());
        (store, sweeper)
    }

    #[test]
    fn resets_only_expired_active_streaks() {
        let overdue = streak(4, 9, t0() - ChronoDuration::hours(1));
        let upcoming = streak(2, 2, t0() + ChronoDuration::hours(1));
        let already_broken = streak(0, 5, t0() - ChronoDuration::days(3));
        let due_exactly_now = streak(3, 3, t0());
        let (store, sweeper) = seeded(&[
            overdue.clone(),
            upcoming.clone(),
            already_broken.clone(),
            due_exactly_now.clone(),
        ]);

        let report = sweeper.sweep(t0()).unwrap();
        assert_eq!(
            report,
            SweepReport {
                examined: 1,
                reset: 1,
                conflicts: 0
            }
        );

        let after = store.load(overdue.habit_id).unwrap().unwrap();
        assert_eq!(after.current_streak, 0);
        assert_eq!(after.best_streak, 9);
        assert_eq!(after.next_due_at, overdue.next_due_at);
        assert_eq!(after.last_completed_at, overdue.last_completed_at);
        assert_eq!(after.completion_rate, overdue.completion_rate);
        assert_eq!(after.version, overdue.version + 1);

        for untouched in [upcoming, already_broken, due_exactly_now] {
            assert_eq!(store.load(untouched.habit_id).unwrap().unwrap(), untouched);
        }
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let (store, sweeper) = seeded(&[streak(4, 4, t0() - ChronoDuration::days(2))]);
        sweeper.sweep(t0()).unwrap();
        let snapshot = store.all().unwrap();

        let report = sweeper.sweep(t0()).unwrap();
        assert_eq!(report.reset, 0);
        assert_eq!(store.all().unwrap(), snapshot);
    }

    #[test]
    fn sweep_now_uses_injected_clock() {
        let due = t0() + ChronoDuration::days(1);
        let (_, sweeper) = seeded(&[streak(1, 1, due)]);
        let clock = Arc::new(FixedClock::new(t0()));
        let sweeper = sweeper.with_clock(clock.clone());

        assert_eq!(sweeper.sweep_now().unwrap().reset, 0);
        clock.advance(ChronoDuration::days(2));
        assert_eq!(sweeper.sweep_now().unwrap().reset, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn periodic_sweep_runs_until_shutdown() {
        let overdue = streak(6, 6, t0() - ChronoDuration::days(1));
        let (store, sweeper) = seeded(&[overdue.clone()]);
        let sweeper = Arc::new(sweeper.with_clock(Arc::new(FixedClock::new(t0()))));

        let handle = sweeper.spawn_periodic(MIN_SWEEP_INTERVAL);
        let mut reset = false;
        for _ in 0..100 {
            if store.load(overdue.habit_id).unwrap().unwrap().current_streak == 0 {
                reset = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;
        assert!(reset);
    }

    #[tokio::test]
    async fn zero_period_is_raised_to_the_minimum() {
        let overdue = streak(2, 2, t0() - ChronoDuration::days(1));
        let (store, sweeper) = seeded(&[overdue.clone()]);
        let sweeper = Arc::new(sweeper.with_clock(Arc::new(FixedClock::new(t0()))));

        let handle = sweeper.spawn_periodic(Duration::ZERO);
        for _ in 0..100 {
            if store.load(overdue.habit_id).unwrap().unwrap().current_streak == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;
        assert_eq!(store.load(overdue.habit_id).unwrap().unwrap().current_streak, 0);
    }
}
