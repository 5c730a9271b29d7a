//! Read-side streak analytics.
//!
//! Aggregates over streak records for a user and builds per-habit reports.
//! Nothing here writes state.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::habit::{CompletionRecord, Habit, HabitId, StreakState};
use crate::schedule::is_due;

/// Days of history included in a [`HabitReport`].
pub const REPORT_WINDOW_DAYS: i64 = 30;

/// Completion rate at or below which a habit needs attention.
pub const ATTENTION_THRESHOLD: f64 = 0.5;

/// Months of history included in a [`TimeOfDayAnalysis`].
pub const TIME_OF_DAY_WINDOW_MONTHS: u32 = 3;

/// Longest window, in days, a [`CompletionTrends`] may cover.
pub const MAX_TREND_DAYS: i64 = 366;

/// Aggregate streak statistics across a set of habits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreakStatistics {
    pub habit_count: usize,
    /// Habits with a streak currently above zero
    pub active_habits: usize,
    pub total_current_streak: u64,
    pub max_current_streak: u32,
    pub max_best_streak: u32,
    pub avg_completion_rate: f64,
}

impl StreakStatistics {
    pub fn from_streaks(streaks: &[StreakState]) -> Self {
        if streaks.is_empty() {
            return Self::default();
        }

        let rate_sum: f64 = streaks.iter().map(|s| s.completion_rate).sum();
        Self {
            habit_count: streaks.len(),
            active_habits: streaks.iter().filter(|s| s.current_streak > 0).count(),
            total_current_streak: streaks.iter().map(|s| u64::from(s.current_streak)).sum(),
            max_current_streak: streaks.iter().map(|s| s.current_streak).max().unwrap_or(0),
            max_best_streak: streaks.iter().map(|s| s.best_streak).max().unwrap_or(0),
            avg_completion_rate: rate_sum / streaks.len() as f64,
        }
    }
}

/// Snapshot of one habit's streak and recent activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitReport {
    pub habit_id: HabitId,
    pub schedule: String,
    pub current_streak: u32,
    pub best_streak: u32,
    pub completion_rate: f64,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub next_due_at: Option<DateTime<Utc>>,
    pub is_due: bool,
    pub completions_last_30_days: usize,
    pub avg_mood: Option<f64>,
    pub avg_difficulty: Option<f64>,
}

impl HabitReport {
    /// Build a report. `recent` should hold the completions of the last
    /// [`REPORT_WINDOW_DAYS`]; older entries are ignored.
    pub fn build(
        habit: &Habit,
        streak: &StreakState,
        recent: &[CompletionRecord],
        now: DateTime<Utc>,
    ) -> Self {
        let window_start = now - Duration::days(REPORT_WINDOW_DAYS);
        let in_window: Vec<&CompletionRecord> = recent
            .iter()
            .filter(|r| r.habit_id == habit.id && r.completed_at >= window_start && r.completed_at <= now)
            .collect();

        Self {
            habit_id: habit.id,
            schedule: habit.policy.describe(),
            current_streak: streak.current_streak,
            best_streak: streak.best_streak,
            completion_rate: streak.completion_rate,
            last_completed_at: streak.last_completed_at,
            next_due_at: streak.next_due_at,
            is_due: is_due(streak, now),
            completions_last_30_days: in_window.len(),
            avg_mood: average(in_window.iter().filter_map(|r| r.mood_rating)),
            avg_difficulty: average(in_window.iter().filter_map(|r| r.difficulty_rating)),
        }
    }
}

fn average(ratings: impl Iterator<Item = u8>) -> Option<f64> {
    let (sum, count) = ratings.fold((0u32, 0u32), |(sum, count), r| (sum + u32::from(r), count + 1));
    (count > 0).then(|| f64::from(sum) / f64::from(count))
}

/// Streaks ordered by current streak, longest first.
pub fn top_streaks(streaks: &[StreakState], limit: usize) -> Vec<StreakState> {
    let mut ranked = streaks.to_vec();
    ranked.sort_by(|a, b| {
        b.current_streak
            .cmp(&a.current_streak)
            .then(b.best_streak.cmp(&a.best_streak))
    });
    ranked.truncate(limit);
    ranked
}

/// Streaks with a completion rate at or below [`ATTENTION_THRESHOLD`],
/// lowest rate first.
pub fn needing_attention(streaks: &[StreakState], limit: usize) -> Vec<StreakState> {
    let mut weak: Vec<StreakState> = streaks
        .iter()
        .filter(|s| s.completion_rate <= ATTENTION_THRESHOLD)
        .cloned()
        .collect();
    weak.sort_by(|a, b| a.completion_rate.total_cmp(&b.completion_rate));
    weak.truncate(limit);
    weak
}

/// Streaks ordered by how reliably their schedule is met: highest
/// completion rate first, longer current streak on ties.
pub fn streaks_by_efficiency(streaks: &[StreakState], limit: usize) -> Vec<StreakState> {
    let mut ranked = streaks.to_vec();
    ranked.sort_by(|a, b| {
        b.completion_rate
            .total_cmp(&a.completion_rate)
            .then(b.current_streak.cmp(&a.current_streak))
    });
    ranked.truncate(limit);
    ranked
}

/// Broken streaks whose last completion is more recent than `since`.
pub fn recently_broken(streaks: &[StreakState], since: DateTime<Utc>) -> Vec<StreakState> {
    streaks
        .iter()
        .filter(|s| s.current_streak == 0 && s.last_completed_at.is_some_and(|t| t > since))
        .cloned()
        .collect()
}

/// When in the day completions happen, by UTC hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDayAnalysis {
    /// Hour (0-23) to completion count; hours without completions are absent
    pub completions_by_hour: BTreeMap<u32, u64>,
    /// 05:00-11:59
    pub morning: u64,
    /// 12:00-16:59
    pub afternoon: u64,
    /// 17:00-20:59
    pub evening: u64,
    /// 21:00-04:59
    pub night: u64,
    /// Busiest hour, the earliest one on ties
    pub peak_hour: Option<u32>,
    pub peak_hour_count: u64,
}

impl TimeOfDayAnalysis {
    pub fn from_completions(records: &[CompletionRecord]) -> Self {
        let mut analysis = Self::default();
        for record in records {
            let hour = record.completed_at.hour();
            *analysis.completions_by_hour.entry(hour).or_default() += 1;
            match hour {
                5..=11 => analysis.morning += 1,
                12..=16 => analysis.afternoon += 1,
                17..=20 => analysis.evening += 1,
                _ => analysis.night += 1,
            }
        }

        if let Some((&hour, &count)) = analysis
            .completions_by_hour
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        {
            analysis.peak_hour = Some(hour);
            analysis.peak_hour_count = count;
        }
        analysis
    }
}

/// Completion counts over a window, per day and per ISO week.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionTrends {
    /// Every UTC day of the window, including days without completions
    pub daily: BTreeMap<NaiveDate, u64>,
    /// Keyed like `2024-W02`
    pub weekly: BTreeMap<String, u64>,
}

impl CompletionTrends {
    /// Bucket the completions that fall in `[start, end]`. An inverted
    /// window yields empty trends.
    pub fn build(records: &[CompletionRecord], start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let mut trends = Self::default();
        if end < start {
            return trends;
        }

        let last = end.date_naive();
        let mut day = start.date_naive();
        while day <= last {
            trends.daily.insert(day, 0);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        for record in records
            .iter()
            .filter(|r| r.completed_at >= start && r.completed_at <= end)
        {
            *trends.daily.entry(record.completed_at.date_naive()).or_default() += 1;
            let week = record.completed_at.iso_week();
            *trends
                .weekly
                .entry(format!("{}-W{:02}", week.year(), week.week()))
                .or_default() += 1;
        }
        trends
    }
}
