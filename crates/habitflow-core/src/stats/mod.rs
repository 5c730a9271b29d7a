//! Statistics module for Habitflow
//!
//! Completion-rate estimation plus read-side analytics over streak records.

mod analytics;
mod completion_rate;

pub use analytics::{
    needing_attention, recently_broken, streaks_by_efficiency, top_streaks, CompletionTrends,
    HabitReport, StreakStatistics, TimeOfDayAnalysis, ATTENTION_THRESHOLD, MAX_TREND_DAYS,
    REPORT_WINDOW_DAYS, TIME_OF_DAY_WINDOW_MONTHS,
};
pub use completion_rate::completion_rate;
