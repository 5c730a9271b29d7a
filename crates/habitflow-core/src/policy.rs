//! Recurrence policies.
//!
//! A [`RecurrencePolicy`] describes how often a habit recurs. It is pure
//! data: the schedule calculator interprets it. Policies arrive from the
//! habit registry either already typed or as the legacy pair of a frequency
//! tag plus a JSON schedule blob, which [`RecurrencePolicy::parse`] turns
//! into a typed value exactly once.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// How often a habit is expected to be completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrencePolicy {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// At least `times` completions per ISO week
    XTimesPerWeek { times: u32 },
    /// At least `times` completions per calendar month
    XTimesPerMonth { times: u32 },
    /// On each of the listed weekdays
    SpecificWeekdays { days: Vec<Weekday> },
    /// Free-form schedule with no interpreter; scheduled like `Daily`
    Custom { payload: String },
}

impl RecurrencePolicy {
    /// Build a weekday policy with the days deduplicated and ordered
    /// Monday-first.
    pub fn specific_weekdays(days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut days: Vec<Weekday> = days.into_iter().collect();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        RecurrencePolicy::SpecificWeekdays { days }
    }

    /// Parse the legacy `(frequency, schedule)` representation.
    ///
    /// Never fails: unknown frequencies and malformed schedule payloads fall
    /// back to [`RecurrencePolicy::Daily`] and log a warning.
    pub fn parse(frequency: &str, schedule: Option<&str>) -> Self {
        let tag = frequency.trim().to_ascii_uppercase();
        match tag.as_str() {
            "DAILY" => RecurrencePolicy::Daily,
            "WEEKLY" => RecurrencePolicy::Weekly,
            "MONTHLY" => RecurrencePolicy::Monthly,
            "YEARLY" => RecurrencePolicy::Yearly,
            "X_TIMES_PER_WEEK" => match parse_times(schedule) {
                Some(times) => RecurrencePolicy::XTimesPerWeek { times },
                None => fallback(&tag, schedule),
            },
            "X_TIMES_PER_MONTH" => match parse_times(schedule) {
                Some(times) => RecurrencePolicy::XTimesPerMonth { times },
                None => fallback(&tag, schedule),
            },
            "SPECIFIC_DAYS" => match parse_days(schedule) {
                Some(days) => RecurrencePolicy::specific_weekdays(days),
                None => fallback(&tag, schedule),
            },
            "CUSTOM" => RecurrencePolicy::Custom {
                payload: schedule.unwrap_or_default().to_string(),
            },
            _ => fallback(&tag, schedule),
        }
    }

    /// The legacy frequency tag for this policy.
    pub fn frequency_tag(&self) -> &'static str {
        match self {
            RecurrencePolicy::Daily => "DAILY",
            RecurrencePolicy::Weekly => "WEEKLY",
            RecurrencePolicy::Monthly => "MONTHLY",
            RecurrencePolicy::Yearly => "YEARLY",
            RecurrencePolicy::XTimesPerWeek { .. } => "X_TIMES_PER_WEEK",
            RecurrencePolicy::XTimesPerMonth { .. } => "X_TIMES_PER_MONTH",
            RecurrencePolicy::SpecificWeekdays { .. } => "SPECIFIC_DAYS",
            RecurrencePolicy::Custom { .. } => "CUSTOM",
        }
    }

    /// Whether scheduling depends on how many completions fall in the
    /// current period.
    pub fn is_count_based(&self) -> bool {
        matches!(
            self,
            RecurrencePolicy::XTimesPerWeek { .. } | RecurrencePolicy::XTimesPerMonth { .. }
        )
    }

    /// Human-readable description
    pub fn describe(&self) -> String {
        match self {
            RecurrencePolicy::Daily => "every day".to_string(),
            RecurrencePolicy::Weekly => "every week".to_string(),
            RecurrencePolicy::Monthly => "every month".to_string(),
            RecurrencePolicy::Yearly => "every year".to_string(),
            RecurrencePolicy::XTimesPerWeek { times } => format!("{times}x per week"),
            RecurrencePolicy::XTimesPerMonth { times } => format!("{times}x per month"),
            RecurrencePolicy::SpecificWeekdays { days } if days.is_empty() => {
                "on no weekdays".to_string()
            }
            RecurrencePolicy::SpecificWeekdays { days } => {
                let names: Vec<String> = days.iter().map(|d| d.to_string()).collect();
                format!("on {}", names.join(", "))
            }
            RecurrencePolicy::Custom { .. } => "custom schedule".to_string(),
        }
    }
}

fn fallback(tag: &str, schedule: Option<&str>) -> RecurrencePolicy {
    warn!(
        frequency = tag,
        schedule = schedule.unwrap_or(""),
        "unrecognized recurrence policy, defaulting to daily"
    );
    RecurrencePolicy::Daily
}

fn parse_times(schedule: Option<&str>) -> Option<u32> {
    let node: Value = serde_json::from_str(schedule?).ok()?;
    let times = node.get("times")?.as_u64()?;
    u32::try_from(times).ok().filter(|t| *t > 0)
}

fn parse_days(schedule: Option<&str>) -> Option<Vec<Weekday>> {
    let node: Value = serde_json::from_str(schedule?).ok()?;
    node.get("days")?
        .as_array()?
        .iter()
        .map(|day| day.as_str().and_then(parse_weekday))
        .collect()
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.trim().to_ascii_uppercase().as_str() {
        "MONDAY" | "MON" => Some(Weekday::Mon),
        "TUESDAY" | "TUE" => Some(Weekday::Tue),
        "WEDNESDAY" | "WED" => Some(Weekday::Wed),
        "THURSDAY" | "THU" => Some(Weekday::Thu),
        "FRIDAY" | "FRI" => Some(Weekday::Fri),
        "SATURDAY" | "SAT" => Some(Weekday::Sat),
        "SUNDAY" | "SUN" => Some(Weekday::Sun),
        _ => None,
    }
}
