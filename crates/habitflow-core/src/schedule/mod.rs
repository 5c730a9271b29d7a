//! Schedule calculator.
//!
//! Pure functions mapping a [`RecurrencePolicy`], a reference time and, for
//! count-based policies, the number of completions in the current period to:
//!
//! - the next due date ([`next_due_date`])
//! - whether a completion was on time ([`is_on_schedule`])
//! - whether a habit is due now ([`is_due`])
//! - how many completions an interval requires ([`required_completions`])

pub mod calendar;

use std::convert::Infallible;

use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::warn;

use crate::habit::StreakState;
use crate::policy::RecurrencePolicy;

pub use calendar::Period;
use calendar::{add_months, days_between, month_of, months_between, week_of, years_between};

/// Compute when a habit is next due after a completion at `reference`.
///
/// `completions_in_period` is consulted only for count-based policies. It
/// receives the period containing `reference` and must return the number of
/// completions logged in it, the triggering completion included.
///
/// # Errors
/// Propagates the error of `completions_in_period`.
pub fn next_due_date<F, E>(
    policy: &RecurrencePolicy,
    reference: DateTime<Utc>,
    completions_in_period: F,
) -> Result<DateTime<Utc>, E>
where
    F: FnOnce(&Period) -> Result<u64, E>,
{
    let due = match policy {
        RecurrencePolicy::Daily => reference + Duration::days(1),
        RecurrencePolicy::Weekly => reference + Duration::weeks(1),
        RecurrencePolicy::Monthly => add_months(reference, 1),
        RecurrencePolicy::Yearly => add_months(reference, 12),
        RecurrencePolicy::XTimesPerWeek { times } => {
            let week = week_of(reference);
            let done = completions_in_period(&week)?;
            count_based_due(reference, &week, done, *times)
        }
        RecurrencePolicy::XTimesPerMonth { times } => {
            let month = month_of(reference);
            let done = completions_in_period(&month)?;
            count_based_due(reference, &month, done, *times)
        }
        RecurrencePolicy::SpecificWeekdays { days } => {
            let mut candidate = reference + Duration::days(1);
            for _ in 1..7 {
                if days.contains(&candidate.weekday()) {
                    break;
                }
                candidate += Duration::days(1);
            }
            candidate
        }
        RecurrencePolicy::Custom { payload } => {
            warn!(payload = %payload, "custom schedules are not interpreted, defaulting to daily");
            reference + Duration::days(1)
        }
    };
    Ok(due)
}

/// [`next_due_date`] with a known completion count for the current period.
pub fn next_due_date_with_count(
    policy: &RecurrencePolicy,
    reference: DateTime<Utc>,
    completions_in_period: u64,
) -> DateTime<Utc> {
    match next_due_date(policy, reference, |_| {
        Ok::<_, Infallible>(completions_in_period)
    }) {
        Ok(due) => due,
        Err(never) => match never {},
    }
}

/// Short of the quota: due again tomorrow. Quota met: due the day after the
/// period ends.
fn count_based_due(
    reference: DateTime<Utc>,
    period: &Period,
    done: u64,
    times: u32,
) -> DateTime<Utc> {
    if done < u64::from(times) {
        reference + Duration::days(1)
    } else {
        period.end + Duration::days(1)
    }
}

/// The period whose completions count toward a count-based policy's quota.
pub fn period_bounds(policy: &RecurrencePolicy, reference: DateTime<Utc>) -> Option<Period> {
    match policy {
        RecurrencePolicy::XTimesPerWeek { .. } => Some(week_of(reference)),
        RecurrencePolicy::XTimesPerMonth { .. } => Some(month_of(reference)),
        _ => None,
    }
}

/// A completion is on schedule if no due date has been computed yet or it
/// lands at or before the due date.
pub fn is_on_schedule(streak: &StreakState, completion_time: DateTime<Utc>) -> bool {
    streak
        .next_due_at
        .map_or(true, |due| completion_time <= due)
}

/// A habit is due once its due date has been reached.
pub fn is_due(streak: &StreakState, now: DateTime<Utc>) -> bool {
    streak.next_due_at.is_some_and(|due| now >= due)
}

/// Expected number of completions over `[start, end]`, both ends inclusive.
///
/// An inverted interval requires nothing.
pub fn required_completions(
    policy: &RecurrencePolicy,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> u32 {
    if end < start {
        return 0;
    }

    let days = days_between(start, end);
    let required = match policy {
        RecurrencePolicy::Daily | RecurrencePolicy::Custom { .. } => days + 1,
        RecurrencePolicy::Weekly => days / 7 + 1,
        RecurrencePolicy::Monthly => months_between(start, end) + 1,
        RecurrencePolicy::Yearly => years_between(start, end) + 1,
        RecurrencePolicy::XTimesPerWeek { times } => i64::from(*times) * (days / 7 + 1),
        RecurrencePolicy::XTimesPerMonth { times } => {
            i64::from(*times) * (months_between(start, end) + 1)
        }
        RecurrencePolicy::SpecificWeekdays { days: weekdays } => {
            let mut count = 0;
            let mut current = start;
            while current <= end {
                if weekdays.contains(&current.weekday()) {
                    count += 1;
                }
                current += Duration::days(1);
            }
            count
        }
    };

    u32::try_from(required.max(0)).unwrap_or(u32::MAX)
}

/// Whether `actual` completions satisfy the policy over `[start, end]`.
pub fn has_met_frequency(
    policy: &RecurrencePolicy,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    actual: u64,
) -> bool {
    actual >= u64::from(required_completions(policy, start, end))
}
