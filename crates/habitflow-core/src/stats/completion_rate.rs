//! Completion-rate estimator.

use chrono::{DateTime, Utc};

use crate::policy::RecurrencePolicy;
use crate::schedule::required_completions;

/// Ratio of `actual` completions to the completions `policy` requires
/// between `created_at` and `now`, clamped to [0, 1].
///
/// Returns 0 when nothing is required yet.
pub fn completion_rate(
    policy: &RecurrencePolicy,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    actual: u64,
) -> f64 {
    let required = required_completions(policy, created_at, now);
    if required == 0 {
        return 0.0;
    }
    (actual as f64 / f64::from(required)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn daily_rate_over_ten_days() {
        let rate = completion_rate(&RecurrencePolicy::Daily, created(), created() + Duration::days(10), 7);
        assert!((rate - 7.0 / 11.0).abs() < 1e-9);
        assert!((rate - 0.636).abs() < 1e-3);
    }

    #[test]
    fn rate_is_clamped_to_one() {
        let rate = completion_rate(&RecurrencePolicy::Weekly, created(), created() + Duration::days(3), 5);
        assert_eq!(rate, 1.0);
    }

    #[test]
    fn nothing_required_means_zero() {
        let rate = completion_rate(&RecurrencePolicy::Daily, created(), created() - Duration::days(1), 3);
        assert_eq!(rate, 0.0);

        let never = RecurrencePolicy::SpecificWeekdays { days: vec![] };
        assert_eq!(completion_rate(&never, created(), created() + Duration::days(30), 2), 0.0);
    }

    #[test]
    fn zero_length_interval_requires_one_daily_completion() {
        assert_eq!(completion_rate(&RecurrencePolicy::Daily, created(), created(), 1), 1.0);
        assert_eq!(completion_rate(&RecurrencePolicy::Daily, created(), created(), 0), 0.0);
    }
}
