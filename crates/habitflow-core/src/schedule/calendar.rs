//! Calendar arithmetic in UTC.
//!
//! Interval counts follow whole-unit semantics: a partial day, month or year
//! does not count, and an end time-of-day earlier than the start's trims the
//! last calendar day before months are compared.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};

/// Half-open window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Last representable instant inside the window, for inclusive range
    /// queries. Storage keeps microsecond precision.
    pub fn last_instant(&self) -> DateTime<Utc> {
        self.end - Duration::microseconds(1)
    }
}

/// Whole elapsed days from `start` to `end`, negative if inverted.
pub fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_days()
}

/// Whole elapsed calendar months from `start` to `end`.
pub fn months_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let start_date = start.date_naive();
    let mut end_date = end.date_naive();

    if end_date > start_date && end.time() < start.time() {
        end_date = end_date.pred_opt().unwrap_or(end_date);
    } else if end_date < start_date && end.time() > start.time() {
        end_date = end_date.succ_opt().unwrap_or(end_date);
    }

    let total = month_index(end_date) - month_index(start_date);
    let day_delta = i64::from(end_date.day()) - i64::from(start_date.day());
    if total > 0 && day_delta < 0 {
        total - 1
    } else if total < 0 && day_delta > 0 {
        total + 1
    } else {
        total
    }
}

/// Whole elapsed calendar years from `start` to `end`.
pub fn years_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    months_between(start, end) / 12
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

/// Add calendar months, clamping to the last day of a shorter month.
/// Saturates at the maximum representable instant.
pub fn add_months(t: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    t.checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Midnight at the start of `t`'s day.
pub fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// ISO week containing `t`: Monday 00:00 to the following Monday 00:00.
pub fn week_of(t: DateTime<Utc>) -> Period {
    let offset = i64::from(t.weekday().num_days_from_monday());
    let start = start_of_day(t) - Duration::days(offset);
    Period {
        start,
        end: start + Duration::weeks(1),
    }
}

/// Calendar month containing `t`: the 1st 00:00 to the 1st of the next
/// month 00:00.
pub fn month_of(t: DateTime<Utc>) -> Period {
    let day_offset = i64::from(t.day0());
    let start = start_of_day(t) - Duration::days(day_offset);
    Period {
        start,
        end: add_months(start, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn days_between_counts_whole_days() {
        assert_eq!(days_between(at(2024, 1, 1, 10, 0), at(2024, 1, 11, 10, 0)), 10);
        assert_eq!(days_between(at(2024, 1, 1, 10, 0), at(2024, 1, 11, 9, 59)), 9);
        assert_eq!(days_between(at(2024, 1, 11, 10, 0), at(2024, 1, 1, 10, 0)), -10);
    }

    #[test]
    fn months_between_requires_full_months() {
        assert_eq!(months_between(at(2024, 1, 15, 8, 0), at(2024, 2, 15, 8, 0)), 1);
        assert_eq!(months_between(at(2024, 1, 15, 8, 0), at(2024, 2, 15, 7, 59)), 0);
        assert_eq!(months_between(at(2024, 1, 15, 8, 0), at(2024, 2, 14, 23, 0)), 0);
        assert_eq!(months_between(at(2024, 1, 31, 0, 0), at(2024, 3, 1, 0, 0)), 1);
        assert_eq!(months_between(at(2023, 11, 1, 0, 0), at(2024, 2, 1, 0, 0)), 3);
        assert_eq!(months_between(at(2024, 2, 15, 8, 0), at(2024, 1, 15, 8, 0)), -1);
    }

    #[test]
    fn years_between_truncates() {
        assert_eq!(years_between(at(2020, 6, 1, 0, 0), at(2024, 5, 31, 0, 0)), 3);
        assert_eq!(years_between(at(2020, 6, 1, 0, 0), at(2024, 6, 1, 0, 0)), 4);
    }

    #[test]
    fn add_months_clamps_to_month_end() {
        assert_eq!(add_months(at(2024, 1, 31, 12, 0), 1), at(2024, 2, 29, 12, 0));
        assert_eq!(add_months(at(2024, 2, 29, 12, 0), 12), at(2025, 2, 28, 12, 0));
    }

    #[test]
    fn week_of_starts_monday_midnight() {
        // 2024-01-10 is a Wednesday
        let week = week_of(at(2024, 1, 10, 15, 30));
        assert_eq!(week.start, at(2024, 1, 8, 0, 0));
        assert_eq!(week.start.weekday(), Weekday::Mon);
        assert_eq!(week.end, at(2024, 1, 15, 0, 0));
        assert!(week.contains(at(2024, 1, 14, 23, 59)));
        assert!(!week.contains(week.end));
    }

    #[test]
    fn week_of_monday_is_same_week() {
        let week = week_of(at(2024, 1, 8, 0, 0));
        assert_eq!(week.start, at(2024, 1, 8, 0, 0));
    }

    #[test]
    fn month_of_spans_calendar_month() {
        let month = month_of(at(2024, 2, 17, 6, 0));
        assert_eq!(month.start, at(2024, 2, 1, 0, 0));
        assert_eq!(month.end, at(2024, 3, 1, 0, 0));
        assert!(month.last_instant() < month.end);
        assert!(month.contains(month.last_instant()));
    }
}
