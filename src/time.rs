//! Relative-time arithmetic shared by both translators.
//!
//! Months are approximated as 30 days and years as 365 days. This mirrors the
//! upstream extractor's contract and is a known precision limitation around
//! month and year boundaries; both translators must stay consistent with each
//! other, so the approximation lives here and nowhere else.

use chrono::{DateTime, Duration, Utc};

use crate::intent::RelativeTime;

/// Concrete time window derived from a relative constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Offset in whole days represented by a relative constraint.
pub fn offset_days(rel: RelativeTime) -> i64 {
    match rel {
        RelativeTime::Days(d) => d,
        RelativeTime::Months(m) => m * 30,
        RelativeTime::Years(y) => y * 365,
    }
}

/// Resolve a relative constraint into an absolute window anchored at `now`.
///
/// A zero offset means the current day: the window spans the whole of today.
/// A non-zero offset spans from `now + offset` to `now` (offsets are negative
/// for constraints like "last week").
pub fn window_from_relative(rel: RelativeTime, now: DateTime<Utc>) -> TimeWindow {
    let days = offset_days(rel);
    if days == 0 {
        let start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        let end = now
            .date_naive()
            .and_hms_micro_opt(23, 59, 59, 999_999)
            .expect("end of day is always valid")
            .and_utc();
        TimeWindow { start, end }
    } else {
        TimeWindow {
            start: now + Duration::days(days),
            end: now,
        }
    }
}

/// Time bound shape used on the SQL side, where zero offsets map to
/// calendar-period predicates instead of an explicit range.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlTimeBound {
    /// `DATE(col) = CURRENT_DATE`
    Today,
    /// month and year of `col` match the current date
    CurrentMonth,
    /// year of `col` matches the current date
    CurrentYear,
    /// `col >= <timestamp>`
    After(DateTime<Utc>),
}

pub fn sql_bound_from_relative(rel: RelativeTime, now: DateTime<Utc>) -> SqlTimeBound {
    match rel {
        RelativeTime::Days(0) => SqlTimeBound::Today,
        RelativeTime::Months(0) => SqlTimeBound::CurrentMonth,
        RelativeTime::Years(0) => SqlTimeBound::CurrentYear,
        other => SqlTimeBound::After(now + Duration::days(offset_days(other))),
    }
}
