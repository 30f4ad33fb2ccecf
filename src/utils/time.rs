/// UTC calendar utilities for daily backfill windows
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// The last fully closed UTC day relative to `now`
pub fn yesterday_utc(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive() - Duration::days(1)
}

/// Every calendar day from `start` to `end`, both inclusive.
/// Empty when `start > end`.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if start > end {
        return Vec::new();
    }
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Request window for one UTC day.
///
/// `from` is the day's midnight, `to` the last second of the day (inclusive),
/// so the next day's daily candle never falls inside the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub from: i64,
    pub to: i64,
}

impl DayWindow {
    pub fn for_date(date: NaiveDate) -> Self {
        let midnight = date.and_time(NaiveTime::default());
        let from = DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc).timestamp();
        DayWindow {
            date,
            from,
            to: from + 86_400 - 1,
        }
    }

    /// Whether a candle open-time (unix seconds) belongs to this day
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.from && ts <= self.to
    }
}
