//! Report clock: owns "now" and the site-local reporting window.
//!
//! RULE: nothing in the crate reads the process timezone or the wall clock
//! directly. Timezones and "now" are passed in, so every report is
//! reproducible from its inputs.

use crate::{
    error::{ReportError, ReportResult},
    types::EpochSecs,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportClock {
    pub now: DateTime<Utc>,
}

impl ReportClock {
    pub fn system() -> Self {
        Self { now: Utc::now() }
    }

    /// A clock pinned to `now`. Used by tests and by reruns of past reports.
    pub fn fixed(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn now_epoch(&self) -> EpochSecs {
        self.now.timestamp()
    }
}

/// Half-open UTC interval `[earliest, latest)` that job end times must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportWindow {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

impl ReportWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.earliest && t < self.latest
    }
}

/// The 24h window ending at `cutoff_hour:00` site-local time on `day`.
///
/// The cutoff is DST-aware through `tz`; the window start is exactly 24
/// hours earlier in UTC, so windows spanning a DST change are still 24h.
pub fn report_window<Tz: TimeZone>(
    day: NaiveDate,
    tz: &Tz,
    cutoff_hour: u32,
) -> ReportResult<ReportWindow> {
    let invalid = || ReportError::InvalidCutoff { day: day.to_string() };
    let local = day.and_hms_opt(cutoff_hour, 0, 0).ok_or_else(invalid)?;
    let latest = tz
        .from_local_datetime(&local)
        .earliest()
        .ok_or_else(invalid)?
        .with_timezone(&Utc);
    Ok(ReportWindow {
        earliest: latest - Duration::days(1),
        latest,
    })
}

/// The target day followed by each comparison day `offsets` days back.
pub fn comparison_days(day: NaiveDate, offsets: &[i64]) -> Vec<NaiveDate> {
    std::iter::once(day)
        .chain(offsets.iter().map(|d| day - Duration::days(*d)))
        .collect()
}

/// Convert a log-local wall time to epoch seconds with a fixed offset.
/// Daylight saving is never consulted.
pub fn log_time_to_epoch(naive: NaiveDateTime, offset: FixedOffset) -> EpochSecs {
    naive.and_utc().timestamp() - i64::from(offset.local_minus_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn cutoff_follows_pacific_daylight_time() {
        let w = report_window(ymd(2012, 4, 5), &chrono_tz::US::Pacific, 6).unwrap();
        assert_eq!(w.latest.to_string(), "2012-04-05 13:00:00 UTC");
        assert_eq!(w.earliest.to_string(), "2012-04-04 13:00:00 UTC");
    }

    #[test]
    fn cutoff_follows_pacific_standard_time() {
        let w = report_window(ymd(2012, 1, 10), &chrono_tz::US::Pacific, 6).unwrap();
        assert_eq!(w.latest.to_string(), "2012-01-10 14:00:00 UTC");
    }

    #[test]
    fn window_is_half_open() {
        let w = report_window(ymd(2012, 1, 10), &Utc, 6).unwrap();
        assert!(w.contains(w.earliest));
        assert!(!w.contains(w.latest));
    }

    #[test]
    fn log_offset_ignores_daylight_saving() {
        let cst = FixedOffset::west_opt(6 * 3600).unwrap();
        let summer = ymd(2012, 7, 1).and_hms_opt(12, 0, 0).unwrap();
        let winter = ymd(2012, 1, 1).and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(log_time_to_epoch(summer, cst), summer.and_utc().timestamp() + 6 * 3600);
        assert_eq!(log_time_to_epoch(winter, cst), winter.and_utc().timestamp() + 6 * 3600);
    }

    #[test]
    fn comparison_days_go_backwards() {
        let days = comparison_days(ymd(2012, 4, 10), &[1, 7]);
        assert_eq!(days, vec![ymd(2012, 4, 10), ymd(2012, 4, 9), ymd(2012, 4, 3)]);
    }
}
