use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A calendar month, the unit of analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnalysisPeriod {
    year: i32,
    month: u32,
}

impl AnalysisPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The month `now` falls in, in `now`'s own timezone.
    pub fn containing<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First instant of the month, UTC.
    pub fn start_utc(&self) -> DateTime<Utc> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default();
        Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
    }

    /// Half-open UTC window [first of month, first of next month).
    pub fn bounds_utc(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start_utc(), self.next().start_utc())
    }

    /// The last `n` months ending with the one containing `now`, oldest first.
    pub fn recent<Tz: TimeZone>(now: &DateTime<Tz>, n: usize) -> Vec<Self> {
        let mut periods = Vec::with_capacity(n);
        let mut cursor = Self::containing(now);
        for _ in 0..n {
            periods.push(cursor);
            cursor = cursor.previous();
        }
        periods.reverse();
        periods
    }
}

impl fmt::Display for AnalysisPeriod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Monday 00:00 of the week containing `now`, in `now`'s timezone.
pub fn week_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let days = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date_naive() - Duration::days(days);

    now.timezone()
        .from_local_datetime(&monday.and_time(NaiveTime::MIN))
        .earliest()
        .unwrap_or_else(|| now.clone() - Duration::days(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_new_rejects_invalid_month() {
        assert!(AnalysisPeriod::new(2026, 0).is_none());
        assert!(AnalysisPeriod::new(2026, 13).is_none());
        assert!(AnalysisPeriod::new(2026, 12).is_some());
    }

    #[test]
    fn test_previous_and_next_wrap_years() {
        let jan = AnalysisPeriod::new(2026, 1).unwrap();
        assert_eq!(jan.previous(), AnalysisPeriod::new(2025, 12).unwrap());
        let dec = AnalysisPeriod::new(2025, 12).unwrap();
        assert_eq!(dec.next(), jan);
    }

    #[test]
    fn test_bounds_are_half_open_month() {
        let (start, end) = AnalysisPeriod::new(2026, 12).unwrap().bounds_utc();
        assert_eq!(start.to_rfc3339(), "2026-12-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2027-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_recent_is_ascending() {
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        let periods: Vec<String> = AnalysisPeriod::recent(&now, 4)
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(periods, vec!["2025-11", "2025-12", "2026-01", "2026-02"]);
    }

    #[test]
    fn test_week_start_is_monday_midnight() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();

        // Saturday 2026-10-17 15:30 -> Monday 2026-10-12 00:00
        let saturday = tz.with_ymd_and_hms(2026, 10, 17, 15, 30, 0).unwrap();
        assert_eq!(
            week_start(&saturday),
            tz.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap()
        );

        // Sunday belongs to the week that started six days earlier
        let sunday = tz.with_ymd_and_hms(2026, 10, 18, 23, 59, 0).unwrap();
        assert_eq!(
            week_start(&sunday),
            tz.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap()
        );

        let monday = tz.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        assert_eq!(week_start(&monday), monday);
    }
}
