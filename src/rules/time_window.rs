//! `TimeWindow`: a minute-granularity, weekday-scoped, timezone-aware
//! recurring window, including the midnight-wrap semantics.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// A recurring daily window, active on a subset of weekdays, in `timezone`.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
    pub days_of_week: HashSet<Weekday>,
    pub timezone: Tz,
}

impl TimeWindow {
    pub fn new(
        start_hour: u32,
        start_minute: u32,
        end_hour: u32,
        end_minute: u32,
        days_of_week: HashSet<Weekday>,
        timezone: Tz,
    ) -> Self {
        Self {
            start_hour,
            start_minute,
            end_hour,
            end_minute,
            days_of_week,
            timezone,
        }
    }

    /// Is this window active at instant `now`, evaluated in `self.timezone`?
    ///
    /// A window where `end < start` wraps past midnight; the day-of-week
    /// check applies to the day the window *begins*, so a `Mon 22:00-06:00`
    /// window is still active Tuesday 04:00.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        let start_minutes = self.start_hour * 60 + self.start_minute;
        let end_minutes = self.end_hour * 60 + self.end_minute;
        let now_minutes = local.hour() * 60 + local.minute();
        let today = local.weekday();

        if start_minutes <= end_minutes {
            self.days_of_week.contains(&today) && now_minutes >= start_minutes && now_minutes < end_minutes
        } else {
            let yesterday = today.pred();
            (self.days_of_week.contains(&today) && now_minutes >= start_minutes)
                || (self.days_of_week.contains(&yesterday) && now_minutes < end_minutes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> TimeWindow {
        let mut days = HashSet::new();
        days.insert(Weekday::Mon);
        TimeWindow::new(22, 0, 6, 0, days, chrono_tz::UTC)
    }

    #[test]
    fn active_before_midnight_on_start_day() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap(); // Monday
        assert!(window().is_active(now));
    }

    #[test]
    fn active_after_midnight_on_following_day() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 4, 0, 0).unwrap(); // Tuesday
        assert!(window().is_active(now));
    }

    #[test]
    fn inactive_outside_window_next_day() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(); // Tuesday
        assert!(!window().is_active(now));
    }
}
