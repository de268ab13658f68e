use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use std::fmt;

/// Wall-clock trigger evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Weekly { weekday: Weekday, time: NaiveTime },
    Daily { time: NaiveTime },
}

impl Trigger {
    /// Next fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Trigger::Daily { time } => {
                let candidate = now.date_naive().and_time(*time).and_utc();
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(1)
                }
            }
            Trigger::Weekly { weekday, time } => {
                let days_ahead = (7 + weekday.num_days_from_monday() as i64
                    - now.weekday().num_days_from_monday() as i64)
                    % 7;
                let candidate = (now.date_naive() + Duration::days(days_ahead))
                    .and_time(*time)
                    .and_utc();
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::weeks(1)
                }
            }
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Weekly { weekday, time } => {
                write!(f, "every {} at {} UTC", weekday, time.format("%H:%M"))
            }
            Trigger::Daily { time } => write!(f, "daily at {} UTC", time.format("%H:%M")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_weekly_later_same_week() {
        // Wednesday 2025-06-04
        let now = Utc.with_ymd_and_hms(2025, 6, 4, 9, 30, 0).unwrap();
        let trigger = Trigger::Weekly {
            weekday: Weekday::Sun,
            time: at(3, 0),
        };
        assert_eq!(
            trigger.next_after(now),
            Utc.with_ymd_and_hms(2025, 6, 8, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_weekly_exactly_at_fire_time_moves_to_next_week() {
        let now = Utc.with_ymd_and_hms(2025, 6, 8, 3, 0, 0).unwrap();
        let trigger = Trigger::Weekly {
            weekday: Weekday::Sun,
            time: at(3, 0),
        };
        assert_eq!(
            trigger.next_after(now),
            Utc.with_ymd_and_hms(2025, 6, 15, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_weekly_same_day_before_time() {
        let now = Utc.with_ymd_and_hms(2025, 6, 8, 1, 0, 0).unwrap();
        let trigger = Trigger::Weekly {
            weekday: Weekday::Sun,
            time: at(3, 0),
        };
        assert_eq!(
            trigger.next_after(now),
            Utc.with_ymd_and_hms(2025, 6, 8, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_daily_rolls_over() {
        let trigger = Trigger::Daily { time: at(12, 0) };
        let morning = Utc.with_ymd_and_hms(2025, 6, 4, 8, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2025, 6, 4, 18, 0, 0).unwrap();
        assert_eq!(
            trigger.next_after(morning),
            Utc.with_ymd_and_hms(2025, 6, 4, 12, 0, 0).unwrap()
        );
        assert_eq!(
            trigger.next_after(evening),
            Utc.with_ymd_and_hms(2025, 6, 5, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_display() {
        let trigger = Trigger::Weekly {
            weekday: Weekday::Sun,
            time: at(3, 0),
        };
        assert_eq!(trigger.to_string(), "every Sun at 03:00 UTC");
    }
}
