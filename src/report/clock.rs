//! Run timestamps in Japan Standard Time

use chrono::{DateTime, FixedOffset, Utc};

/// JST has no daylight saving, so a fixed +09:00 offset is exact
const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Date and time labels of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunClock {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM:SS`
    pub time: String,
    /// RFC 3339 with the +09:00 offset
    pub timestamp: String,
}

impl RunClock {
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        let jst = match FixedOffset::east_opt(JST_OFFSET_SECS) {
            Some(offset) => now.with_timezone(&offset),
            None => now.fixed_offset(),
        };

        Self {
            date: jst.format("%Y-%m-%d").to_string(),
            time: jst.format("%H:%M:%S").to_string(),
            timestamp: jst.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_jst_parts() {
        let now = Utc.with_ymd_and_hms(2026, 2, 15, 0, 34, 56).unwrap();
        let clock = RunClock::at(now);

        assert_eq!(clock.date, "2026-02-15");
        assert_eq!(clock.time, "09:34:56");
        assert_eq!(clock.timestamp, "2026-02-15T09:34:56+09:00");
    }

    #[test]
    fn test_jst_rolls_date_forward() {
        let now = Utc.with_ymd_and_hms(2026, 2, 15, 15, 0, 0).unwrap();
        let clock = RunClock::at(now);

        assert_eq!(clock.date, "2026-02-16");
        assert_eq!(clock.time, "00:00:00");
    }

    #[test]
    fn test_timestamp_is_the_same_instant() {
        let now = Utc.with_ymd_and_hms(2026, 12, 31, 20, 15, 0).unwrap();
        let clock = RunClock::at(now);

        assert_eq!(clock.date, "2027-01-01");
        let parsed = DateTime::parse_from_rfc3339(&clock.timestamp).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), JST_OFFSET_SECS);
        assert_eq!(parsed.with_timezone(&Utc), now);
    }
}
