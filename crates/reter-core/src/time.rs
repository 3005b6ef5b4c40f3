//! Time-of-day values for daily triggers
//!
//! Accepted grammar is `HH-MM` or `HH-MM-SS`. Upper bounds are inclusive
//! (`24` hours, `60` minutes or seconds are accepted); such values roll over
//! into the next unit when the target instant is computed, so `24-00` is
//! midnight of the following day.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone};
use std::fmt;
use std::str::FromStr;

use crate::error::SchedulerError;

const MAX_HOUR: u32 = 24;
const MAX_MINUTE: u32 = 60;
const MAX_SECOND: u32 = 60;

/// Wall-clock time of day a daily task fires at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeOfDay {
    /// Hour, `0..=24`
    pub hour: u32,
    /// Minute, `0..=60`
    pub minute: u32,
    /// Second, `0..=60`
    pub second: u32,
}

impl TimeOfDay {
    /// Build a time of day, checking the inclusive bounds
    pub fn new(hour: u32, minute: u32, second: u32) -> Result<Self, SchedulerError> {
        check_range("hour", hour, MAX_HOUR)?;
        check_range("minute", minute, MAX_MINUTE)?;
        check_range("second", second, MAX_SECOND)?;
        Ok(Self {
            hour,
            minute,
            second,
        })
    }

    /// Parse `HH-MM` or `HH-MM-SS`
    pub fn parse(value: &str) -> Result<Self, SchedulerError> {
        let parts: Vec<&str> = value.split('-').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(SchedulerError::InvalidTimeFormat(format!(
                "'{}': expected HH-MM or HH-MM-SS",
                value
            )));
        }

        let hour = parse_field("hour", parts[0])?;
        let minute = parse_field("minute", parts[1])?;
        let second = match parts.get(2) {
            Some(raw) => parse_field("second", raw)?,
            None => 0,
        };

        Self::new(hour, minute, second)
    }

    fn offset_from_midnight(&self) -> Duration {
        Duration::hours(i64::from(self.hour))
            + Duration::minutes(i64::from(self.minute))
            + Duration::seconds(i64::from(self.second))
    }

    /// Next instant at this time of day, never earlier than `now`
    ///
    /// Today's occurrence is returned if it has not passed yet, otherwise the
    /// same wall-clock time 24 hours later. Times that roll over past
    /// midnight (`24-30`) first consider yesterday's occurrence, which lands
    /// early today.
    pub fn next_occurrence<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN);
        let offset = self.offset_from_midnight();
        let day = Duration::hours(24);

        if offset >= day {
            let carried = resolve_local(&now.timezone(), midnight - day + offset);
            if carried >= *now {
                return carried;
            }
        }

        let target = resolve_local(&now.timezone(), midnight + offset);

        if target < *now {
            target + Duration::hours(24)
        } else {
            target
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}-{:02}", self.hour, self.minute, self.second)
    }
}

fn parse_field(field: &str, raw: &str) -> Result<u32, SchedulerError> {
    raw.parse::<u32>().map_err(|e| {
        SchedulerError::InvalidTimeFormat(format!("failed to parse {} '{}': {}", field, raw, e))
    })
}

fn check_range(field: &str, value: u32, max: u32) -> Result<(), SchedulerError> {
    if value > max {
        return Err(SchedulerError::InvalidTimeFormat(format!(
            "wrong {} value {}, should be >= 0 and <= {}",
            field, value, max
        )));
    }
    Ok(())
}

/// Map a local wall-clock time onto `tz`, stepping over DST gaps
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    }
}
