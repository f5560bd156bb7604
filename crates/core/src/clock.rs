//! Time source and rolling-interval arithmetic.
//!
//! Rolling start numbers count 10-minute intervals since the Unix epoch.

use time::{Duration, OffsetDateTime, Time};

/// Seconds in one rolling interval.
pub const ROLLING_INTERVAL_SECS: i64 = 600;

/// Source of "now" for a run. Engines read the clock once per run.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardClock;

impl Clock for StandardClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Midnight (UTC) of the day containing `at`.
pub fn start_of_day(at: OffsetDateTime) -> OffsetDateTime {
    at.to_offset(time::UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

/// Rolling interval number containing `at`.
pub fn rolling_number(at: OffsetDateTime) -> i32 {
    (at.unix_timestamp() / ROLLING_INTERVAL_SECS) as i32
}

/// Rolling start number of the day containing `at`.
pub fn rolling_start_number(at: OffsetDateTime) -> i32 {
    rolling_number(start_of_day(at))
}

/// Rolling start number `days` days before the day containing `at`.
pub fn rolling_start_number_days_ago(at: OffsetDateTime, days: i64) -> i32 {
    rolling_start_number(at - Duration::days(days))
}

/// Seconds since the Unix epoch, as carried in export headers.
pub fn unix_seconds(at: OffsetDateTime) -> u64 {
    at.unix_timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn rolling_start_is_day_aligned() {
        let at = datetime!(2020-11-16 15:14:13 UTC);
        let rsn = rolling_start_number(at);
        assert_eq!(rsn % 144, 0);
        assert_eq!(rsn, rolling_number(datetime!(2020-11-16 00:00:00 UTC)));
    }

    #[test]
    fn days_ago_steps_by_144() {
        let at = datetime!(2020-11-16 15:14:13 UTC);
        assert_eq!(
            rolling_start_number(at) - rolling_start_number_days_ago(at, 2),
            288
        );
    }

    #[test]
    fn fixed_clock_is_stable() {
        let clock = FixedClock(datetime!(2021-01-01 12:00:00 UTC));
        assert_eq!(clock.now(), clock.now());
    }
}
