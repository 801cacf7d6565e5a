//! Reward-period arithmetic. The daily quota window is anchored to a
//! configured timezone offset, not to UTC midnight.

use chrono::{DateTime, Duration, Utc};

#[derive(Clone, Copy, Debug)]
pub struct PeriodClock {
    offset_minutes: i32,
}

impl PeriodClock {
    pub fn new(offset_minutes: i32) -> Self {
        PeriodClock { offset_minutes }
    }

    /// Start of the current reward period: the most recent local midnight in
    /// the configured offset, as a UTC instant.
    pub fn period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset_secs = i64::from(self.offset_minutes) * 60;
        let into_day = (now.timestamp() + offset_secs).rem_euclid(86_400);

        now - Duration::seconds(into_day)
            - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn utc_offset_resets_at_utc_midnight() {
        let clock = PeriodClock::new(0);
        let now = utc(2026, 8, 29, 13, 45, 12);
        assert_eq!(clock.period_start(now), utc(2026, 8, 29, 0, 0, 0));
    }

    #[test]
    fn positive_offset_shifts_the_boundary_earlier() {
        // UTC+7: 20:00 UTC is already 03:00 on the 30th locally, so the
        // period began at 17:00 UTC.
        let clock = PeriodClock::new(420);
        let now = utc(2026, 8, 29, 20, 0, 0);
        assert_eq!(clock.period_start(now), utc(2026, 8, 29, 17, 0, 0));
    }

    #[test]
    fn positive_offset_before_local_midnight() {
        // UTC+7 at 10:00 UTC is 17:00 local, still the same local day that
        // started at 17:00 UTC the day before.
        let clock = PeriodClock::new(420);
        let now = utc(2026, 8, 29, 10, 0, 0);
        assert_eq!(clock.period_start(now), utc(2026, 8, 28, 17, 0, 0));
    }

    #[test]
    fn negative_offset() {
        // UTC-5: 03:00 UTC is 22:00 the previous local day, whose midnight
        // was 05:00 UTC of that previous day.
        let clock = PeriodClock::new(-300);
        let now = utc(2026, 8, 29, 3, 0, 0);
        assert_eq!(clock.period_start(now), utc(2026, 8, 28, 5, 0, 0));
    }

    #[test]
    fn subsecond_precision_is_dropped() {
        let clock = PeriodClock::new(0);
        let now = utc(2026, 8, 29, 0, 0, 0) + Duration::milliseconds(250);
        assert_eq!(clock.period_start(now), utc(2026, 8, 29, 0, 0, 0));
    }

    #[test]
    fn start_is_stable_within_a_period() {
        let clock = PeriodClock::new(420);
        let early = utc(2026, 8, 29, 17, 0, 0);
        let late = utc(2026, 8, 30, 16, 59, 59);
        assert_eq!(clock.period_start(early), clock.period_start(late));
    }
}
