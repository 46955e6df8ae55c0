//! Reminder time resolution
//!
//! Everything here works in one configured IANA zone rather than the host's
//! local zone, so the same reminder resolves to the same instant wherever the
//! server is deployed.

use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::DosewatchError;

const TIME_OF_DAY_FORMAT: &str = "%H:%M";

fn time_of_day_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| Regex::new(r"^[0-9]{2}:[0-9]{2}$").expect("valid HH:MM pattern"))
}

/// Parse a strict 24-hour `HH:MM` string.
///
/// Two-digit hour 00-23, colon, two-digit minute 00-59. Seconds, `am`/`pm`
/// suffixes, single-digit hours and surrounding whitespace are all rejected.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, DosewatchError> {
    if !time_of_day_shape().is_match(s) {
        return Err(DosewatchError::InvalidTimeFormat(s.to_string()));
    }
    NaiveTime::parse_from_str(s, TIME_OF_DAY_FORMAT)
        .map_err(|_| DosewatchError::InvalidTimeFormat(s.to_string()))
}

/// Format an instant as the `HH:MM` matching key in its own zone.
pub fn format_time_of_day(at: &DateTime<Tz>) -> String {
    at.format(TIME_OF_DAY_FORMAT).to_string()
}

/// Map a wall-clock date/time in `tz` to an instant.
///
/// Ambiguous local times (clocks falling back) take the earlier instant.
/// Local times skipped by a DST gap move one hour forward.
fn localize(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

/// Next occurrence of `time_of_day` at or after `now`, in `now`'s zone.
///
/// Today's occurrence is used unless it is strictly earlier than `now`, in
/// which case the calendar date advances by one day.
pub fn resolve_next(time_of_day: &str, now: &DateTime<Tz>) -> Result<DateTime<Tz>, DosewatchError> {
    let time = parse_time_of_day(time_of_day)?;
    let tz = now.timezone();
    let today = now.date_naive();

    let candidate = localize(&tz, today, time)
        .ok_or_else(|| DosewatchError::InvalidTimeFormat(time_of_day.to_string()))?;
    if candidate >= *now {
        return Ok(candidate);
    }

    today
        .succ_opt()
        .and_then(|tomorrow| localize(&tz, tomorrow, time))
        .ok_or_else(|| DosewatchError::InvalidTimeFormat(time_of_day.to_string()))
}

// ============================================================================
// Clock
// ============================================================================

/// Source of the current instant. Injected so tests can pin "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests and simulations.
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.lock().unwrap_or_else(|e| e.into_inner()) = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// ReminderSchedule
// ============================================================================

/// The configured zone reminders are scheduled and matched in.
#[derive(Debug, Clone, Copy)]
pub struct ReminderSchedule {
    tz: Tz,
}

impl ReminderSchedule {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn from_zone_name(name: &str) -> Result<Self, DosewatchError> {
        let tz = name
            .parse::<Tz>()
            .map_err(|e| DosewatchError::StartupConfig(format!("unknown timezone {:?}: {}", name, e)))?;
        Ok(Self::new(tz))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    pub fn now(&self, clock: &dyn Clock) -> DateTime<Tz> {
        self.localize(clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use chrono_tz::Asia::Karachi;
    use chrono_tz::Europe::Berlin;
    use proptest::prelude::*;

    fn karachi(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Tz> {
        Karachi.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_parse_accepts_strict_24_hour_times() {
        assert_eq!(parse_time_of_day("00:00").unwrap(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(parse_time_of_day("09:05").unwrap(), NaiveTime::from_hms_opt(9, 5, 0).unwrap());
        assert_eq!(parse_time_of_day("23:59").unwrap(), NaiveTime::from_hms_opt(23, 59, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_malformed_times() {
        for bad in ["", "25:00", "24:00", "12:60", "9:00", "9:00am", "09:00pm", "09:00:00", " 09:00", "0900", "ab:cd", "٠٩:٠٠"] {
            match parse_time_of_day(bad) {
                Err(DosewatchError::InvalidTimeFormat(input)) => assert_eq!(input, bad),
                other => panic!("expected InvalidTimeFormat for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_resolve_next_later_today() {
        let now = karachi(2026, 10, 18, 8, 59, 0);
        let next = resolve_next("09:00", &now).unwrap();
        assert_eq!(next, karachi(2026, 10, 18, 9, 0, 0));
    }

    #[test]
    fn test_resolve_next_rolls_to_tomorrow_when_passed() {
        let now = karachi(2026, 10, 18, 9, 1, 0);
        let next = resolve_next("09:00", &now).unwrap();
        assert_eq!(next, karachi(2026, 10, 19, 9, 0, 0));
    }

    #[test]
    fn test_resolve_next_exact_minute_is_today() {
        let now = karachi(2026, 10, 18, 9, 0, 0);
        assert_eq!(resolve_next("09:00", &now).unwrap(), now);
    }

    #[test]
    fn test_resolve_next_seconds_past_the_minute_rolls_over() {
        let now = karachi(2026, 10, 18, 9, 0, 30);
        let next = resolve_next("09:00", &now).unwrap();
        assert_eq!(next.day(), 19);
    }

    #[test]
    fn test_resolve_next_crosses_month_and_year_boundaries() {
        let now = karachi(2026, 12, 31, 23, 30, 0);
        let next = resolve_next("07:15", &now).unwrap();
        assert_eq!(next, karachi(2027, 1, 1, 7, 15, 0));
    }

    #[test]
    fn test_resolve_next_keeps_the_zone_of_now() {
        let now = karachi(2026, 10, 18, 12, 0, 0);
        let next = resolve_next("13:00", &now).unwrap();
        assert_eq!(next.timezone(), Karachi);
        assert_eq!(next.to_rfc3339(), "2026-10-18T13:00:00+05:00");
    }

    #[test]
    fn test_resolve_next_invalid_time_fails() {
        let now = karachi(2026, 10, 18, 12, 0, 0);
        assert!(matches!(resolve_next("25:00", &now), Err(DosewatchError::InvalidTimeFormat(_))));
        assert!(matches!(resolve_next("", &now), Err(DosewatchError::InvalidTimeFormat(_))));
    }

    #[test]
    fn test_rollover_uses_calendar_day_across_dst_change() {
        // Berlin falls back on 2026-10-25, so that day is 25 hours long.
        let now = Berlin.with_ymd_and_hms(2026, 10, 24, 9, 30, 0).unwrap();
        let next = resolve_next("09:00", &now).unwrap();
        assert_eq!(next, Berlin.with_ymd_and_hms(2026, 10, 25, 9, 0, 0).unwrap());
        assert_eq!((next - now).num_minutes(), 24 * 60 + 30);
    }

    #[test]
    fn test_ambiguous_local_time_takes_earlier_instant() {
        let now = Berlin.with_ymd_and_hms(2026, 10, 25, 0, 0, 0).unwrap();
        let next = resolve_next("02:30", &now).unwrap();
        assert_eq!(next.to_rfc3339(), "2026-10-25T02:30:00+02:00");
    }

    #[test]
    fn test_gap_local_time_moves_forward_one_hour() {
        // 02:30 does not exist in Berlin on 2026-03-29.
        let now = Berlin.with_ymd_and_hms(2026, 3, 29, 0, 0, 0).unwrap();
        let next = resolve_next("02:30", &now).unwrap();
        assert_eq!(next.to_rfc3339(), "2026-03-29T03:30:00+02:00");
    }

    #[test]
    fn test_schedule_from_zone_name() {
        let schedule = ReminderSchedule::from_zone_name("Asia/Karachi").unwrap();
        assert_eq!(schedule.timezone(), Karachi);

        match ReminderSchedule::from_zone_name("Mars/Olympus_Mons") {
            Err(DosewatchError::StartupConfig(msg)) => assert!(msg.contains("Mars/Olympus_Mons")),
            other => panic!("expected StartupConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_schedule_now_uses_configured_zone() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 9, 29, 0).unwrap());
        let schedule = ReminderSchedule::new(Karachi);
        let now = schedule.now(&clock);
        assert_eq!(format_time_of_day(&now), "14:29");
    }

    #[test]
    fn test_fixed_clock_set() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let later = Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    proptest! {
        #[test]
        fn test_resolve_next_is_never_before_now(
            secs in 0i64..4_102_444_800i64,
            hour in 0u32..24,
            minute in 0u32..60,
            use_utc in any::<bool>(),
        ) {
            let instant = DateTime::from_timestamp(secs, 0).unwrap();
            let tz: Tz = if use_utc { chrono_tz::UTC } else { Karachi };
            let now = instant.with_timezone(&tz);
            let time_of_day = format!("{:02}:{:02}", hour, minute);

            let next = resolve_next(&time_of_day, &now).unwrap();

            prop_assert!(next >= now, "next {} is before now {}", next, now);
            prop_assert_eq!(next.hour(), hour);
            prop_assert_eq!(next.minute(), minute);
            prop_assert_eq!(next.second(), 0);
            let today = now.date_naive();
            prop_assert!(
                next.date_naive() == today || Some(next.date_naive()) == today.succ_opt(),
                "next {} is neither on {} nor the day after", next, today
            );
        }
    }
}
