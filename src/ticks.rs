//! 100-nanosecond tick arithmetic over wall-clock instants.
//!
//! The on-disk format and all adjacency rules count time in 100 ns ticks
//! since the Unix epoch. `chrono` instants carry full nanosecond precision,
//! so the conversion in both directions is exact for tick-quantized values.

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc};

/// Number of 100 ns ticks in one second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Nanoseconds in one tick.
pub const NANOS_PER_TICK: i64 = 100;

/// Convert an instant to ticks since the Unix epoch, truncating any
/// sub-tick nanoseconds.
pub fn to_ticks(t: DateTime<Utc>) -> i64 {
    t.timestamp() * TICKS_PER_SECOND + i64::from(t.timestamp_subsec_nanos()) / NANOS_PER_TICK
}

/// Convert ticks since the Unix epoch back to an instant.
pub fn from_ticks(ticks: i64) -> DateTime<Utc> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;
    // Every i64 tick count maps into chrono's representable range.
    DateTime::from_timestamp(secs, nanos).expect("tick count outside chrono range")
}

/// Shift an instant by a signed number of ticks.
pub fn add_ticks(t: DateTime<Utc>, ticks: i64) -> DateTime<Utc> {
    from_ticks(to_ticks(t) + ticks)
}

/// The last tick of the calendar day containing `t`
/// (`23:59:59.9999999` wall-clock).
pub fn end_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    let next_midnight = t
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or(t.date_naive())
        .and_time(NaiveTime::MIN)
        .and_utc();
    add_ticks(next_midnight, -1)
}

/// First tick of the given calendar month.
pub fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let date = chrono::NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(date.and_time(NaiveTime::MIN).and_utc())
}

/// Last tick of the given calendar month (`23:59:59.9999999` of its final day).
pub fn month_end(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Some(add_ticks(month_start(next_year, next_month)?, -1))
}

/// The `(year, month)` pair a candle belongs to, keyed on its open time.
pub fn year_month(t: DateTime<Utc>) -> (i32, u32) {
    (t.year(), t.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tick_round_trip() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 45).unwrap();
        assert_eq!(from_ticks(to_ticks(t)), t);

        let with_subsec = t + chrono::Duration::nanoseconds(9_999_900);
        assert_eq!(from_ticks(to_ticks(with_subsec)), with_subsec);
    }

    #[test]
    fn test_tick_truncates_sub_tick_nanos() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(150);
        // 150 ns is 1.5 ticks; the conversion floors to 1 tick.
        assert_eq!(to_ticks(t) % TICKS_PER_SECOND, 1);
    }

    #[test]
    fn test_pre_epoch_round_trip() {
        let t = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        assert!(to_ticks(t) < 0);
        assert_eq!(from_ticks(to_ticks(t)), t);
    }

    #[test]
    fn test_end_of_day() {
        let noon = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let eod = end_of_day(noon);
        let midnight = Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 0).unwrap();
        assert_eq!(to_ticks(midnight) - to_ticks(eod), 1);
    }

    #[test]
    fn test_month_bounds_are_one_tick_apart() {
        let june_end = month_end(2025, 6).unwrap();
        let july_start = month_start(2025, 7).unwrap();
        assert_eq!(to_ticks(july_start) - to_ticks(june_end), 1);

        let dec_end = month_end(2025, 12).unwrap();
        let jan_start = month_start(2026, 1).unwrap();
        assert_eq!(to_ticks(jan_start) - to_ticks(dec_end), 1);
    }
}
