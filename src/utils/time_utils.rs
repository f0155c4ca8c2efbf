use {
    crate::domain::BucketUnit,
    chrono::{DateTime, Datelike, Months, NaiveDate, Utc},
};

/// Epoch milliseconds, UTC.
pub type Timestamp = i64;

pub type AppInstant = std::time::Instant;

pub struct TimeUtils;

impl TimeUtils {
    pub const MS_IN_S: i64 = 1000;
    pub const MS_IN_MIN: i64 = Self::MS_IN_S * 60;
    pub const MS_IN_H: i64 = Self::MS_IN_MIN * 60;
    pub const MS_IN_D: i64 = Self::MS_IN_H * 24;
    pub const MS_IN_W: i64 = Self::MS_IN_D * 7;
    pub const STANDARD_TIME_FORMAT: &str = "%Y-%m-%d";
    pub const MINUTE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
}

impl BucketUnit {
    /// Length of one unit when it is a fixed duration.
    pub fn fixed_ms(self) -> Option<i64> {
        match self {
            BucketUnit::Minute => Some(TimeUtils::MS_IN_MIN),
            BucketUnit::Hour => Some(TimeUtils::MS_IN_H),
            BucketUnit::Day => Some(TimeUtils::MS_IN_D),
            BucketUnit::Week => Some(TimeUtils::MS_IN_W),
            BucketUnit::Month | BucketUnit::Quarter | BucketUnit::Year => None,
        }
    }

    fn calendar_months(self) -> i64 {
        match self {
            BucketUnit::Quarter => 3,
            BucketUnit::Year => 12,
            _ => 1,
        }
    }
}

// Time Helper functions

fn to_utc(ts: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn epoch_ms_to_utc(epoch_ms: Timestamp) -> String {
    // Used for display purposes
    to_utc(epoch_ms)
        .format(TimeUtils::STANDARD_TIME_FORMAT)
        .to_string()
}

pub fn epoch_ms_to_utc_minutes(epoch_ms: Timestamp) -> String {
    to_utc(epoch_ms)
        .format(TimeUtils::MINUTE_TIME_FORMAT)
        .to_string()
}

pub fn now_timestamp_ms() -> Timestamp {
    Utc::now().timestamp_millis()
}

pub fn format_duration(ms: i64) -> String {
    let secs = ms / 1000;
    if secs < 60 {
        return format!("{}s", secs);
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{}m", mins);
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }
    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }
    let months = days / 30;
    if months < 12 {
        return format!("{}M", months);
    }
    let years = months / 12;
    let rem_months = months % 12;
    format!("{}Y {}M", years, rem_months)
}

fn add_months(ts: Timestamp, months: i64) -> Timestamp {
    let dt = to_utc(ts);
    let count = Months::new(months.unsigned_abs().min(u32::MAX as u64) as u32);
    let shifted = if months >= 0 {
        dt.checked_add_months(count)
    } else {
        dt.checked_sub_months(count)
    };
    shifted.unwrap_or(dt).timestamp_millis()
}

/// Whole calendar months from `earlier` to `later`, truncated toward zero.
fn months_between(later: Timestamp, earlier: Timestamp) -> i64 {
    let (l, e) = (to_utc(later), to_utc(earlier));
    let mut months =
        (l.year() as i64 - e.year() as i64) * 12 + l.month() as i64 - e.month() as i64;
    if months > 0 && add_months(earlier, months) > later {
        months -= 1;
    } else if months < 0 && add_months(earlier, months) < later {
        months += 1;
    }
    months
}

/// Shifts `ts` by `amount` units, saturating at the timestamp limits.
/// Calendar units keep the day of month where possible.
pub fn add_units(unit: BucketUnit, ts: Timestamp, amount: i64) -> Timestamp {
    match unit.fixed_ms() {
        Some(ms) => ts.saturating_add(amount.saturating_mul(ms)),
        None => add_months(ts, amount.saturating_mul(unit.calendar_months())),
    }
}

/// Whole units from `earlier` to `later`, truncated toward zero.
pub fn diff_in_units(unit: BucketUnit, later: Timestamp, earlier: Timestamp) -> i64 {
    match unit.fixed_ms() {
        Some(ms) => later.saturating_sub(earlier) / ms,
        None => months_between(later, earlier) / unit.calendar_months(),
    }
}

fn start_of_year(year: i32) -> Option<Timestamp> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Start of the week containing `ts`. `days_after_week_start` is how far
/// 1970-01-01 (a Thursday) sits from the first day of the week.
fn start_of_week(ts: Timestamp, days_after_week_start: i64) -> Timestamp {
    let days = ts.div_euclid(TimeUtils::MS_IN_D);
    (days - (days + days_after_week_start).rem_euclid(7)) * TimeUtils::MS_IN_D
}

/// Start of the enclosing period that buckets of `unit` are counted from.
///
/// Minutes count from the hour, hours from the day, days from a Sunday week,
/// weeks from a Monday week, months and quarters from the year, years from the decade.
pub fn start_of_parent(unit: BucketUnit, ts: Timestamp) -> Timestamp {
    match unit {
        BucketUnit::Minute => ts - ts.rem_euclid(TimeUtils::MS_IN_H),
        BucketUnit::Hour => ts - ts.rem_euclid(TimeUtils::MS_IN_D),
        BucketUnit::Day => start_of_week(ts, 4),
        BucketUnit::Week => start_of_week(ts, 3),
        BucketUnit::Month | BucketUnit::Quarter => {
            start_of_year(to_utc(ts).year()).unwrap_or(ts)
        }
        BucketUnit::Year => {
            let year = to_utc(ts).year();
            start_of_year(year - year.rem_euclid(10)).unwrap_or(ts)
        }
    }
}

/// Start of the `multiplier`-unit bucket containing `ts`.
pub fn align_to_bucket(unit: BucketUnit, multiplier: u32, ts: Timestamp) -> Timestamp {
    let multiplier = multiplier.max(1) as i64;
    let start = start_of_parent(unit, ts);
    let steps = diff_in_units(unit, ts, start).max(0) / multiplier;
    add_units(unit, start, steps * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn aligns_fixed_units() {
        assert_eq!(
            align_to_bucket(BucketUnit::Minute, 15, utc(2024, 1, 3, 10, 37)),
            utc(2024, 1, 3, 10, 30)
        );
        assert_eq!(
            align_to_bucket(BucketUnit::Hour, 4, utc(2024, 1, 1, 13, 30)),
            utc(2024, 1, 1, 12, 0)
        );
    }

    #[test]
    fn days_count_from_sunday_and_weeks_from_monday() {
        // 2024-01-03 is a Wednesday.
        let wednesday = utc(2024, 1, 3, 10, 0);
        assert_eq!(align_to_bucket(BucketUnit::Day, 1, wednesday), utc(2024, 1, 3, 0, 0));
        assert_eq!(align_to_bucket(BucketUnit::Day, 3, wednesday), utc(2024, 1, 3, 0, 0));
        assert_eq!(
            align_to_bucket(BucketUnit::Day, 3, utc(2024, 1, 2, 10, 0)),
            utc(2023, 12, 31, 0, 0)
        );
        assert_eq!(align_to_bucket(BucketUnit::Week, 1, wednesday), utc(2024, 1, 1, 0, 0));
    }

    #[test]
    fn aligns_calendar_units() {
        assert_eq!(
            align_to_bucket(BucketUnit::Month, 1, utc(2024, 3, 15, 8, 0)),
            utc(2024, 3, 1, 0, 0)
        );
        assert_eq!(
            align_to_bucket(BucketUnit::Quarter, 1, utc(2024, 5, 10, 0, 0)),
            utc(2024, 4, 1, 0, 0)
        );
        assert_eq!(
            align_to_bucket(BucketUnit::Year, 1, utc(2024, 6, 1, 0, 0)),
            utc(2024, 1, 1, 0, 0)
        );
    }

    #[test]
    fn calendar_arithmetic_truncates() {
        let jan = utc(2024, 1, 1, 0, 0);
        assert_eq!(add_units(BucketUnit::Month, jan, 2), utc(2024, 3, 1, 0, 0));
        assert_eq!(add_units(BucketUnit::Quarter, jan, -1), utc(2023, 10, 1, 0, 0));
        assert_eq!(diff_in_units(BucketUnit::Month, utc(2024, 5, 10, 0, 0), jan), 4);
        assert_eq!(diff_in_units(BucketUnit::Month, utc(2024, 4, 30, 0, 0), jan), 3);
        assert_eq!(diff_in_units(BucketUnit::Month, jan, utc(2024, 5, 10, 0, 0)), -4);
        assert_eq!(diff_in_units(BucketUnit::Year, utc(2026, 1, 1, 0, 0), jan), 2);
        assert_eq!(diff_in_units(BucketUnit::Minute, jan + 90_000, jan), 1);
    }

    #[test]
    fn bucket_steps_saturate_at_the_timestamp_limits() {
        let near_end = Timestamp::MAX - 10;
        assert_eq!(add_units(BucketUnit::Minute, near_end, 1), Timestamp::MAX);
        assert_eq!(add_units(BucketUnit::Hour, Timestamp::MIN + 10, -1), Timestamp::MIN);
        assert_eq!(add_units(BucketUnit::Day, 0, i64::MAX), Timestamp::MAX);
        assert_eq!(
            diff_in_units(BucketUnit::Minute, Timestamp::MAX, Timestamp::MIN),
            i64::MAX / TimeUtils::MS_IN_MIN
        );
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(45_000), "45s");
        assert_eq!(format_duration(3 * TimeUtils::MS_IN_H), "3h");
        assert_eq!(epoch_ms_to_utc_minutes(utc(2024, 1, 3, 10, 5)), "2024-01-03 10:05");
    }
}
