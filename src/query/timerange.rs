//! Time range resolution
//!
//! Turns `from`/`until` request expressions plus a timezone name into an
//! absolute `[from, until)` window in epoch seconds.
//!
//! # Accepted Expressions
//!
//! ```text
//! now, -1d, now-6h, +30min          relative to now
//! 08:00_20140226, 08:0020140226     civil time on a date
//! 20140226                          midnight on a date
//! 14:30, midnight, noon, teatime    today at that time
//! today, yesterday, tomorrow        midnight on that day
//! yesterday+12h, noon-1w            any reference plus an offset
//! 1393398000                        epoch seconds
//! ```
//!
//! Civil times are interpreted in the request timezone. An ambiguous local
//! time (DST fall back) resolves to the earlier instant, a skipped one (DST
//! spring forward) to the same wall time an hour later.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::query::error::{QueryError, QueryResult};

/// Default `from` when none is given
pub const DEFAULT_FROM: &str = "-1d";
/// Default `until` when none is given
pub const DEFAULT_UNTIL: &str = "now";

/// A resolved request window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Start, epoch seconds (inclusive)
    pub from: i64,
    /// End, epoch seconds (exclusive)
    pub until: i64,
    /// Timezone civil times were resolved in
    pub tz: Tz,
}

impl TimeWindow {
    /// Create a window; empty or inverted windows are rejected
    pub fn new(from: i64, until: i64, tz: Tz) -> QueryResult<Self> {
        if from >= until {
            return Err(QueryError::InvalidTimeRange);
        }
        Ok(Self { from, until, tz })
    }

    /// Length in seconds
    pub fn duration(&self) -> i64 {
        self.until - self.from
    }
}

/// Resolves request time expressions against a default timezone
#[derive(Debug, Clone, Copy)]
pub struct TimeRangeResolver {
    default_tz: Tz,
}

impl Default for TimeRangeResolver {
    fn default() -> Self {
        Self { default_tz: Tz::UTC }
    }
}

impl TimeRangeResolver {
    /// Create a resolver with `default_tz` for requests that name none
    pub fn new(default_tz: Tz) -> Self {
        Self { default_tz }
    }

    /// Create a resolver from a timezone name
    pub fn from_name(name: &str) -> QueryResult<Self> {
        Ok(Self::new(parse_timezone(name)?))
    }

    /// The timezone used when a request names none
    pub fn default_tz(&self) -> Tz {
        self.default_tz
    }

    /// Timezone for a request: the named one, or the default
    pub fn timezone(&self, name: Option<&str>) -> QueryResult<Tz> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => parse_timezone(name),
            None => Ok(self.default_tz),
        }
    }

    /// Resolve a full window
    pub fn resolve(
        &self,
        from: Option<&str>,
        until: Option<&str>,
        tz: Option<&str>,
        now: DateTime<Utc>,
    ) -> QueryResult<TimeWindow> {
        let tz = self.timezone(tz)?;
        let from = resolve_time("from", from.unwrap_or(DEFAULT_FROM), tz, now)?;
        let until = resolve_time("until", until.unwrap_or(DEFAULT_UNTIL), tz, now)?;
        TimeWindow::new(from, until, tz)
    }
}

/// Look a timezone up in the bundled database
pub fn parse_timezone(name: &str) -> QueryResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| QueryError::UnknownTimezone(name.to_string()))
}

/// Resolve one expression to epoch seconds; empty means the field default
pub fn resolve_time(field: &str, expr: &str, tz: Tz, now: DateTime<Utc>) -> QueryResult<i64> {
    let normalized: String = expr
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    let normalized = match normalized.as_str() {
        "" if field == "from" => DEFAULT_FROM.to_string(),
        "" => DEFAULT_UNTIL.to_string(),
        _ => normalized,
    };

    parse_time(&normalized, tz, now).ok_or_else(|| QueryError::InvalidTime {
        field: field.to_string(),
        value: expr.to_string(),
    })
}

fn parse_time(expr: &str, tz: Tz, now: DateTime<Utc>) -> Option<i64> {
    if expr.chars().all(|c| c.is_ascii_digit()) {
        if let Some(date) = parse_date(expr) {
            return Some(local_to_utc(tz, date.and_time(NaiveTime::MIN)));
        }
        return expr.parse::<i64>().ok();
    }

    let (reference, offset) = match expr.find(|c| c == '+' || c == '-') {
        Some(idx) => (&expr[..idx], Some(&expr[idx..])),
        None => (expr, None),
    };

    let base = parse_reference(reference, tz, now)?;
    let offset = match offset {
        Some(offset) => parse_offset(offset)?,
        None => 0,
    };

    base.checked_add(offset)
}

/// `YYYYMMDD` with a plausible year
fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 {
        return None;
    }
    let date = NaiveDate::parse_from_str(s, "%Y%m%d").ok()?;
    let year = s[..4].parse::<i32>().ok()?;
    (1900..=2100).contains(&year).then_some(date)
}

fn parse_clock(s: &str) -> Option<NaiveTime> {
    let (hours, minutes) = s.split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0)
}

fn parse_reference(reference: &str, tz: Tz, now: DateTime<Utc>) -> Option<i64> {
    let today = now.with_timezone(&tz).date_naive();
    let at = |date: NaiveDate, hour: u32| {
        NaiveTime::from_hms_opt(hour, 0, 0).map(|t| local_to_utc(tz, date.and_time(t)))
    };

    match reference {
        "" | "now" => return Some(now.timestamp()),
        "midnight" | "today" => return at(today, 0),
        "noon" => return at(today, 12),
        "teatime" => return at(today, 16),
        "yesterday" => return at(today.pred_opt()?, 0),
        "tomorrow" => return at(today.succ_opt()?, 0),
        _ => {}
    }

    // HH:MM, HH:MM_YYYYMMDD or HH:MMYYYYMMDD
    if let Some(colon) = reference.find(':') {
        let clock_end = (colon + 3).min(reference.len());
        let time = parse_clock(&reference[..clock_end])?;
        let rest = reference[clock_end..].trim_start_matches('_');
        let date = if rest.is_empty() {
            today
        } else {
            parse_date(rest)?
        };
        return Some(local_to_utc(tz, date.and_time(time)));
    }

    None
}

/// `[+-]<int><unit>` in seconds
fn parse_offset(offset: &str) -> Option<i64> {
    let (sign, rest) = match offset.as_bytes().first()? {
        b'-' => (-1, &offset[1..]),
        b'+' => (1, &offset[1..]),
        _ => (1, offset),
    };

    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let amount: i64 = rest[..digits_end].parse().ok()?;
    let unit = unit_seconds(&rest[digits_end..])?;

    amount.checked_mul(unit)?.checked_mul(sign)
}

/// Length of an interval string like `5min` or `1d`, in seconds
pub fn interval_seconds(interval: &str) -> Option<i64> {
    let normalized = interval.trim().to_lowercase();
    parse_offset(&normalized).map(i64::abs)
}

fn unit_seconds(unit: &str) -> Option<i64> {
    let seconds = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 7 * 86_400,
        "mon" | "month" | "months" => 30 * 86_400,
        "y" | "year" | "years" => 365 * 86_400,
        _ => return None,
    };
    Some(seconds)
}

/// Local civil time to epoch seconds, DST-aware
fn local_to_utc(tz: Tz, local: NaiveDateTime) -> i64 {
    match tz.from_local_datetime(&local).earliest() {
        Some(dt) => dt.timestamp(),
        None => {
            let shifted = local + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.timestamp())
                .unwrap_or_else(|| Utc.from_utc_datetime(&local).timestamp())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        // 2014-02-26 10:30:00 UTC
        Utc.timestamp_opt(1_393_410_600, 0).unwrap()
    }

    #[test]
    fn test_absolute_utc() {
        let resolver = TimeRangeResolver::default();
        let window = resolver
            .resolve(Some("07:00_20140226"), Some("08:00_20140226"), None, fixed_now())
            .unwrap();
        assert_eq!(window.from, 1_393_398_000);
        assert_eq!(window.until, 1_393_401_600);
        assert_eq!(window.duration(), 3600);
    }

    #[test]
    fn test_absolute_with_timezone() {
        let resolver = TimeRangeResolver::default();
        let window = resolver
            .resolve(
                Some("08:00_20140226"),
                Some("09:00_20140226"),
                Some("Europe/Berlin"),
                fixed_now(),
            )
            .unwrap();
        assert_eq!(window.from, 1_393_398_000);
        assert_eq!(window.until, 1_393_401_600);
    }

    #[test]
    fn test_default_window() {
        let now = fixed_now();
        let window = TimeRangeResolver::default()
            .resolve(None, None, None, now)
            .unwrap();
        assert_eq!(window.until, now.timestamp());
        assert_eq!(window.from, now.timestamp() - 86_400);
    }

    #[test]
    fn test_relative_offsets() {
        let now = fixed_now();
        let ts = now.timestamp();
        let tz = Tz::UTC;

        assert_eq!(resolve_time("from", "-1h", tz, now).unwrap(), ts - 3600);
        assert_eq!(resolve_time("from", "now-30min", tz, now).unwrap(), ts - 1800);
        assert_eq!(resolve_time("from", "-2w", tz, now).unwrap(), ts - 14 * 86_400);
        assert_eq!(resolve_time("from", "-1mon", tz, now).unwrap(), ts - 30 * 86_400);
        assert_eq!(resolve_time("until", "+10s", tz, now).unwrap(), ts + 10);
        assert!(resolve_time("from", "-1m", tz, now).is_err());
        assert!(resolve_time("from", "-h", tz, now).is_err());
    }

    #[test]
    fn test_interval_seconds() {
        assert_eq!(interval_seconds("5min"), Some(300));
        assert_eq!(interval_seconds("-1d"), Some(86_400));
        assert_eq!(interval_seconds("soon"), None);
        assert_eq!(interval_seconds("999999999999y"), None);
    }

    #[test]
    fn test_offset_overflow_is_invalid_time() {
        let now = fixed_now();
        let tz = Tz::UTC;

        for expr in ["-999999999999y", "now+9223372036854775807s", "+99999999999999999999s"] {
            match resolve_time("from", expr, tz, now) {
                Err(QueryError::InvalidTime { field, value }) => {
                    assert_eq!(field, "from");
                    assert_eq!(value, expr);
                }
                other => panic!("expected InvalidTime for {}, got {:?}", expr, other),
            }
        }
    }

    #[test]
    fn test_keywords() {
        let now = fixed_now();
        let tz = Tz::UTC;
        let midnight = 1_393_372_800;

        assert_eq!(resolve_time("from", "midnight", tz, now).unwrap(), midnight);
        assert_eq!(resolve_time("from", "today", tz, now).unwrap(), midnight);
        assert_eq!(resolve_time("from", "noon", tz, now).unwrap(), midnight + 12 * 3600);
        assert_eq!(resolve_time("from", "teatime", tz, now).unwrap(), midnight + 16 * 3600);
        assert_eq!(resolve_time("from", "yesterday", tz, now).unwrap(), midnight - 86_400);
        assert_eq!(
            resolve_time("from", "tomorrow+1h", tz, now).unwrap(),
            midnight + 86_400 + 3600
        );
        assert_eq!(resolve_time("from", "14:30", tz, now).unwrap(), midnight + 14 * 3600 + 1800);
    }

    #[test]
    fn test_dates_and_epochs() {
        let now = fixed_now();
        let tz = Tz::UTC;

        assert_eq!(resolve_time("from", "20140226", tz, now).unwrap(), 1_393_372_800);
        assert_eq!(resolve_time("from", "21:2020140313", tz, now).unwrap(), 1_394_745_600);
        assert_eq!(resolve_time("from", "1393398000", tz, now).unwrap(), 1_393_398_000);
        // Not a plausible date, so an epoch
        assert_eq!(resolve_time("from", "99999999", tz, now).unwrap(), 99_999_999);
    }

    #[test]
    fn test_empty_range() {
        let result = TimeRangeResolver::default().resolve(
            Some("21:2020140313"),
            Some("21:2020140313"),
            None,
            fixed_now(),
        );
        assert_eq!(result, Err(QueryError::InvalidTimeRange));
    }

    #[test]
    fn test_unknown_timezone() {
        let result = TimeRangeResolver::default().resolve(None, None, Some("Europe/Lausanne"), fixed_now());
        assert_eq!(
            result,
            Err(QueryError::UnknownTimezone("Europe/Lausanne".to_string()))
        );
    }

    #[test]
    fn test_invalid_expression() {
        let err = resolve_time("until", "bogus", Tz::UTC, fixed_now()).unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidTime {
                field: "until".to_string(),
                value: "bogus".to_string(),
            }
        );
    }

    #[test]
    fn test_dst_transitions() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        let now = fixed_now();

        // 2014-03-30 02:30 does not exist in Berlin; shifted to 03:30 CEST
        assert_eq!(
            resolve_time("from", "02:30_20140330", tz, now).unwrap(),
            1_396_143_000
        );
        // 2014-10-26 02:30 happens twice; the earlier (CEST) one wins
        assert_eq!(
            resolve_time("from", "02:30_20141026", tz, now).unwrap(),
            1_414_283_400
        );
    }
}
