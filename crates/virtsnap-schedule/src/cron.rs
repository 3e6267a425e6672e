//! Cron parsing and next-run math for snapshot schedules
//!
//! Schedules accept standard five-field cron expressions plus the named
//! shortcuts `@hourly`, `@daily`, `@weekly`, `@monthly`, `@yearly`. All
//! expressions are interpreted in UTC, unconditionally.
//!
//! The `cron` crate expects a leading seconds field, so five-field input is
//! normalized by pinning seconds to zero. Activation therefore happens at
//! second 0 of a matching minute.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike, Utc};

use virtsnap_common::Error;

/// Parse a schedule's cron expression.
///
/// Returns a validation error naming the schedule when the expression does
/// not parse; the caller surfaces it through `status.error` and an
/// `InvalidCronExpression` event.
pub fn parse_cron(schedule: &str, expr: &str) -> Result<::cron::Schedule, Error> {
    let normalized = normalize(expr);
    ::cron::Schedule::from_str(&normalized).map_err(|e| {
        Error::validation_for(schedule, format!("invalid cron expression {:?}: {}", expr, e))
    })
}

/// Pin seconds to zero for five-field expressions; descriptors and
/// already-six-field expressions pass through unchanged.
fn normalize(expr: &str) -> Cow<'_, str> {
    let trimmed = expr.trim();
    if !trimmed.starts_with('@') && trimmed.split_whitespace().count() == 5 {
        Cow::Owned(format!("0 {}", trimmed))
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Compute the next instant at which the schedule should fire.
///
/// With a recorded `last_snapshot_time`, the next run is the first
/// activation strictly after it. On the first run ever, the clock starts
/// one second before the floor of the current minute, so a brand-new
/// schedule whose cron matches the current minute fires promptly on first
/// reconcile instead of waiting a full period.
pub fn next_run(
    schedule: &::cron::Schedule,
    last_snapshot_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let from = match last_snapshot_time {
        Some(last) => last,
        None => minute_floor(now) - Duration::seconds(1),
    };
    next_after(schedule, from)
}

/// First activation strictly after `from`.
pub fn next_after(schedule: &::cron::Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&from).next()
}

fn minute_floor(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|x| x.with_nanosecond(0))
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_five_field() {
        assert!(parse_cron("s1", "* * * * *").is_ok());
        assert!(parse_cron("s1", "0 2 * * *").is_ok());
        assert!(parse_cron("s1", "*/10 * * * *").is_ok());
        assert!(parse_cron("s1", "30 4 1 * 0").is_ok());
    }

    #[test]
    fn test_parse_shortcuts() {
        for expr in ["@hourly", "@daily", "@weekly", "@monthly", "@yearly"] {
            assert!(parse_cron("s1", expr).is_ok(), "{expr} should parse");
        }
    }

    #[test]
    fn test_parse_invalid() {
        let err = parse_cron("s1", "not a cron").unwrap_err();
        assert!(err.to_string().contains("invalid cron expression"));
        assert!(err.to_string().contains("s1"));
        assert!(parse_cron("s1", "61 * * * *").is_err());
        assert!(parse_cron("s1", "").is_err());
    }

    #[test]
    fn test_first_run_fires_within_matching_minute() {
        // A brand-new every-minute schedule reconciled mid-minute must be
        // due immediately rather than waiting for the next minute boundary.
        let schedule = parse_cron("s1", "* * * * *").unwrap();
        let now = utc(2024, 1, 1, 0, 0, 30);
        let next = next_run(&schedule, None, now).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 0, 0, 0));
        assert!(now >= next);
    }

    #[test]
    fn test_first_run_waits_when_minute_does_not_match() {
        let schedule = parse_cron("s1", "@hourly").unwrap();
        let now = utc(2024, 1, 1, 0, 30, 30);
        let next = next_run(&schedule, None, now).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 1, 0, 0));
        assert!(now < next);
    }

    #[test]
    fn test_next_run_after_last_snapshot_time() {
        let schedule = parse_cron("s1", "* * * * *").unwrap();
        let last = utc(2024, 1, 1, 0, 0, 30);
        let next = next_run(&schedule, Some(last), utc(2024, 1, 1, 0, 0, 35)).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 0, 1, 0));
    }

    #[test]
    fn test_next_run_is_strictly_after_last() {
        // An activation exactly at the recorded fire time must not repeat.
        let schedule = parse_cron("s1", "@hourly").unwrap();
        let last = utc(2024, 1, 1, 1, 0, 0);
        let next = next_run(&schedule, Some(last), utc(2024, 1, 1, 1, 0, 5)).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 2, 0, 0));
    }

    #[test]
    fn test_daily_shortcut_equivalent_to_midnight() {
        let daily = parse_cron("s1", "@daily").unwrap();
        let explicit = parse_cron("s1", "0 0 * * *").unwrap();
        let from = utc(2024, 3, 10, 13, 45, 0);
        assert_eq!(next_after(&daily, from), next_after(&explicit, from));
    }
}
