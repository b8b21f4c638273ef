//! Schedule expression evaluation
//!
//! Answers "when does this job fire next?" for the two expression forms the
//! engine accepts:
//!
//! - cron, 5 fields (standard crontab), or 6/7 fields with seconds and an
//!   optional year;
//! - fixed intervals: `every 90s`, `@every 5m`, `every 3600`.
//!
//! Cron fields are evaluated in the job's IANA timezone and the result is
//! converted back to UTC. Evaluation is a pure function of
//! (expression, timezone, reference instant).

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A parsed, evaluatable schedule.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Cron expression evaluated in a fixed timezone
    Cron {
        /// Parsed expression
        schedule: cron::Schedule,
        /// Zone the cron fields refer to
        timezone: Tz,
    },
    /// Fixed interval measured from the reference instant
    Interval {
        /// Time between fires
        period: Duration,
    },
}

impl Schedule {
    /// Parse an expression with an optional IANA timezone (default UTC).
    pub fn parse(expression: &str, timezone: Option<&str>) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(Error::schedule(expression, "empty expression"));
        }

        if let Some(body) = interval_body(expression) {
            let period = parse_interval(body).ok_or_else(|| {
                Error::schedule(
                    expression,
                    "expected a duration like '90s', '5m', '2h', or '1d'",
                )
            })?;
            return Ok(Self::Interval { period });
        }

        let timezone = match timezone {
            Some(name) => Tz::from_str(name).map_err(|e| {
                Error::schedule(expression, format!("unknown timezone '{name}': {e}"))
            })?,
            None => Tz::UTC,
        };

        let normalized = normalize_cron(expression)?;
        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| Error::schedule(expression, e.to_string()))?;

        Ok(Self::Cron { schedule, timezone })
    }

    /// Next fire time strictly after `after`, or `None` if the schedule has
    /// no future occurrence.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { schedule, timezone } => {
                let local = after.with_timezone(timezone);
                schedule.after(&local).next().map(|next| next.with_timezone(&Utc))
            }
            Self::Interval { period } => after.checked_add_signed(*period),
        }
    }
}

/// Returns the duration body of an interval expression, if it is one.
fn interval_body(expression: &str) -> Option<&str> {
    let body = expression.strip_prefix('@').unwrap_or(expression);
    let (head, rest) = body.split_once(char::is_whitespace)?;
    if head.eq_ignore_ascii_case("every") {
        Some(rest.trim())
    } else {
        None
    }
}

fn parse_interval(body: &str) -> Option<Duration> {
    let (digits, unit) = match body.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => body.split_at(idx),
        // Bare number: seconds
        None => (body, "s"),
    };
    let value: i64 = digits.parse().ok()?;
    if value <= 0 {
        return None;
    }
    let seconds = match unit.trim() {
        "s" => value,
        "m" => value.checked_mul(60)?,
        "h" => value.checked_mul(3_600)?,
        "d" => value.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::seconds(seconds))
}

/// Standard crontab syntax omits the seconds field the `cron` crate expects;
/// prepend an exact `0` so `*/5 * * * *` means "on the minute".
fn normalize_cron(expression: &str) -> Result<String> {
    let field_count = expression.split_whitespace().count();
    match field_count {
        5 => Ok(format!("0 {expression}")),
        6 | 7 => Ok(expression.to_string()),
        _ => Err(Error::schedule(
            expression,
            format!("expected 5, 6, or 7 fields, got {field_count}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_five_field_cron_fires_on_the_minute() {
        let schedule = Schedule::parse("*/5 * * * *", None).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 12, 1, 30).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 12, 5, 0).unwrap());
    }

    #[test]
    fn test_six_field_cron_passes_through() {
        let schedule = Schedule::parse("30 0 9 * * *", None).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 30).unwrap());
    }

    #[test]
    fn test_cron_respects_timezone() {
        // 9 AM in New York is 13:00 UTC during daylight saving time.
        let schedule = Schedule::parse("0 9 * * *", Some("America/New_York")).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 6, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_next_is_strictly_after_reference() {
        let schedule = Schedule::parse("0 * * * *", None).unwrap();
        let on_the_hour = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let next = schedule.next_after(on_the_hour).unwrap();
        assert!(next > on_the_hour);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_interval_forms() {
        for expr in ["every 90s", "@every 90s", "every 90"] {
            let schedule = Schedule::parse(expr, None).unwrap();
            let after = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
            assert_eq!(
                schedule.next_after(after).unwrap(),
                after + Duration::seconds(90),
                "expression {expr:?}"
            );
        }

        let schedule = Schedule::parse("every 2h", None).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(after).unwrap(),
            after + Duration::hours(2)
        );
    }

    #[test]
    fn test_invalid_field_count_rejected() {
        let err = Schedule::parse("* * * *", None).unwrap_err();
        assert!(err.to_string().contains("expected 5, 6, or 7 fields"));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let err = Schedule::parse("0 9 * * *", Some("Mars/Olympus")).unwrap_err();
        assert!(err.to_string().contains("unknown timezone"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Schedule::parse("every 0s", None).is_err());
        assert!(Schedule::parse("every -5m", None).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Schedule::parse("every fortnight", None).is_err());
        assert!(Schedule::parse("", None).is_err());
    }
}
