// Schedule parsing and next-fire calculation
//
// Job definitions carry standard five-field cron expressions
// (minute hour day-of-month month day-of-week). The `cron` crate expects a
// leading seconds field and numbers weekdays 1-7 starting at Sunday, so
// expressions are normalised before being handed to it. Rules restricting
// both day fields fire when either matches, as in standard cron.

use crate::errors::ScheduleError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Parser for job recurrence rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleParser {
    /// Accept an optional leading seconds field (six fields)
    with_seconds: bool,
}

impl ScheduleParser {
    /// Parser for standard five-field expressions and `@` descriptors
    pub fn standard() -> Self {
        Self {
            with_seconds: false,
        }
    }

    /// Parser that additionally accepts a leading seconds field
    pub fn with_seconds() -> Self {
        Self { with_seconds: true }
    }

    pub fn accepts_seconds(&self) -> bool {
        self.with_seconds
    }

    /// Parse and validate a recurrence rule
    pub fn parse(&self, expression: &str) -> Result<Recurrence, ScheduleError> {
        let schedules = self
            .normalize(expression)?
            .iter()
            .map(|normalized| {
                CronSchedule::from_str(normalized).map_err(|e| invalid(expression, e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Recurrence { schedules })
    }

    /// Rewrite a recurrence rule into the seconds-first dialect of the cron crate
    ///
    /// Returns two expressions when both day fields are restricted, one
    /// carrying each day field.
    fn normalize(&self, expression: &str) -> Result<Vec<String>, ScheduleError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(invalid(expression, "empty expression"));
        }

        if trimmed.starts_with('@') {
            return descriptor(trimmed)
                .map(|d| vec![d.to_string()])
                .ok_or_else(|| invalid(expression, "unrecognized descriptor"));
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let (seconds, rest) = match fields.len() {
            5 => ("0", &fields[..]),
            6 if self.with_seconds => (fields[0], &fields[1..]),
            n => {
                let expected = if self.with_seconds { "5 or 6" } else { "5" };
                return Err(invalid(
                    expression,
                    format!("expected {} fields, found {}", expected, n),
                ));
            }
        };

        let (minute, hour, day_of_month, month) = (rest[0], rest[1], rest[2], rest[3]);
        let day_of_week = translate_day_of_week(rest[4])
            .map_err(|reason| invalid(expression, reason))?;
        let line = |dom: &str, dow: &str| {
            format!("{} {} {} {} {} {}", seconds, minute, hour, dom, month, dow)
        };

        // Standard cron fires when either day field matches; the cron crate
        // requires both, so the two restrictions become separate schedules
        if is_restricted(day_of_month) && is_restricted(rest[4]) {
            Ok(vec![line(day_of_month, "*"), line("*", &day_of_week)])
        } else {
            Ok(vec![line(day_of_month, &day_of_week)])
        }
    }
}

/// Parsed recurrence rule
///
/// Usually a single cron schedule. A rule restricting both day-of-month and
/// day-of-week holds one schedule per day field and fires on the union.
#[derive(Debug, Clone)]
pub struct Recurrence {
    schedules: Vec<CronSchedule>,
}

impl Recurrence {
    /// Next occurrence strictly after `after`, evaluated in `timezone`
    pub fn next_after(&self, timezone: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&timezone);
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(&local).next())
            .min()
            .map(|next| next.with_timezone(&Utc))
    }

    /// True if the rule fires on either day field rather than both
    pub fn is_day_union(&self) -> bool {
        self.schedules.len() > 1
    }
}

/// A day field restricts the match unless it starts with `*` or `?`
fn is_restricted(field: &str) -> bool {
    !(field.starts_with('*') || field.starts_with('?'))
}

fn invalid(expression: &str, reason: impl Into<String>) -> ScheduleError {
    ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn descriptor(name: &str) -> Option<&'static str> {
    match name {
        "@yearly" | "@annually" => Some("0 0 0 1 1 *"),
        "@monthly" => Some("0 0 0 1 * *"),
        // Sunday is 1 in the cron crate
        "@weekly" => Some("0 0 0 * * 1"),
        "@daily" | "@midnight" => Some("0 0 0 * * *"),
        "@hourly" => Some("0 0 * * * *"),
        _ => None,
    }
}

/// Map standard weekday numbers (0-7, both 0 and 7 are Sunday) onto 1-7
///
/// `*` based steps are left alone since shifting every value by one keeps the
/// same weekdays selected. Named days pass through untouched.
fn translate_day_of_week(field: &str) -> Result<String, String> {
    let mut parts = Vec::new();

    for token in field.split(',') {
        if token.is_empty() {
            return Err("empty day-of-week list entry".to_string());
        }
        let (base, step) = match token.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (token, None),
        };

        if base == "*" || base == "?" || base.chars().any(|c| c.is_ascii_alphabetic()) {
            parts.push(token.to_string());
            continue;
        }

        let has_step = step.is_some();
        let step = match step {
            Some(s) => s
                .parse::<u32>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| format!("invalid day-of-week step '{}'", s))?,
            None => 1,
        };

        let (start, end) = match base.split_once('-') {
            Some((a, b)) => (parse_weekday(a)?, parse_weekday(b)?),
            // "n/step" runs to the end of the week
            None if has_step => (parse_weekday(base)?, 6),
            None => {
                let day = parse_weekday(base)?;
                (day, day)
            }
        };
        if start > end {
            return Err(format!("invalid day-of-week range '{}'", base));
        }

        let days: BTreeSet<u32> = (start..=end)
            .step_by(step as usize)
            .map(|day| day % 7 + 1)
            .collect();
        parts.extend(days.into_iter().map(|d| d.to_string()));
    }

    Ok(parts.join(","))
}

fn parse_weekday(value: &str) -> Result<u32, String> {
    value
        .parse::<u32>()
        .ok()
        .filter(|day| *day <= 7)
        .ok_or_else(|| format!("invalid day-of-week value '{}'", value))
}

/// Calculate the next fire time strictly after `after`, evaluated in `timezone`
pub fn next_fire_time(
    recurrence: &Recurrence,
    timezone: Tz,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    recurrence.next_after(timezone, after)
}

/// Parse a timezone name such as `UTC` or `Asia/Ho_Chi_Minh`
pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    Tz::from_str(name).map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_parse_valid_five_field_expression() {
        let parser = ScheduleParser::standard();
        assert!(parser.parse("0 9 * * *").is_ok());
        assert!(parser.parse("*/15 * * * *").is_ok());
        assert!(parser.parse("30 4 1,15 * 1-5").is_ok());
    }

    #[test]
    fn test_parse_invalid_expression() {
        let parser = ScheduleParser::standard();
        assert!(parser.parse("invalid").is_err());
        assert!(parser.parse("").is_err());
        assert!(parser.parse("61 * * * *").is_err());
        assert!(parser.parse("* * * *").is_err());
        assert!(parser.parse("* * * * 8").is_err());
    }

    #[test]
    fn test_six_fields_require_seconds_parser() {
        assert!(ScheduleParser::standard().parse("* * * * * *").is_err());
        assert!(ScheduleParser::with_seconds().parse("* * * * * *").is_ok());
        assert!(ScheduleParser::with_seconds().parse("0 9 * * *").is_ok());
    }

    #[test]
    fn test_descriptors() {
        let parser = ScheduleParser::standard();
        for name in ["@yearly", "@annually", "@monthly", "@weekly", "@daily", "@midnight", "@hourly"] {
            assert!(parser.parse(name).is_ok(), "{} should parse", name);
        }
        assert!(parser.parse("@every 5m").is_err());
    }

    #[test]
    fn test_daily_at_nine() {
        let schedule = ScheduleParser::standard().parse("0 9 * * *").unwrap();
        let next = next_fire_time(&schedule, chrono_tz::UTC, at(2024, 3, 10, 8, 30)).unwrap();
        assert_eq!(next, at(2024, 3, 10, 9, 0));

        let after_nine = next_fire_time(&schedule, chrono_tz::UTC, at(2024, 3, 10, 9, 0)).unwrap();
        assert_eq!(after_nine, at(2024, 3, 11, 9, 0));
    }

    #[test]
    fn test_sunday_is_zero_and_seven() {
        let parser = ScheduleParser::standard();
        // 2024-03-11 is a Monday
        let from = at(2024, 3, 11, 0, 0);
        for expr in ["0 12 * * 0", "0 12 * * 7", "0 12 * * SUN"] {
            let schedule = parser.parse(expr).unwrap();
            let next = next_fire_time(&schedule, chrono_tz::UTC, from).unwrap();
            assert_eq!(next.weekday(), Weekday::Sun, "{}", expr);
            assert_eq!(next.hour(), 12);
        }
    }

    #[test]
    fn test_weekday_range() {
        let schedule = ScheduleParser::standard().parse("0 8 * * 1-5").unwrap();
        // Saturday morning rolls to Monday
        let next = next_fire_time(&schedule, chrono_tz::UTC, at(2024, 3, 16, 9, 0)).unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn test_day_of_month_and_weekday_fire_on_either() {
        let schedule = ScheduleParser::standard().parse("0 9 1 * 1").unwrap();
        assert!(schedule.is_day_union());

        // 2024-03-02 is a Saturday: the next Monday comes before April 1st
        let next = next_fire_time(&schedule, chrono_tz::UTC, at(2024, 3, 2, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 3, 4, 9, 0));

        // From the last Monday of March, April 1st (also a Monday) is next
        let next = next_fire_time(&schedule, chrono_tz::UTC, at(2024, 3, 25, 10, 0)).unwrap();
        assert_eq!(next, at(2024, 4, 1, 9, 0));

        // 2024-05-01 is a Wednesday and still fires through the day-of-month field
        let next = next_fire_time(&schedule, chrono_tz::UTC, at(2024, 4, 29, 10, 0)).unwrap();
        assert_eq!(next, at(2024, 5, 1, 9, 0));
    }

    #[test]
    fn test_starred_day_field_keeps_intersection() {
        let parser = ScheduleParser::standard();
        assert!(!parser.parse("0 9 * * 1").unwrap().is_day_union());
        assert!(!parser.parse("0 9 1 * *").unwrap().is_day_union());
        // A stepped star still counts as unrestricted
        let schedule = parser.parse("0 9 */2 * 1").unwrap();
        assert!(!schedule.is_day_union());
        // 2024-03-11 is a Monday on an odd day of month
        let next = next_fire_time(&schedule, chrono_tz::UTC, at(2024, 3, 10, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 3, 11, 9, 0));
    }

    #[test]
    fn test_weekday_step_runs_to_end_of_week() {
        let schedule = ScheduleParser::standard().parse("0 9 * * 1/1").unwrap();
        // Sunday rolls to Monday, and Saturday still fires
        let next = next_fire_time(&schedule, chrono_tz::UTC, at(2024, 3, 10, 0, 0)).unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
        let next = next_fire_time(&schedule, chrono_tz::UTC, at(2024, 3, 15, 10, 0)).unwrap();
        assert_eq!(next.weekday(), Weekday::Sat);
    }

    #[test]
    fn test_translate_day_of_week() {
        assert_eq!(translate_day_of_week("*").unwrap(), "*");
        assert_eq!(translate_day_of_week("*/2").unwrap(), "*/2");
        assert_eq!(translate_day_of_week("0").unwrap(), "1");
        assert_eq!(translate_day_of_week("1-5").unwrap(), "2,3,4,5,6");
        assert_eq!(translate_day_of_week("5-7").unwrap(), "1,6,7");
        assert_eq!(translate_day_of_week("1/2").unwrap(), "2,4,6");
        assert_eq!(translate_day_of_week("1/1").unwrap(), "2,3,4,5,6,7");
        assert_eq!(translate_day_of_week("5/1").unwrap(), "6,7");
        assert_eq!(translate_day_of_week("MON-FRI").unwrap(), "MON-FRI");
        assert!(translate_day_of_week("5-1").is_err());
        assert!(translate_day_of_week("1,,2").is_err());
    }

    #[test]
    fn test_timezone_is_respected() {
        let schedule = ScheduleParser::standard().parse("0 9 * * *").unwrap();
        let tz = parse_timezone("Asia/Ho_Chi_Minh").unwrap();
        // 09:00 in UTC+7 is 02:00 UTC
        let next = next_fire_time(&schedule, tz, at(2024, 3, 10, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 3, 10, 2, 0));
    }

    #[test]
    fn test_invalid_timezone() {
        assert_eq!(
            parse_timezone("Mars/Olympus"),
            Err(ScheduleError::InvalidTimezone("Mars/Olympus".to_string()))
        );
    }
}
