// Property-based tests for schedule parsing and configuration loading

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use common::config::{LogFormat, Settings};
use common::schedule::{next_fire_time, parse_timezone, ScheduleParser};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use tempfile::TempDir;

fn instant() -> impl Strategy<Value = DateTime<Utc>> {
    // 2020-01-01 .. 2035-01-01
    (1_577_836_800i64..2_051_222_400i64).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

proptest! {
    /// Any in-range five-field expression parses, and its next firing lands on
    /// the requested minute and hour at second zero, strictly after the reference
    #[test]
    fn property_fixed_time_expressions_fire_on_time(
        minute in 0u32..60,
        hour in 0u32..24,
        after in instant(),
    ) {
        let expression = format!("{} {} * * *", minute, hour);
        let schedule = ScheduleParser::standard().parse(&expression).unwrap();

        let next = next_fire_time(&schedule, chrono_tz::UTC, after).unwrap();
        prop_assert!(next > after);
        prop_assert!(next - after <= chrono::Duration::days(1));
        prop_assert_eq!(next.minute(), minute);
        prop_assert_eq!(next.hour(), hour);
        prop_assert_eq!(next.second(), 0);
    }

    /// Numeric weekdays follow standard cron numbering where 0 and 7 are Sunday
    #[test]
    fn property_day_of_week_uses_standard_numbering(
        day in 0u32..=7,
        after in instant(),
    ) {
        let expression = format!("0 12 * * {}", day);
        let schedule = ScheduleParser::standard().parse(&expression).unwrap();

        let next = next_fire_time(&schedule, chrono_tz::UTC, after).unwrap();
        prop_assert_eq!(next.weekday().num_days_from_sunday(), day % 7);
    }

    /// A rule restricting both day fields fires on the first day matching
    /// either of them, found here by scanning forward one day at a time
    #[test]
    fn property_day_fields_fire_on_union(
        day in 1u32..=28,
        weekday in 0u32..=6,
        after in instant(),
    ) {
        let expression = format!("0 9 {} * {}", day, weekday);
        let schedule = ScheduleParser::standard().parse(&expression).unwrap();

        let next = next_fire_time(&schedule, chrono_tz::UTC, after).unwrap();
        prop_assert!(next.day() == day || next.weekday().num_days_from_sunday() == weekday);

        let expected = (0..40)
            .filter_map(|offset| {
                let date = after.date_naive() + chrono::Duration::days(offset);
                let candidate = date.and_hms_opt(9, 0, 0)?.and_utc();
                let matches = date.day() == day || date.weekday().num_days_from_sunday() == weekday;
                (matches && candidate > after).then_some(candidate)
            })
            .next();
        prop_assert_eq!(Some(next), expected);
    }

    /// A stepped single weekday covers every later day of the week
    #[test]
    fn property_weekday_step_runs_to_end_of_week(
        start in 0u32..=6,
        step in 1u32..=3,
        after in instant(),
    ) {
        let expression = format!("0 12 * * {}/{}", start, step);
        let schedule = ScheduleParser::standard().parse(&expression).unwrap();

        let expected: BTreeSet<u32> = (start..=6).step_by(step as usize).collect();
        let week_end = after + chrono::Duration::days(7);
        let mut fired = BTreeSet::new();
        let mut cursor = after;
        while let Some(next) = next_fire_time(&schedule, chrono_tz::UTC, cursor) {
            if next > week_end {
                break;
            }
            fired.insert(next.weekday().num_days_from_sunday());
            cursor = next;
        }
        prop_assert_eq!(fired, expected);
    }

    #[test]
    fn property_out_of_range_minute_is_rejected(minute in 60u32..1000) {
        let expression = format!("{} * * * *", minute);
        prop_assert!(ScheduleParser::standard().parse(&expression).is_err());
    }

    #[test]
    fn property_out_of_range_hour_is_rejected(hour in 24u32..1000) {
        let expression = format!("0 {} * * *", hour);
        prop_assert!(ScheduleParser::standard().parse(&expression).is_err());
    }

    /// A seconds field is only accepted by the seconds-aware parser
    #[test]
    fn property_seconds_field_requires_opt_in(second in 0u32..60, minute in 0u32..60) {
        let expression = format!("{} {} * * * *", second, minute);
        prop_assert!(ScheduleParser::standard().parse(&expression).is_err());
        prop_assert!(ScheduleParser::with_seconds().parse(&expression).is_ok());
    }

    /// Parsing is a pure function of the expression text
    #[test]
    fn property_parsing_is_deterministic(
        expression in prop::sample::select(vec![
            "*/5 * * * *",
            "0 9 * * 1-5",
            "30 17 1,15 * *",
            "@hourly",
            "@daily",
            "@weekly",
            "not a schedule",
            "* * *",
        ]),
        after in instant(),
    ) {
        let parser = ScheduleParser::standard();
        match (parser.parse(expression), parser.parse(expression)) {
            (Ok(a), Ok(b)) => prop_assert_eq!(
                next_fire_time(&a, chrono_tz::UTC, after),
                next_fire_time(&b, chrono_tz::UTC, after)
            ),
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            _ => prop_assert!(false, "parse result changed between calls"),
        }
    }

    /// Values written to a config file are what `load_from_path` returns
    #[test]
    fn property_config_file_values_are_loaded(
        max_concurrent_jobs in 1usize..500,
        timeout_seconds in 1u64..7200,
        reconcile_interval_seconds in 1u64..3600,
        timezone in prop::sample::select(vec!["UTC", "Asia/Ho_Chi_Minh", "Europe/Berlin"]),
    ) {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            format!(
                r#"
[database]
url = "postgresql://localhost/property_test"
max_connections = 5
min_connections = 1
connect_timeout_seconds = 10

[scheduler]
max_concurrent_jobs = {}
job_execution_timeout_seconds = {}
reconcile_interval_seconds = {}
timezone = "{}"

[observability]
log_level = "debug"
log_format = "pretty"
"#,
                max_concurrent_jobs, timeout_seconds, reconcile_interval_seconds, timezone
            ),
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        prop_assert!(settings.validate().is_ok());
        prop_assert_eq!(settings.scheduler.max_concurrent_jobs, max_concurrent_jobs);
        prop_assert_eq!(settings.scheduler.job_execution_timeout_seconds, timeout_seconds);
        prop_assert_eq!(settings.scheduler.reconcile_interval_seconds, reconcile_interval_seconds);
        prop_assert_eq!(settings.scheduler.timezone.as_str(), timezone);
        prop_assert_eq!(settings.observability.log_format, LogFormat::Pretty);
        prop_assert!(settings.scheduler.enabled);
    }
}

#[test]
fn test_descriptors_match_their_expansions() {
    let parser = ScheduleParser::standard();
    let after = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
    let pairs = [
        ("@hourly", "0 * * * *"),
        ("@daily", "0 0 * * *"),
        ("@midnight", "0 0 * * *"),
        ("@weekly", "0 0 * * 0"),
        ("@monthly", "0 0 1 * *"),
        ("@yearly", "0 0 1 1 *"),
        ("@annually", "0 0 1 1 *"),
    ];

    for (descriptor, expansion) in pairs {
        let a = parser.parse(descriptor).unwrap();
        let b = parser.parse(expansion).unwrap();
        assert_eq!(
            next_fire_time(&a, chrono_tz::UTC, after),
            next_fire_time(&b, chrono_tz::UTC, after),
            "{} should behave like {}",
            descriptor,
            expansion
        );
    }
}

#[test]
fn test_schedule_is_evaluated_in_configured_timezone() {
    let tz = parse_timezone("Asia/Ho_Chi_Minh").unwrap();
    let schedule = ScheduleParser::standard().parse("0 9 * * *").unwrap();
    let after = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    // 09:00 in UTC+7 is 02:00 UTC
    let next = next_fire_time(&schedule, tz, after).unwrap();
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap());
}

#[test]
fn test_missing_config_directory_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_from_path(dir.path().join("absent")).unwrap();

    assert_eq!(settings.scheduler.max_concurrent_jobs, 10);
    assert_eq!(settings.scheduler.job_execution_timeout_seconds, 600);
    assert_eq!(settings.scheduler.timezone, "UTC");
    assert_eq!(settings.observability.log_format, LogFormat::Json);
}
