//! Unit tests for cron parsing and fire-time computation

use backup_runner::managers::scheduler::{schedule_from_expression, Schedule};
use backup_runner::utils::cron::{parse_interval, validate_cron_schedule};
use backup_runner::utils::{CronParseError, CronSchedule};
use chrono::{DateTime, TimeZone, Utc};
use rstest::rstest;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

#[rstest]
#[case("0 2 * * *")]
#[case("*/15 * * * *")]
#[case("0 0 1,15 * *")]
#[case("30 4 * * mon-fri")]
#[case("0 3 * jan-mar sun")]
#[case("0 0 * * 7")]
#[case("@daily")]
#[case("@weekly")]
#[case("  0 2 * * *  ")]
fn test_valid_expressions(#[case] expression: &str) {
    assert!(validate_cron_schedule(expression), "{} should parse", expression);
}

#[rstest]
#[case("")]
#[case("0 2 * *")]
#[case("0 2 * * * *")]
#[case("60 * * * *")]
#[case("* 24 * * *")]
#[case("* * 0 * *")]
#[case("* * * 13 *")]
#[case("5-1 * * * *")]
#[case("*/0 * * * *")]
#[case("@sometimes")]
#[case("not a cron")]
fn test_invalid_expressions(#[case] expression: &str) {
    assert!(!validate_cron_schedule(expression), "{} should be rejected", expression);
}

#[test]
fn test_field_count_error() {
    assert_eq!(CronSchedule::parse("0 2 *"), Err(CronParseError::FieldCount(3)));
}

#[rstest]
#[case("0 2 * * *", utc(2024, 1, 1, 0, 0), utc(2024, 1, 1, 2, 0))]
#[case("0 2 * * *", utc(2024, 1, 1, 2, 0), utc(2024, 1, 2, 2, 0))]
#[case("*/15 * * * *", utc(2024, 1, 1, 0, 7), utc(2024, 1, 1, 0, 15))]
#[case("0 0 * * 0", utc(2024, 1, 1, 0, 0), utc(2024, 1, 7, 0, 0))]
#[case("0 9 1 * *", utc(2024, 1, 15, 0, 0), utc(2024, 2, 1, 9, 0))]
#[case("@hourly", utc(2024, 1, 1, 0, 30), utc(2024, 1, 1, 1, 0))]
#[case("30 4 * * mon-fri", utc(2024, 1, 5, 5, 0), utc(2024, 1, 8, 4, 30))]
#[case("0 0 29 2 *", utc(2024, 3, 1, 0, 0), utc(2028, 2, 29, 0, 0))]
#[case("0 0 */2 * 1", utc(2024, 1, 1, 0, 0), utc(2024, 1, 3, 0, 0))]
#[case("0 0 * * 1", utc(2024, 1, 1, 0, 0), utc(2024, 1, 8, 0, 0))]
#[case("1/4294967295 * * * *", utc(2024, 1, 1, 0, 1), utc(2024, 1, 1, 1, 1))]
#[case("59 23 31 12 *", utc(2024, 12, 31, 23, 59), utc(2025, 12, 31, 23, 59))]
fn test_next_fire(#[case] expression: &str, #[case] after: DateTime<Utc>, #[case] expected: DateTime<Utc>) {
    let schedule = CronSchedule::parse(expression).unwrap().with_utc(true);
    assert_eq!(schedule.next_after(&after), Some(expected));
    assert_eq!(Schedule::next_after(&schedule, after), Some(expected));
}

#[test]
fn test_never_firing_expression() {
    let schedule = CronSchedule::parse("0 0 31 2 *").unwrap().with_utc(true);
    assert_eq!(Schedule::next_after(&schedule, utc(2024, 1, 1, 0, 0)), None);
}

#[test]
fn test_upcoming_is_strictly_increasing() {
    let schedule = CronSchedule::parse("0 */6 * * *").unwrap();
    let times = schedule.upcoming(&utc(2024, 1, 1, 1, 0), 4);
    assert_eq!(
        times,
        vec![
            utc(2024, 1, 1, 6, 0),
            utc(2024, 1, 1, 12, 0),
            utc(2024, 1, 1, 18, 0),
            utc(2024, 1, 2, 0, 0),
        ]
    );
}

#[test]
fn test_describe_mentions_time_zone() {
    let schedule = CronSchedule::parse("@daily").unwrap();
    assert!(schedule.describe().contains("local time"));
    assert!(schedule.with_utc(true).describe().contains("UTC"));
}

#[rstest]
#[case("@every 6h", 6 * 3600)]
#[case("@every 1h30m", 5400)]
#[case("@EVERY 45s", 45)]
#[case("@every 500ms", 1)]
fn test_every_schedules(#[case] expression: &str, #[case] seconds: i64) {
    let schedule = schedule_from_expression(expression, false).unwrap();
    let start = utc(2024, 1, 1, 0, 0);
    assert_eq!(
        schedule.upcoming(start, 2),
        vec![
            start + chrono::Duration::seconds(seconds),
            start + chrono::Duration::seconds(2 * seconds),
        ]
    );
}

#[rstest]
#[case("@every")]
#[case("@every six hours")]
#[case("@every -1h")]
#[case("@every 3d")]
fn test_invalid_every_schedules(#[case] expression: &str) {
    assert!(schedule_from_expression(expression, false).is_err());
}

#[test]
fn test_every_is_not_a_cron_expression() {
    assert!(CronSchedule::parse("@every 6h").is_err());
    assert_eq!(parse_interval("6h").unwrap().as_secs(), 6 * 3600);
}
