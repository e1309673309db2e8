//! Cron expression parsing and next-fire computation
//!
//! Supports the standard 5-field format (`minute hour day-of-month month day-of-week`),
//! lists, ranges, steps, month and weekday names, and the `@daily`-style descriptors.
//! Day-of-month and day-of-week follow the usual cron rule: when both are restricted
//! a day matches if either field matches. A field is unrestricted only when it
//! contains a bare `*` (or `*/1`); `*/2` counts as restricted.
//!
//! `@every <duration>` is not a cron expression; [`parse_interval`] handles its
//! duration part.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

/// How far ahead `next_after` searches before giving up on an expression
const SEARCH_YEARS: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronParseError {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),

    #[error("unknown descriptor: {0}")]
    UnknownDescriptor(String),

    #[error("invalid {field} field '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid interval '{value}': {reason}")]
    InvalidInterval { value: String, reason: String },
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[] };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ],
};
// 7 is accepted as an alias for Sunday and folded into 0 after parsing
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
};

/// A parsed cron schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
    utc: bool,
}

impl CronSchedule {
    /// Parse a 5-field cron expression or a descriptor such as `@daily`
    pub fn parse(expression: &str) -> Result<Self, CronParseError> {
        let trimmed = expression.trim();
        let fields_text = if trimmed.starts_with('@') {
            expand_descriptor(trimmed)?
        } else {
            trimmed
        };

        let fields: Vec<&str> = fields_text.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount(fields.len()));
        }

        let mut days_of_week = parse_field(&DAY_OF_WEEK, fields[4])?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: trimmed.to_string(),
            minutes: parse_field(&MINUTE, fields[0])?,
            hours: parse_field(&HOUR, fields[1])?,
            days_of_month: parse_field(&DAY_OF_MONTH, fields[2])?,
            months: parse_field(&MONTH, fields[3])?,
            days_of_week,
            dom_restricted: !is_wildcard(fields[2]),
            dow_restricted: !is_wildcard(fields[4]),
            utc: false,
        })
    }

    /// Evaluate the schedule in UTC instead of the host's local time
    pub fn with_utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }

    pub fn is_utc(&self) -> bool {
        self.utc
    }

    /// The expression this schedule was parsed from
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`, in the same time zone.
    ///
    /// Wall-clock times skipped by a DST transition are not fired; repeated ones
    /// fire once, at the earlier instant. Returns `None` when the expression has no
    /// occurrence within the search window (e.g. `0 0 30 2 *`).
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let local = after.naive_local();
        let limit_year = local.year() + SEARCH_YEARS;

        let mut candidate = local.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);

        loop {
            let naive = self.next_naive(candidate, limit_year)?;
            match tz.from_local_datetime(&naive) {
                LocalResult::Single(t) if t > *after => return Some(t),
                LocalResult::Ambiguous(earliest, _) if earliest > *after => return Some(earliest),
                _ => candidate = naive + Duration::minutes(1),
            }
        }
    }

    /// The next `count` fire times after `after`
    pub fn upcoming<Tz: TimeZone>(&self, after: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = after.clone();

        while times.len() < count {
            match self.next_after(&cursor) {
                Some(next) => {
                    cursor = next.clone();
                    times.push(next);
                }
                None => break,
            }
        }

        times
    }

    fn next_naive(&self, mut t: NaiveDateTime, limit_year: i32) -> Option<NaiveDateTime> {
        loop {
            if t.year() > limit_year {
                return None;
            }

            if !has_bit(self.months, t.month()) {
                t = first_of_next_month(t.date())?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            if !self.matches_day(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            if !has_bit(self.hours, t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }

            if !has_bit(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }

            return Some(t);
        }
    }

    fn matches_day(&self, date: NaiveDate) -> bool {
        let dom = has_bit(self.days_of_month, date.day());
        let dow = has_bit(self.days_of_week, date.weekday().num_days_from_sunday());

        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = CronParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Validate cron schedule syntax
pub fn validate_cron_schedule(schedule: &str) -> bool {
    CronSchedule::parse(schedule).is_ok()
}

fn expand_descriptor(descriptor: &str) -> Result<&'static str, CronParseError> {
    match descriptor.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Ok("0 0 1 1 *"),
        "@monthly" => Ok("0 0 1 * *"),
        "@weekly" => Ok("0 0 * * 0"),
        "@daily" | "@midnight" => Ok("0 0 * * *"),
        "@hourly" => Ok("0 * * * *"),
        _ => Err(CronParseError::UnknownDescriptor(descriptor.to_string())),
    }
}

/// Parse the duration of an `@every` schedule, e.g. `6h`, `1h30m`, `90s` or `1.5h`
///
/// Durations are truncated to whole seconds and anything shorter than a second
/// becomes one second.
pub fn parse_interval(text: &str) -> Result<StdDuration, CronParseError> {
    let invalid = |reason: &str| CronParseError::InvalidInterval {
        value: text.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = text.trim();
    if trimmed == "0" {
        return Ok(StdDuration::from_secs(1));
    }
    if trimmed.starts_with('-') {
        return Err(invalid("interval must not be negative"));
    }

    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if rest.is_empty() {
        return Err(invalid("missing duration"));
    }

    let mut total = StdDuration::ZERO;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        rest = tail;

        let value: f64 = number
            .parse()
            .map_err(|_| invalid(&format!("'{}' is not a number", number)))?;
        let unit_secs = match unit {
            "ns" => 1e-9,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(invalid(&format!("missing unit after '{}'", number))),
            other => return Err(invalid(&format!("unknown unit '{}'", other))),
        };

        let part = StdDuration::try_from_secs_f64(value * unit_secs).map_err(|_| invalid("interval too large"))?;
        total = total.checked_add(part).ok_or_else(|| invalid("interval too large"))?;
    }

    Ok(StdDuration::from_secs(total.as_secs().max(1)))
}

fn is_wildcard(field: &str) -> bool {
    field.split(',').any(|part| {
        let (range, step) = part.split_once('/').unwrap_or((part, "1"));
        (range == "*" || range == "?") && matches!(step.parse::<u32>(), Ok(1))
    })
}

fn parse_field(spec: &FieldSpec, text: &str) -> Result<u64, CronParseError> {
    let mut bits = 0u64;
    for part in text.split(',') {
        bits |= parse_range(spec, part)?;
    }
    Ok(bits)
}

fn parse_range(spec: &FieldSpec, part: &str) -> Result<u64, CronParseError> {
    let invalid = |reason: String| CronParseError::InvalidField {
        field: spec.name,
        value: part.to_string(),
        reason,
    };

    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| invalid(format!("invalid step '{}'", step)))?;
            (range, Some(step))
        }
        None => (part, None),
    };

    if step == Some(0) {
        return Err(invalid("step must be positive".to_string()));
    }

    let (start, end) = if range == "*" || range == "?" {
        (spec.min, spec.max)
    } else if let Some((low, high)) = range.split_once('-') {
        (parse_value(spec, low, part)?, parse_value(spec, high, part)?)
    } else {
        let value = parse_value(spec, range, part)?;
        // "5/15" means "from 5 to the end, every 15"
        if step.is_some() {
            (value, spec.max)
        } else {
            (value, value)
        }
    };

    if start > end {
        return Err(invalid(format!("range start {} exceeds end {}", start, end)));
    }
    if start < spec.min || end > spec.max {
        return Err(invalid(format!(
            "values must be within {}-{}",
            spec.min, spec.max
        )));
    }

    let step = step.unwrap_or(1);
    let mut bits = 0u64;
    let mut value = start;
    while value <= end {
        bits |= 1 << value;
        match value.checked_add(step) {
            Some(next) => value = next,
            None => break,
        }
    }

    Ok(bits)
}

fn parse_value(spec: &FieldSpec, text: &str, part: &str) -> Result<u32, CronParseError> {
    text.parse::<u32>()
        .ok()
        .or_else(|| {
            spec.names
                .iter()
                .position(|name| name.eq_ignore_ascii_case(text))
                .map(|index| index as u32 + spec.min)
        })
        .ok_or_else(|| CronParseError::InvalidField {
            field: spec.name,
            value: part.to_string(),
            reason: format!("'{}' is not a valid value", text),
        })
}

fn has_bit(bits: u64, value: u32) -> bool {
    bits & (1 << value) != 0
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}
