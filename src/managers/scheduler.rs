//! Tick source for the orchestrator
//!
//! A [`Schedule`] only answers "when is the next fire after this instant". The
//! [`Scheduler`] turns that into sleeps and remembers the pending fire time, so
//! dropping a `tick()` future (as `tokio::select!` does) never loses a tick.
//!
//! Wall time comes from a [`SchedulerClock`]. The runtime clock follows tokio's
//! timer, which makes schedules deterministic under paused test time.

use crate::utils::cron::parse_interval;
use crate::utils::{CronParseError, CronSchedule};
use chrono::{DateTime, Local, Utc};
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::Instant;

pub trait Schedule: Send + Sync + Debug {
    /// First fire time strictly after `after`
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>>;

    fn describe(&self) -> String;

    /// The next `count` fire times after `after`
    fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = after;
        while times.len() < count {
            match self.next_after(cursor) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }
}

/// Build a schedule from a config expression
///
/// `@every <duration>` becomes an [`IntervalSchedule`]; anything else is parsed
/// as cron and evaluated in UTC or local time according to `utc`.
pub fn schedule_from_expression(expression: &str, utc: bool) -> Result<Box<dyn Schedule>, CronParseError> {
    let trimmed = expression.trim();
    if let Some((descriptor, duration)) = trimmed.split_once(char::is_whitespace) {
        if descriptor.eq_ignore_ascii_case("@every") {
            return Ok(Box::new(IntervalSchedule(parse_interval(duration)?)));
        }
    }

    Ok(Box::new(CronSchedule::parse(trimmed)?.with_utc(utc)))
}

impl Schedule for CronSchedule {
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_utc() {
            CronSchedule::next_after(self, &after)
        } else {
            CronSchedule::next_after(self, &after.with_timezone(&Local)).map(|t| t.with_timezone(&Utc))
        }
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.expression(), if self.is_utc() { "UTC" } else { "local time" })
    }
}

/// Fires every `interval`
#[derive(Debug, Clone, Copy)]
pub struct IntervalSchedule(pub Duration);

impl Schedule for IntervalSchedule {
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let interval = chrono::Duration::from_std(self.0).ok()?;
        if interval <= chrono::Duration::zero() {
            return None;
        }
        after.checked_add_signed(interval)
    }

    fn describe(&self) -> String {
        let secs = self.0.as_secs();
        let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
        let mut text = String::from("@every ");
        if hours > 0 {
            text.push_str(&format!("{}h", hours));
        }
        if minutes > 0 {
            text.push_str(&format!("{}m", minutes));
        }
        if seconds > 0 || secs == 0 {
            text.push_str(&format!("{}s", seconds));
        }
        text
    }
}

/// Source of "now" for the scheduler
#[derive(Debug, Clone, Copy)]
pub enum SchedulerClock {
    /// System wall clock
    System,
    /// Wall time captured at creation, advanced by the tokio clock
    Runtime { wall: DateTime<Utc>, instant: Instant },
}

impl SchedulerClock {
    /// Runtime clock anchored at the current instant. Must be called within a tokio runtime.
    pub fn runtime() -> Self {
        SchedulerClock::Runtime {
            wall: Utc::now(),
            instant: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            SchedulerClock::System => Utc::now(),
            SchedulerClock::Runtime { wall, instant } => {
                *wall + chrono::Duration::from_std(instant.elapsed()).unwrap_or_else(|_| chrono::Duration::zero())
            }
        }
    }
}

#[derive(Debug)]
pub struct Scheduler {
    schedule: Box<dyn Schedule>,
    clock: SchedulerClock,
    next: Option<DateTime<Utc>>,
}

impl Scheduler {
    /// Register `schedule` against the system clock
    pub fn new(schedule: Box<dyn Schedule>) -> Self {
        Self::with_clock(schedule, SchedulerClock::System)
    }

    /// Register `schedule`, computing the first fire from `clock`'s now
    pub fn with_clock(schedule: Box<dyn Schedule>, clock: SchedulerClock) -> Self {
        let next = schedule.next_after(clock.now());
        Self { schedule, clock, next }
    }

    /// Pending fire time; `None` once the schedule is exhausted
    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.next
    }

    pub fn describe(&self) -> String {
        self.schedule.describe()
    }

    /// Wait for the pending fire and advance to the following one
    ///
    /// Cancel safe. Pends forever when the schedule never fires again.
    pub async fn tick(&mut self) -> DateTime<Utc> {
        let Some(at) = self.next else {
            return std::future::pending().await;
        };

        let wait = (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        // Fires missed while a sleep overran are skipped, not replayed
        self.next = self.schedule.next_after(at.max(self.clock.now()));
        at
    }
}
