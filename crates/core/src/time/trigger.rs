use crate::domain::alert::AlertKind;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Wall-clock hour/minute at which an alert is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerTime {
    pub hour: u32,
    pub minute: u32,
}

impl TriggerTime {
    pub const MORNING: TriggerTime = TriggerTime { hour: 8, minute: 55 };
    pub const EVENING: TriggerTime = TriggerTime {
        hour: 15,
        minute: 30,
    };

    pub fn new(hour: u32, minute: u32) -> anyhow::Result<Self> {
        anyhow::ensure!(hour < 24, "hour out of range: {hour}");
        anyhow::ensure!(minute < 60, "minute out of range: {minute}");
        Ok(Self { hour, minute })
    }

    fn minute_of_day(&self) -> i64 {
        i64::from(self.hour) * 60 + i64::from(self.minute)
    }

    // Minutes elapsed since the most recent occurrence of this trigger.
    fn minutes_since(&self, now: NaiveTime) -> i64 {
        let now_minute = i64::from(now.hour()) * 60 + i64::from(now.minute());
        (now_minute - self.minute_of_day()).rem_euclid(MINUTES_PER_DAY)
    }

    /// True when `now` falls in `[self, self + grace_minutes)`, wrapping at midnight.
    pub fn matches(&self, now: NaiveTime, grace_minutes: u32) -> bool {
        self.minutes_since(now) < i64::from(grace_minutes.max(1))
    }

    /// Date of the occurrence whose window contains `now`. A window that spans midnight
    /// keeps the date it started on.
    pub fn occurrence_date(&self, now: NaiveDateTime, grace_minutes: u32) -> Option<NaiveDate> {
        let since = self.minutes_since(now.time());
        if since >= i64::from(grace_minutes.max(1)) {
            return None;
        }
        Some((now - Duration::minutes(since)).date())
    }
}

impl fmt::Display for TriggerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TriggerTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("expected HH:MM, got {s:?}"))?;
        let hour = h
            .parse::<u32>()
            .map_err(|e| anyhow::anyhow!("invalid hour in {s:?}: {e}"))?;
        let minute = m
            .parse::<u32>()
            .map_err(|e| anyhow::anyhow!("invalid minute in {s:?}: {e}"))?;
        Self::new(hour, minute)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Schedule {
    pub morning: TriggerTime,
    pub evening: TriggerTime,
    pub grace_minutes: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            morning: TriggerTime::MORNING,
            evening: TriggerTime::EVENING,
            grace_minutes: 1,
        }
    }
}

impl Schedule {
    pub fn trigger_for(&self, kind: AlertKind) -> TriggerTime {
        match kind {
            AlertKind::Morning => self.morning,
            AlertKind::Evening => self.evening,
        }
    }

    /// Kinds whose trigger window contains `now`, with the date of that occurrence.
    /// Memoryless; deduplication is the fired marker's job.
    pub fn due(&self, now: NaiveDateTime) -> Vec<(AlertKind, NaiveDate)> {
        AlertKind::ALL
            .into_iter()
            .filter_map(|kind| {
                self.trigger_for(kind)
                    .occurrence_date(now, self.grace_minutes)
                    .map(|date| (kind, date))
            })
            .collect()
    }
}
