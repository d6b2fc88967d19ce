//! Simulated clock for timeline discretization
//!
//! Schedules arrive at hour granularity ("월요일 09:00") and the engine
//! advances in fixed quarter-hour ticks. `SimTime` is the single time
//! representation; tick indices are derived from it, never stored twice.

use crate::core::error::{GapError, Result};
use crate::core::types::Tick;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Korean weekday labels, day 0 = Monday, matching the schedule artifacts.
pub const WEEKDAYS: [&str; 7] = [
    "월요일",
    "화요일",
    "수요일",
    "목요일",
    "금요일",
    "토요일",
    "일요일",
];

/// A point in simulated time with minute precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime {
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl SimTime {
    pub fn new(day: u8, hour: u8, minute: u8) -> Self {
        Self { day, hour, minute }
    }

    /// Parse "월요일 07:30" or a bare "07:30" (day defaults to Monday).
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (day, clock) = match text.split_once(' ') {
            Some((day_name, rest)) => {
                let day = WEEKDAYS
                    .iter()
                    .position(|w| *w == day_name)
                    .ok_or_else(|| GapError::Artifact(format!("unknown weekday: {day_name}")))?;
                (day as u8, rest.trim())
            }
            None => (0, text),
        };
        let (h, m) = clock
            .split_once(':')
            .ok_or_else(|| GapError::Artifact(format!("malformed time: {text}")))?;
        let hour: u8 = h
            .parse()
            .map_err(|_| GapError::Artifact(format!("malformed hour: {text}")))?;
        let minute: u8 = m
            .parse()
            .map_err(|_| GapError::Artifact(format!("malformed minute: {text}")))?;
        if hour > 23 || minute > 59 {
            return Err(GapError::Artifact(format!("time out of range: {text}")));
        }
        Ok(Self { day, hour, minute })
    }

    /// Minutes elapsed since Monday 00:00.
    pub fn total_minutes(&self) -> u64 {
        self.day as u64 * 24 * 60 + self.hour as u64 * 60 + self.minute as u64
    }

    /// Tick index on the fixed grid. Times are expected to fall on the grid;
    /// off-grid minutes truncate toward the containing tick.
    pub fn tick_index(&self, tick_minutes: u32) -> Tick {
        self.total_minutes() / tick_minutes as u64
    }

    pub fn from_tick_index(tick: Tick, tick_minutes: u32) -> Self {
        let minutes = tick * tick_minutes as u64;
        Self {
            day: (minutes / (24 * 60)) as u8,
            hour: ((minutes / 60) % 24) as u8,
            minute: (minutes % 60) as u8,
        }
    }

    pub fn add_minutes(&self, minutes: u32) -> Self {
        let total = self.total_minutes() + minutes as u64;
        Self {
            day: (total / (24 * 60)) as u8,
            hour: ((total / 60) % 24) as u8,
            minute: (total % 60) as u8,
        }
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}",
            WEEKDAYS[self.day as usize % 7],
            self.hour,
            self.minute
        )
    }
}

impl Serialize for SimTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SimTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        SimTime::parse(&text).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_weekday_prefixed_times() {
        let t = SimTime::parse("화요일 07:30").unwrap();
        assert_eq!((t.day, t.hour, t.minute), (1, 7, 30));
        assert_eq!(t.to_string(), "화요일 07:30");
    }

    #[test]
    fn bare_clock_defaults_to_monday() {
        let t = SimTime::parse("09:00").unwrap();
        assert_eq!((t.day, t.hour, t.minute), (0, 9, 0));
    }

    #[test]
    fn tick_index_round_trips_on_grid() {
        let t = SimTime::parse("월요일 09:15").unwrap();
        let tick = t.tick_index(15);
        assert_eq!(SimTime::from_tick_index(tick, 15), t);
    }

    #[test]
    fn quarter_grid_splits_an_hour_into_four() {
        let start = SimTime::parse("09:00").unwrap();
        let quarters: Vec<_> = (0..4).map(|q| start.add_minutes(q * 15)).collect();
        assert_eq!(quarters[3].to_string(), "월요일 09:45");
        assert_eq!(
            quarters[3].tick_index(15) - quarters[0].tick_index(15),
            3
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(SimTime::parse("수요일").is_err());
        assert!(SimTime::parse("25:00").is_err());
    }
}
