//! Person profiles and schedules
//!
//! Created once at setup from the household artifacts; immutable during
//! simulation except as read-only input to tick generation.

use crate::core::clock::SimTime;
use crate::core::types::PersonId;
use serde::{Deserialize, Serialize};

/// One ordered schedule entry at hour granularity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub time: SimTime,
    pub activity: String,
}

/// A simulated household member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub id: PersonId,
    pub name: String,
    /// Personality/occupation/lifestyle description conditioning generation.
    pub traits: String,
    pub schedule: Vec<ScheduleEntry>,
}

impl Person {
    /// Schedule entries in chronological order regardless of artifact order.
    pub fn sorted_schedule(&self) -> Vec<ScheduleEntry> {
        let mut entries = self.schedule.clone();
        entries.sort_by_key(|e| e.time.total_minutes());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_sorts_chronologically() {
        let person: Person = serde_json::from_value(serde_json::json!({
            "name": "지민",
            "traits": "아침형 인간",
            "schedule": [
                { "time": "월요일 21:00", "activity": "휴식" },
                { "time": "월요일 09:00", "activity": "아침 준비" }
            ]
        }))
        .unwrap();
        let sorted = person.sorted_schedule();
        assert_eq!(sorted[0].activity, "아침 준비");
        assert_eq!(sorted[1].activity, "휴식");
    }
}
