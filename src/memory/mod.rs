//! Per-person decaying memory
//!
//! Append-only log of weighted observations. Weight is never stored: it is
//! recomputed at query time from the creation tick, so recall is a pure
//! function of (store contents, query tick). Old memories clamp to a floor
//! instead of vanishing, keeping them faintly recallable.

use crate::core::types::{PersonId, Tick};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// What a memory describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Quarter-hour activity the person lived through.
    Activity,
    /// A voice-assistant exchange the person had.
    AssistantCall,
}

/// One remembered event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub person: PersonId,
    pub created_tick: Tick,
    pub kind: MemoryKind,
    pub content: String,
}

/// A memory as seen at recall time, with its effective weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalledMemory {
    pub record: MemoryRecord,
    pub weight: f32,
}

/// Append-only store of [`MemoryRecord`]s keyed by person
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: AHashMap<PersonId, Vec<MemoryRecord>>,
    decay_rate: f32,
    floor: f32,
}

impl MemoryStore {
    pub fn new(decay_rate: f32, floor: f32) -> Self {
        Self {
            entries: AHashMap::new(),
            decay_rate,
            floor,
        }
    }

    /// Append one record. Records are never mutated afterwards.
    pub fn record(&mut self, person: PersonId, tick: Tick, kind: MemoryKind, content: String) {
        self.entries.entry(person).or_default().push(MemoryRecord {
            person,
            created_tick: tick,
            kind,
            content,
        });
    }

    /// Effective weight of a record created at `created`, queried at `as_of`:
    /// `max(floor, 1.0 - decay_rate * elapsed_ticks)`.
    pub fn weight_at(&self, created: Tick, as_of: Tick) -> f32 {
        let elapsed = as_of.saturating_sub(created) as f32;
        (1.0 - self.decay_rate * elapsed).max(self.floor)
    }

    /// Memories of one person as of `as_of`, strongest first, ties broken by
    /// recency. Never returns another person's records and never mutates the
    /// store.
    pub fn recall(
        &self,
        person: PersonId,
        as_of: Tick,
        limit: Option<usize>,
    ) -> Vec<RecalledMemory> {
        let Some(records) = self.entries.get(&person) else {
            return Vec::new();
        };
        let mut recalled: Vec<RecalledMemory> = records
            .iter()
            .filter(|r| r.created_tick <= as_of)
            .map(|r| RecalledMemory {
                record: r.clone(),
                weight: self.weight_at(r.created_tick, as_of),
            })
            .collect();
        recalled.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then(b.record.created_tick.cmp(&a.record.created_tick))
        });
        if let Some(limit) = limit {
            recalled.truncate(limit);
        }
        recalled
    }

    /// Every record of one person in creation order, for export.
    pub fn dump(&self, person: PersonId) -> Vec<MemoryRecord> {
        self.entries.get(&person).cloned().unwrap_or_default()
    }
}

/// Render recalled memories as prompt context lines.
pub fn recall_prompt_lines(recalled: &[RecalledMemory]) -> String {
    if recalled.is_empty() {
        return "(기억 없음)".to_string();
    }
    recalled
        .iter()
        .map(|m| format!("- (가중치 {:.2}) {}", m.weight, m.record.content))
        .collect::<Vec<_>>()
        .join("\n")
}
