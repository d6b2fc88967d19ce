//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for simulated persons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonId(pub Uuid);

impl PersonId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PersonId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulation tick counter (one tick = one quarter-hour by default)
pub type Tick = u64;

/// Whether the hidden intent behind an activity is exposed to command
/// generation for a branch. This is the controlled independent variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    ContextPresent,
    ContextAbsent,
}

/// Which of the two interchangeable assistant implementations served a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Generative,
    RuleBased,
}

/// One of the four (context x policy) branch instances evaluated per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub context: ContextMode,
    pub policy: PolicyKind,
}

impl Cell {
    pub const ALL: [Cell; 4] = [
        Cell {
            context: ContextMode::ContextPresent,
            policy: PolicyKind::Generative,
        },
        Cell {
            context: ContextMode::ContextPresent,
            policy: PolicyKind::RuleBased,
        },
        Cell {
            context: ContextMode::ContextAbsent,
            policy: PolicyKind::Generative,
        },
        Cell {
            context: ContextMode::ContextAbsent,
            policy: PolicyKind::RuleBased,
        },
    ];

    /// Short label used in exports, matching the original study's column
    /// prefixes: WC = with context, WOC = without, VAC = generative assistant,
    /// VAR = rule-based assistant.
    pub fn label(&self) -> &'static str {
        match (self.context, self.policy) {
            (ContextMode::ContextPresent, PolicyKind::Generative) => "WC/VAC",
            (ContextMode::ContextPresent, PolicyKind::RuleBased) => "WC/VAR",
            (ContextMode::ContextAbsent, PolicyKind::Generative) => "WOC/VAC",
            (ContextMode::ContextAbsent, PolicyKind::RuleBased) => "WOC/VAR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_distinct_cells() {
        let mut labels: Vec<_> = Cell::ALL.iter().map(|c| c.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 4);
    }
}
