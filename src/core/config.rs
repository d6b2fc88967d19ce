//! Simulation configuration with documented constants
//!
//! All tunable values are collected here with explanations of their purpose.
//! A config is loaded once (TOML file or defaults) and passed down explicitly
//! inside a [`RunContext`]; there is no process-wide singleton, so persons can
//! be simulated concurrently without shared mutable state.

use crate::core::error::{GapError, Result};
use crate::core::types::RunId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for one simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // === TIMELINE ===
    /// Length of one tick in minutes.
    ///
    /// Schedules arrive at hour granularity; each hour entry is split into
    /// `60 / tick_minutes` quarter descriptors. Must divide 60 evenly.
    pub tick_minutes: u32,

    // === MEMORY ===
    /// Weight lost per elapsed tick since a memory was created.
    ///
    /// At the default (0.0125/tick, i.e. 0.05/hour on the quarter-hour grid)
    /// a memory fades from 1.0 to the floor in about 64 ticks (16 hours).
    pub decay_rate: f32,

    /// Minimum effective weight. Old memories stay faintly recallable at the
    /// floor instead of vanishing. Observed study values: 0.2-0.3.
    pub decay_floor: f32,

    /// How many memories a recall returns, strongest first. `None` = all.
    pub recall_limit: Option<usize>,

    // === FEASIBILITY GATE ===
    /// A quarter whose activity contains one of these substrings cannot issue
    /// a voice command (asleep, out of the house, mouth otherwise occupied).
    /// Such ticks produce zero interaction records.
    pub ineligible_keywords: Vec<String>,

    // === CONCURRENCY & RETRY ===
    /// Maximum persons simulated in flight at once. Bounds pressure on the
    /// external oracle; ticks within a person are always sequential.
    pub concurrency_limit: usize,

    /// Attempts per oracle call before the cell is marked failed (includes
    /// the first try). Schema mismatches consume attempts the same way.
    pub max_attempts: usize,

    /// Delay between retry attempts, in milliseconds.
    pub retry_delay_ms: u64,

    /// Consecutive whole-cell failures across the run that trip the circuit
    /// breaker and abort with an error instead of silently degrading.
    pub breaker_threshold: u32,

    // === EVALUATION ===
    /// Self-minus-observer gap at or above this value classifies a record as
    /// "gap present" at export time.
    pub gap_threshold: i32,

    // === ORACLE ROUTING ===
    /// Which oracle implementation serves this run.
    pub provider: Provider,

    /// Seed for the scripted provider; ignored for HTTP.
    pub scripted_seed: u64,

    /// Model name per call-site. All externally supplied; nothing in the
    /// engine hardcodes a model.
    pub models: ModelTable,

    // === ARTIFACTS ===
    pub paths: ArtifactPaths,
}

/// Oracle implementation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// HTTP chat API (Anthropic or OpenAI-compatible), keyed by environment.
    Http,
    /// Deterministic scripted oracle, no network. Used for offline runs and
    /// replay tests.
    Scripted,
}

/// Model name per oracle call-site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTable {
    pub narrative: String,
    pub command: String,
    pub generative_reply: String,
    pub classifier: String,
    pub self_eval: String,
    pub observer_eval: String,
}

impl Default for ModelTable {
    fn default() -> Self {
        let small = "gpt-4o-mini".to_string();
        Self {
            narrative: small.clone(),
            command: small.clone(),
            generative_reply: small.clone(),
            classifier: small,
            self_eval: "gpt-4o".to_string(),
            observer_eval: "gpt-4o".to_string(),
        }
    }
}

/// File locations for input artifacts and run outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    /// Canonical environment at t=0 (read-only input).
    pub environment: PathBuf,
    /// Directory of person profiles (`avatar_*.json`).
    pub persons: PathBuf,
    /// Append-only run log; doubles as the resume checkpoint.
    pub run_log: PathBuf,
    /// Memory stream dump, rewritten at the end of each run.
    pub memory_log: PathBuf,
    /// Optional replacement for the built-in intent rule table.
    pub rules: Option<PathBuf>,
    /// Directory receiving exported tables.
    pub exports: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            environment: PathBuf::from("data/generated/environment.json"),
            persons: PathBuf::from("data/generated/avatars"),
            run_log: PathBuf::from("data/logs/run_log.jsonl"),
            memory_log: PathBuf::from("data/logs/memory_log.jsonl"),
            rules: None,
            exports: PathBuf::from("data/exports"),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_minutes: 15,

            // Memory: 0.05/hour on the 15-minute grid, floor from the study
            decay_rate: 0.0125,
            decay_floor: 0.2,
            recall_limit: Some(5),

            ineligible_keywords: [
                "수면",
                "잠자",
                "낮잠",
                "취침",
                "외출",
                "출근길",
                "통화",
                "샤워",
            ]
            .into_iter()
            .map(String::from)
            .collect(),

            concurrency_limit: 2,
            max_attempts: 3,
            retry_delay_ms: 500,
            breaker_threshold: 8,

            gap_threshold: 2,

            provider: Provider::Http,
            scripted_seed: 42,
            models: ModelTable::default(),
            paths: ArtifactPaths::default(),
        }
    }
}

impl SimConfig {
    /// Load from a TOML file, falling back to defaults for missing keys.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&text).map_err(|e| GapError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.tick_minutes == 0 || 60 % self.tick_minutes != 0 {
            return Err(GapError::Config(format!(
                "tick_minutes ({}) must divide 60 evenly",
                self.tick_minutes
            )));
        }
        if !(0.0..=1.0).contains(&self.decay_floor) {
            return Err(GapError::Config(format!(
                "decay_floor ({}) must be within [0, 1]",
                self.decay_floor
            )));
        }
        if self.decay_rate <= 0.0 {
            return Err(GapError::Config("decay_rate must be positive".into()));
        }
        if self.concurrency_limit == 0 {
            return Err(GapError::Config("concurrency_limit must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(GapError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Quarter descriptors per schedule hour.
    pub fn quarters_per_hour(&self) -> u32 {
        60 / self.tick_minutes
    }
}

/// Everything a component call needs to know about the current run.
///
/// Passed explicitly instead of living in a global so that per-person tasks
/// stay safe to run concurrently.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub config: SimConfig,
}

impl RunContext {
    pub fn new(config: SimConfig) -> Self {
        Self {
            run_id: RunId::new(),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_off_grid_tick_length() {
        let config = SimConfig {
            tick_minutes: 25,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: SimConfig =
            toml::from_str("tick_minutes = 30\n[models]\nself_eval = \"gpt-4o\"\n").unwrap();
        assert_eq!(config.tick_minutes, 30);
        assert_eq!(config.quarters_per_hour(), 2);
        assert_eq!(config.decay_floor, 0.2);
    }
}
