//! Gapsim - smart-home VA evaluation-gap simulator
//!
//! Simulates a household's day with a voice assistant to study the gap
//! between self-reported satisfaction and an outside observer's judgment of
//! the same interaction. Each command-eligible quarter-hour tick branches
//! into four counterfactual cells (context-present/absent x generative/
//! rule-based assistant) over independent environment lineages.

pub mod core;
pub mod eval;
pub mod export;
pub mod household;
pub mod memory;
pub mod oracle;
pub mod policy;
pub mod sim;
