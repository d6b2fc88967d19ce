//! Interchangeable assistant policies
//!
//! A policy maps (command, branch environment) to a state mutation and a
//! reply. It is pure with respect to the branch: it receives one branch's
//! environment and must not touch any other branch's state or any memory.

pub mod generative;
pub mod intent;
pub mod rule;

pub use generative::GenerativePolicy;
pub use intent::{Classification, IntentLabel, IntentRule, RuleTable};
pub use rule::RulePolicy;

use crate::core::error::Result;
use crate::core::types::PolicyKind;
use crate::household::environment::{Environment, StateChange};
use async_trait::async_trait;

/// What one policy call produced
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    /// Assistant's spoken reply.
    pub reply: String,
    /// Mutations actually applied to the branch environment.
    pub changes: Vec<StateChange>,
    /// Natural-language summary of the mutations (unfiltered; the
    /// observer-facing variant is derived separately from observable
    /// properties only).
    pub change_description: String,
}

#[async_trait]
pub trait AssistantPolicy: Send + Sync {
    fn kind(&self) -> PolicyKind;

    /// Interpret `command` against the branch's current environment,
    /// applying any mutations directly to it.
    async fn respond(&self, command: &str, env: &mut Environment) -> Result<PolicyOutcome>;
}

/// "장치.속성: before -> after" summary, "기기 상태 변화 없음" when empty.
pub fn format_changes(changes: &[StateChange]) -> String {
    if changes.is_empty() {
        return "기기 상태 변화 없음".to_string();
    }
    changes
        .iter()
        .map(|c| format!("{}.{}: {} -> {}", c.device, c.property, c.before, c.after))
        .collect::<Vec<_>>()
        .join("; ")
}
