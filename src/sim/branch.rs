//! Branch matrix execution
//!
//! For each command-eligible tick, four branch cells run: (context-present |
//! context-absent) x (generative | rule-based). All four start from the same
//! quarter descriptor but own independent environment lineages, held as
//! explicit copies rather than aliased references, so a mutation in one
//! branch can never leak into another. Memory is read once, before the cells
//! run, and written back by the engine only after all four settle.

use crate::core::error::{GapError, Result};
use crate::core::types::{Cell, ContextMode, PolicyKind};
use crate::household::environment::Environment;
use crate::household::person::Person;
use crate::memory::{recall_prompt_lines, MemoryStore};
use crate::oracle::{generate_json_validated, CallSite, Oracle, RetryPolicy};
use crate::policy::{AssistantPolicy, PolicyOutcome};
use crate::sim::record::{CellPhase, CellStatus, InteractionRecord, SelfAssessment};
use crate::sim::tick::QuarterDescriptor;
use serde::Deserialize;
use std::sync::Arc;

const COMMAND_ROLE: &str =
    "당신은 한국어로 스마트홈 명령을 생성합니다. 반드시 JSON만 출력하세요.";

const SELF_EVAL_ROLE: &str =
    "당신은 사용자 입장에서 만족도를 평가합니다. 반드시 JSON만 출력하세요.";

impl Cell {
    fn index(&self) -> usize {
        match (self.context, self.policy) {
            (ContextMode::ContextPresent, PolicyKind::Generative) => 0,
            (ContextMode::ContextPresent, PolicyKind::RuleBased) => 1,
            (ContextMode::ContextAbsent, PolicyKind::Generative) => 2,
            (ContextMode::ContextAbsent, PolicyKind::RuleBased) => 3,
        }
    }
}

/// The four per-person environment lineages. Created once from the canonical
/// environment and evolved independently from the point of divergence
/// onward. Branches are counterfactual timelines, not transient forks, and
/// are never re-synchronized.
#[derive(Debug, Clone)]
pub struct BranchEnvironments {
    cells: [Environment; 4],
}

impl BranchEnvironments {
    pub fn new(canonical: &Environment) -> Self {
        Self {
            cells: [
                canonical.snapshot(),
                canonical.snapshot(),
                canonical.snapshot(),
                canonical.snapshot(),
            ],
        }
    }

    pub fn get(&self, cell: Cell) -> &Environment {
        &self.cells[cell.index()]
    }

    pub fn get_mut(&mut self, cell: Cell) -> &mut Environment {
        &mut self.cells[cell.index()]
    }

    pub fn set(&mut self, cell: Cell, env: Environment) {
        self.cells[cell.index()] = env;
    }
}

#[derive(Debug, Deserialize)]
struct CommandOut {
    command: String,
}

#[derive(Debug, Deserialize)]
struct RatingOut {
    score: u8,
    reason: String,
}

pub struct BranchMatrixExecutor {
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
    generative: Arc<dyn AssistantPolicy>,
    rule_based: Arc<dyn AssistantPolicy>,
    recall_limit: Option<usize>,
}

impl BranchMatrixExecutor {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        retry: RetryPolicy,
        generative: Arc<dyn AssistantPolicy>,
        rule_based: Arc<dyn AssistantPolicy>,
        recall_limit: Option<usize>,
    ) -> Self {
        Self {
            oracle,
            retry,
            generative,
            rule_based,
            recall_limit,
        }
    }

    fn policy_for(&self, kind: PolicyKind) -> &dyn AssistantPolicy {
        match kind {
            PolicyKind::Generative => self.generative.as_ref(),
            PolicyKind::RuleBased => self.rule_based.as_ref(),
        }
    }

    /// Run all four cells for one command-eligible tick. Returns exactly four
    /// records; failed cells report their failure phase and leave their
    /// branch environment untouched.
    pub async fn run_tick(
        &self,
        person: &Person,
        descriptor: &QuarterDescriptor,
        memory: &MemoryStore,
        branches: &mut BranchEnvironments,
    ) -> Vec<InteractionRecord> {
        let recalled = memory.recall(person.id, descriptor.tick, self.recall_limit);
        let memory_text = recall_prompt_lines(&recalled);

        let [c0, c1, c2, c3] = Cell::ALL;
        let (r0, r1, r2, r3) = tokio::join!(
            self.run_cell(c0, descriptor, &memory_text, branches.get(c0).snapshot()),
            self.run_cell(c1, descriptor, &memory_text, branches.get(c1).snapshot()),
            self.run_cell(c2, descriptor, &memory_text, branches.get(c2).snapshot()),
            self.run_cell(c3, descriptor, &memory_text, branches.get(c3).snapshot()),
        );

        let mut records = Vec::with_capacity(4);
        for (cell, (env, record)) in Cell::ALL.into_iter().zip([r0, r1, r2, r3]) {
            if let Some(env) = env {
                branches.set(cell, env);
            }
            records.push(record);
        }
        records
    }

    /// One cell's pass through the tick state machine. Returns the evolved
    /// environment on success; `None` means the cell failed and its branch
    /// keeps its pre-tick state.
    async fn run_cell(
        &self,
        cell: Cell,
        descriptor: &QuarterDescriptor,
        memory_text: &str,
        mut env: Environment,
    ) -> (Option<Environment>, InteractionRecord) {
        // PENDING -> CONTEXT_DERIVED: assemble the slice this cell may see
        let context_slice = match cell.context {
            ContextMode::ContextPresent => format!(
                "- 겉보기 행동: {}\n- 구체적 행동: {}\n- 속마음: {}\n- 최근 기억:\n{}",
                descriptor.visible_action,
                descriptor.concrete_action,
                descriptor.hidden_intent,
                memory_text,
            ),
            ContextMode::ContextAbsent => {
                format!("- 겉보기 행동: {}", descriptor.visible_action)
            }
        };

        // CONTEXT_DERIVED -> COMMAND_ISSUED
        let command = match self.issue_command(&context_slice).await {
            Ok(command) => command,
            Err(error) => {
                return (
                    None,
                    self.record(cell, descriptor, String::new(), None, failed(cell, CellPhase::CommandIssued, &error)),
                );
            }
        };

        // COMMAND_ISSUED -> ASSISTANT_RESPONDED
        let outcome = match self.policy_for(cell.policy).respond(&command, &mut env).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(cell = cell.label(), %error, "assistant response failed");
                return (
                    None,
                    self.record(cell, descriptor, command, None, failed(cell, CellPhase::AssistantResponded, &error)),
                );
            }
        };

        // ASSISTANT_RESPONDED -> SELF_EVALUATED (context-present only; the
        // sentinel is the consistent representation for withheld intent)
        let self_eval = match cell.context {
            ContextMode::ContextAbsent => SelfAssessment::NotApplicable,
            ContextMode::ContextPresent => {
                match self.self_evaluate(descriptor, &command, &outcome).await {
                    Ok(rating) => SelfAssessment::Rated {
                        score: rating.score,
                        reason: rating.reason,
                    },
                    Err(error) => {
                        // the mutation itself succeeded; only the evaluation
                        // failed, so the branch still advances
                        return (
                            Some(env),
                            self.record(cell, descriptor, command, Some(outcome), failed(cell, CellPhase::SelfEvaluated, &error)),
                        );
                    }
                }
            }
        };

        let mut record = self.record(cell, descriptor, command, Some(outcome), CellStatus::Completed);
        record.self_eval = self_eval;
        (Some(env), record)
    }

    async fn issue_command(&self, context_slice: &str) -> Result<String> {
        let prompt = format!(
            r#"[상황]
{context_slice}

위 상황을 해결하거나 돕기 위해 스마트홈 VA에게 할 자연스러운 한국어 명령을 만들어 주세요.

지침:
1) 잡담보다 기기 제어나 정보 확인 같은 목적 지향적 명령을 우선하세요.
2) 반드시 JSON만 출력하세요.

출력 형식:
{{
  "command": "..."
}}"#
        );
        let out: CommandOut = generate_json_validated(
            self.oracle.as_ref(),
            CallSite::Command,
            COMMAND_ROLE,
            &prompt,
            &self.retry,
            |o: &CommandOut| {
                if o.command.trim().is_empty() {
                    Err(GapError::Schema("empty command".into()))
                } else {
                    Ok(())
                }
            },
        )
        .await?;
        Ok(out.command.trim().to_string())
    }

    async fn self_evaluate(
        &self,
        descriptor: &QuarterDescriptor,
        command: &str,
        outcome: &PolicyOutcome,
    ) -> Result<RatingOut> {
        let prompt = format!(
            r#"[상황] 속마음: {hidden}
[결과] 기기 변화: {changes}
[대화] 나: "{command}" / VA: "{reply}"

위 정보를 종합할 때, 본 대화는 얼마나 만족스러웠습니까? (1-7점)
반드시 JSON만 출력하세요.

출력 형식:
{{
  "score": 1,
  "reason": "이유"
}}"#,
            hidden = descriptor.hidden_intent,
            changes = outcome.change_description,
            reply = outcome.reply,
        );
        generate_json_validated(
            self.oracle.as_ref(),
            CallSite::SelfEval,
            SELF_EVAL_ROLE,
            &prompt,
            &self.retry,
            |r: &RatingOut| {
                if (1..=7).contains(&r.score) {
                    Ok(())
                } else {
                    Err(GapError::Schema(format!("score {} outside 1-7", r.score)))
                }
            },
        )
        .await
    }

    fn record(
        &self,
        cell: Cell,
        descriptor: &QuarterDescriptor,
        command: String,
        outcome: Option<PolicyOutcome>,
        status: CellStatus,
    ) -> InteractionRecord {
        let (reply, state_changes, change_description) = match outcome {
            Some(outcome) => (outcome.reply, outcome.changes, outcome.change_description),
            None => (String::new(), Vec::new(), String::new()),
        };
        InteractionRecord {
            cell,
            time: descriptor.time,
            tick: descriptor.tick,
            hour_activity: descriptor.hour_activity.clone(),
            quarter_activity: descriptor.quarter_activity.clone(),
            concrete_action: descriptor.concrete_action.clone(),
            command,
            reply,
            state_changes,
            change_description,
            self_eval: SelfAssessment::NotApplicable,
            observer_eval: None,
            status,
        }
    }
}

fn failed(cell: Cell, phase: CellPhase, error: &GapError) -> CellStatus {
    tracing::warn!(cell = cell.label(), ?phase, %error, "cell failed, containing");
    CellStatus::Failed {
        phase,
        error: error.to_string(),
    }
}

/// Test fixture: a command-eligible descriptor at an arbitrary time.
#[cfg(test)]
pub(crate) fn descriptor_at(
    time: crate::core::clock::SimTime,
    quarter_activity: &str,
) -> QuarterDescriptor {
    QuarterDescriptor {
        time,
        tick: time.tick_index(15),
        hour_activity: "아침 준비".into(),
        quarter_activity: quarter_activity.into(),
        visible_action: "주방에서 분주하게 움직인다.".into(),
        hidden_intent: "어두워서 불을 켜고 싶지만 손이 바쁘다.".into(),
        concrete_action: "주전자에 물을 받는다. 원두를 간다. 드리퍼에 천천히 붓는다.".into(),
        command_eligible: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SimTime;
    use crate::core::types::PersonId;
    use crate::oracle::ScriptedOracle;
    use crate::policy::{GenerativePolicy, RulePolicy, RuleTable};
    use std::time::Duration;

    fn executor(seed: u64) -> BranchMatrixExecutor {
        let oracle: Arc<dyn Oracle> = Arc::new(ScriptedOracle::new(seed));
        let retry = RetryPolicy::new(2, Duration::from_millis(1));
        BranchMatrixExecutor::new(
            oracle.clone(),
            retry.clone(),
            Arc::new(GenerativePolicy::new(oracle.clone(), retry.clone())),
            Arc::new(RulePolicy::new(oracle, retry, RuleTable::default())),
            Some(5),
        )
    }

    fn sample_env() -> Environment {
        serde_json::from_value(serde_json::json!({
            "rooms": {
                "거실": [{
                    "name": "거실 조명",
                    "properties": { "power": { "value": "off", "observable": true } }
                }]
            }
        }))
        .unwrap()
    }

    fn person() -> Person {
        Person {
            id: PersonId::new(),
            name: "지민".into(),
            traits: "실용적".into(),
            schedule: vec![],
        }
    }

    #[tokio::test]
    async fn produces_exactly_four_records() {
        let executor = executor(5);
        let env = sample_env();
        let mut branches = BranchEnvironments::new(&env);
        let memory = MemoryStore::new(0.0125, 0.2);
        let descriptor = descriptor_at(SimTime::new(0, 9, 0), "커피를 내리는 중");
        let records = executor
            .run_tick(&person(), &descriptor, &memory, &mut branches)
            .await;
        assert_eq!(records.len(), 4);
        let mut cells: Vec<_> = records.iter().map(|r| r.cell.label()).collect();
        cells.sort();
        cells.dedup();
        assert_eq!(cells.len(), 4);
    }

    #[tokio::test]
    async fn self_eval_sentinel_follows_context_mode() {
        let executor = executor(6);
        let env = sample_env();
        let mut branches = BranchEnvironments::new(&env);
        let memory = MemoryStore::new(0.0125, 0.2);
        let descriptor = descriptor_at(SimTime::new(0, 9, 15), "커피를 내리는 중");
        let records = executor
            .run_tick(&person(), &descriptor, &memory, &mut branches)
            .await;
        for record in &records {
            assert!(record.status.is_completed(), "{:?}", record.status);
            assert!(record.self_eval_consistent(), "{:?}", record);
            match record.cell.context {
                ContextMode::ContextPresent => {
                    let score = record.self_eval.score().unwrap();
                    assert!((1..=7).contains(&score));
                }
                ContextMode::ContextAbsent => {
                    assert_eq!(record.self_eval, SelfAssessment::NotApplicable)
                }
            }
        }
    }

    #[tokio::test]
    async fn branch_mutation_stays_in_its_cell() {
        let executor = executor(7);
        let env = sample_env();
        let mut branches = BranchEnvironments::new(&env);
        let memory = MemoryStore::new(0.0125, 0.2);
        let descriptor = descriptor_at(SimTime::new(0, 9, 30), "커피를 내리는 중");

        let snapshots_before: Vec<Environment> =
            Cell::ALL.iter().map(|c| branches.get(*c).snapshot()).collect();
        let records = executor
            .run_tick(&person(), &descriptor, &memory, &mut branches)
            .await;

        // each branch equals its own pre-tick state plus exactly its own
        // recorded changes: nothing from any sibling cell leaked in
        for (record, before) in records.iter().zip(&snapshots_before) {
            let mut expected = before.snapshot();
            for change in &record.state_changes {
                expected
                    .apply(&change.device, &change.property, &change.after)
                    .unwrap();
            }
            assert_eq!(branches.get(record.cell), &expected);
        }
        // the canonical ancestor never moves
        assert_eq!(env, sample_env());
    }
}
