//! Interaction record shapes
//!
//! One `InteractionRecord` per (person, tick, cell); exactly four per
//! command-eligible tick, zero for feasibility-gated ticks. These are the
//! shapes the export sink and the downstream gap analysis consume, so every
//! field is typed and serialized; no ad hoc JSON access anywhere downstream.

use crate::core::clock::SimTime;
use crate::core::types::{Cell, ContextMode, PersonId, Tick};
use crate::household::environment::StateChange;
use serde::{Deserialize, Serialize};

/// Pipeline state a cell progresses through. Kept on failed records so the
/// failure point is visible in exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellPhase {
    Pending,
    ContextDerived,
    CommandIssued,
    AssistantResponded,
    SelfEvaluated,
    ObserverEvaluated,
    Done,
}

/// Terminal status of one cell's tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellStatus {
    Completed,
    /// The cell failed at `phase`; other cells were unaffected.
    Failed { phase: CellPhase, error: String },
}

impl CellStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, CellStatus::Completed)
    }
}

/// A 1-7 satisfaction rating with justification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: u8,
    pub reason: String,
}

/// Self-evaluation outcome. Context-absent cells withhold the hidden intent,
/// so a genuine self rating is impossible there; they carry the explicit
/// not-applicable sentinel rather than a default number that would bias gap
/// statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelfAssessment {
    Rated { score: u8, reason: String },
    NotApplicable,
}

impl SelfAssessment {
    pub fn score(&self) -> Option<u8> {
        match self {
            SelfAssessment::Rated { score, .. } => Some(*score),
            SelfAssessment::NotApplicable => None,
        }
    }
}

/// One branch cell's complete interaction at one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub cell: Cell,
    pub time: SimTime,
    pub tick: Tick,
    /// Hour-level activity label inherited from the schedule entry.
    pub hour_activity: String,
    /// Quarter-level activity summary.
    pub quarter_activity: String,
    /// Multi-sentence concrete action narrative for this quarter.
    pub concrete_action: String,
    pub command: String,
    pub reply: String,
    pub state_changes: Vec<StateChange>,
    pub change_description: String,
    pub self_eval: SelfAssessment,
    /// Filled by the later observer pass.
    pub observer_eval: Option<Evaluation>,
    pub status: CellStatus,
}

impl InteractionRecord {
    /// Sanity check tying the sentinel to the cell kind.
    pub fn self_eval_consistent(&self) -> bool {
        match self.cell.context {
            ContextMode::ContextPresent => {
                !self.status.is_completed() || matches!(self.self_eval, SelfAssessment::Rated { .. })
            }
            ContextMode::ContextAbsent => {
                matches!(self.self_eval, SelfAssessment::NotApplicable)
            }
        }
    }
}

/// What happened at one (person, tick)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickDisposition {
    /// Command-eligible: all four branch cells ran.
    Executed { records: Vec<InteractionRecord> },
    /// Feasibility-gated: speaking was impossible, zero records by design.
    Skipped { reason: String },
}

/// Per-tick envelope shared by the four cells. The hidden intent lives here,
/// once per tick: it is input to context-present command generation and
/// self-evaluation, and is never copied into observer-facing structures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub person: PersonId,
    pub person_name: String,
    pub time: SimTime,
    pub tick: Tick,
    pub hour_activity: String,
    pub quarter_activity: String,
    /// Outwardly observable description of what the person is doing.
    pub visible_action: String,
    /// The withheld motivational context (the controlled variable).
    pub hidden_intent: String,
    pub concrete_action: String,
    pub disposition: TickDisposition,
}

impl TickRecord {
    pub fn records(&self) -> &[InteractionRecord] {
        match &self.disposition {
            TickDisposition::Executed { records } => records,
            TickDisposition::Skipped { .. } => &[],
        }
    }

    pub fn records_mut(&mut self) -> &mut [InteractionRecord] {
        match &mut self.disposition {
            TickDisposition::Executed { records } => records,
            TickDisposition::Skipped { .. } => &mut [],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PolicyKind;

    fn record(context: ContextMode, self_eval: SelfAssessment) -> InteractionRecord {
        InteractionRecord {
            cell: Cell {
                context,
                policy: PolicyKind::Generative,
            },
            time: SimTime::new(0, 9, 0),
            tick: 36,
            hour_activity: "아침 준비".into(),
            quarter_activity: "커피를 내리는 중".into(),
            concrete_action: "주전자에 물을 받는다. 원두를 간다. 드리퍼에 붓는다.".into(),
            command: "불 켜줘".into(),
            reply: "네, 켰습니다.".into(),
            state_changes: vec![],
            change_description: "기기 상태 변화 없음".into(),
            self_eval,
            observer_eval: None,
            status: CellStatus::Completed,
        }
    }

    #[test]
    fn sentinel_must_match_context_mode() {
        let rated = SelfAssessment::Rated {
            score: 6,
            reason: "만족".into(),
        };
        assert!(record(ContextMode::ContextPresent, rated.clone()).self_eval_consistent());
        assert!(record(ContextMode::ContextAbsent, SelfAssessment::NotApplicable)
            .self_eval_consistent());
        assert!(!record(ContextMode::ContextAbsent, rated).self_eval_consistent());
    }

    #[test]
    fn skipped_tick_has_no_records() {
        let tick = TickRecord {
            person: PersonId::new(),
            person_name: "지민".into(),
            time: SimTime::new(0, 23, 0),
            tick: 92,
            hour_activity: "수면".into(),
            quarter_activity: "수면 중".into(),
            visible_action: "침대에 누워 있다.".into(),
            hidden_intent: "".into(),
            concrete_action: "".into(),
            disposition: TickDisposition::Skipped {
                reason: "발화 불가 활동".into(),
            },
        };
        assert!(tick.records().is_empty());
    }
}
