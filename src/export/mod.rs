//! Export sinks and derived gap metrics
//!
//! Gap = self rating minus observer rating, computed here at export time and
//! never persisted ahead of both scores existing. Sinks receive only
//! complete records: a completed cell missing a required field is a bug and
//! is rejected before anything is written.

use crate::core::error::{GapError, Result};
use crate::core::types::Cell;
use crate::household::person::Person;
use crate::memory::MemoryRecord;
use crate::sim::record::{
    CellStatus, InteractionRecord, SelfAssessment, TickDisposition, TickRecord,
};
use serde::Serialize;
use std::path::PathBuf;

/// Two-way classification of the self/observer gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapClass {
    GapPresent,
    NoGap,
}

impl GapClass {
    /// Short code used in tabular exports (big gap / small gap).
    pub fn code(&self) -> &'static str {
        match self {
            GapClass::GapPresent => "BG",
            GapClass::NoGap => "SG",
        }
    }
}

/// Self minus observer score, when both exist.
pub fn gap(record: &InteractionRecord) -> Option<i32> {
    let self_score = record.self_eval.score()? as i32;
    let observer_score = record.observer_eval.as_ref()?.score as i32;
    Some(self_score - observer_score)
}

pub fn classify(gap: i32, threshold: i32) -> GapClass {
    if gap >= threshold {
        GapClass::GapPresent
    } else {
        GapClass::NoGap
    }
}

/// Reject partial records before anything reaches a sink. Only completed
/// cells are held to this; failed cells legitimately carry empty fields.
pub fn ensure_complete(record: &InteractionRecord) -> Result<()> {
    if !record.status.is_completed() {
        return Ok(());
    }
    let missing = [
        ("command", record.command.is_empty()),
        ("reply", record.reply.is_empty()),
        ("change_description", record.change_description.is_empty()),
        ("quarter_activity", record.quarter_activity.is_empty()),
        ("concrete_action", record.concrete_action.is_empty()),
    ]
    .into_iter()
    .find(|(_, empty)| *empty);
    if let Some((field, _)) = missing {
        return Err(GapError::Artifact(format!(
            "completed record at tick {} cell {} missing {field}",
            record.tick,
            record.cell.label()
        )));
    }
    if !record.self_eval_consistent() {
        return Err(GapError::Artifact(format!(
            "record at tick {} cell {} has inconsistent self-evaluation",
            record.tick,
            record.cell.label()
        )));
    }
    Ok(())
}

/// Everything a sink receives
pub struct ExportBundle<'a> {
    pub persons: &'a [Person],
    pub ticks: &'a [TickRecord],
    pub memories: &'a [MemoryRecord],
    pub gap_threshold: i32,
}

pub trait ExportSink {
    fn export(&self, bundle: &ExportBundle<'_>) -> Result<()>;
}

fn check_bundle(bundle: &ExportBundle<'_>) -> Result<()> {
    for tick in bundle.ticks {
        for record in tick.records() {
            ensure_complete(record)?;
        }
    }
    Ok(())
}

/// Raw JSON dump of all three record sets
pub struct JsonSink {
    dir: PathBuf,
}

impl JsonSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ExportSink for JsonSink {
    fn export(&self, bundle: &ExportBundle<'_>) -> Result<()> {
        check_bundle(bundle)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(
            self.dir.join("persons.json"),
            serde_json::to_string_pretty(bundle.persons)?,
        )?;
        std::fs::write(
            self.dir.join("interactions.json"),
            serde_json::to_string_pretty(bundle.ticks)?,
        )?;
        std::fs::write(
            self.dir.join("memories.json"),
            serde_json::to_string_pretty(bundle.memories)?,
        )?;
        tracing::info!(dir = %self.dir.display(), "JSON export written");
        Ok(())
    }
}

/// Tabular export: one row per tick, the four cells' columns side by side,
/// gap and classification derived in place.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn interaction_header() -> String {
        let mut columns = vec![
            "person".to_string(),
            "time".to_string(),
            "tick".to_string(),
            "hour_activity".to_string(),
            "quarter_activity".to_string(),
            "visible_action".to_string(),
            "hidden_intent".to_string(),
            "concrete_action".to_string(),
            "disposition".to_string(),
        ];
        for cell in Cell::ALL {
            let label = cell.label();
            for suffix in [
                "command",
                "reply",
                "state_changes",
                "SE",
                "SE_reason",
                "TE",
                "TE_reason",
                "gap",
                "class",
                "status",
            ] {
                columns.push(format!("[{label}] {suffix}"));
            }
        }
        columns.join(",")
    }

    fn interaction_row(tick: &TickRecord, threshold: i32) -> String {
        let mut fields = vec![
            csv_escape(&tick.person_name),
            csv_escape(&tick.time.to_string()),
            tick.tick.to_string(),
            csv_escape(&tick.hour_activity),
            csv_escape(&tick.quarter_activity),
            csv_escape(&tick.visible_action),
            csv_escape(&tick.hidden_intent),
            csv_escape(&tick.concrete_action),
        ];
        match &tick.disposition {
            TickDisposition::Executed { .. } => fields.push("executed".to_string()),
            TickDisposition::Skipped { reason } => {
                fields.push(csv_escape(&format!("skipped: {reason}")))
            }
        }
        for cell in Cell::ALL {
            match tick.records().iter().find(|r| r.cell == cell) {
                Some(record) => fields.extend(Self::cell_fields(record, threshold)),
                None => fields.extend(std::iter::repeat(String::new()).take(10)),
            }
        }
        fields.join(",")
    }

    fn cell_fields(record: &InteractionRecord, threshold: i32) -> Vec<String> {
        let changes = record
            .state_changes
            .iter()
            .map(|c| format!("{}.{}: {} -> {}", c.device, c.property, c.before, c.after))
            .collect::<Vec<_>>()
            .join("; ");
        let (se, se_reason) = match &record.self_eval {
            SelfAssessment::Rated { score, reason } => (score.to_string(), reason.clone()),
            SelfAssessment::NotApplicable => ("N/A".to_string(), String::new()),
        };
        let (te, te_reason) = match &record.observer_eval {
            Some(evaluation) => (evaluation.score.to_string(), evaluation.reason.clone()),
            None => (String::new(), String::new()),
        };
        let (gap_text, class_text) = match gap(record) {
            Some(g) => (g.to_string(), classify(g, threshold).code().to_string()),
            None => (String::new(), String::new()),
        };
        let status = match &record.status {
            CellStatus::Completed => "completed".to_string(),
            CellStatus::Failed { phase, error } => format!("failed at {phase:?}: {error}"),
        };
        vec![
            csv_escape(&record.command),
            csv_escape(&record.reply),
            csv_escape(&changes),
            se,
            csv_escape(&se_reason),
            te,
            csv_escape(&te_reason),
            gap_text,
            class_text,
            csv_escape(&status),
        ]
    }
}

impl ExportSink for CsvSink {
    fn export(&self, bundle: &ExportBundle<'_>) -> Result<()> {
        check_bundle(bundle)?;
        std::fs::create_dir_all(&self.dir)?;

        let mut interactions = String::new();
        interactions.push_str(&Self::interaction_header());
        interactions.push('\n');
        for tick in bundle.ticks {
            interactions.push_str(&Self::interaction_row(tick, bundle.gap_threshold));
            interactions.push('\n');
        }
        std::fs::write(self.dir.join("interaction_history.csv"), interactions)?;

        let mut memories = String::from("person,created_tick,kind,content\n");
        for memory in bundle.memories {
            memories.push_str(&format!(
                "{},{},{:?},{}\n",
                memory.person.0,
                memory.created_tick,
                memory.kind,
                csv_escape(&memory.content)
            ));
        }
        std::fs::write(self.dir.join("memory_history.csv"), memories)?;

        tracing::info!(dir = %self.dir.display(), "CSV export written");
        Ok(())
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SimTime;
    use crate::sim::record::{CellStatus, Evaluation};

    fn completed_record(se: u8, te: Option<u8>) -> InteractionRecord {
        InteractionRecord {
            cell: Cell::ALL[0],
            time: SimTime::new(0, 9, 0),
            tick: 36,
            hour_activity: "아침 준비".into(),
            quarter_activity: "커피를 내리는 중".into(),
            concrete_action: "물을 받는다. 원두를 간다. 붓는다.".into(),
            command: "불 켜줘".into(),
            reply: "네, 켰습니다.".into(),
            state_changes: vec![],
            change_description: "기기 상태 변화 없음".into(),
            self_eval: SelfAssessment::Rated {
                score: se,
                reason: "만족".into(),
            },
            observer_eval: te.map(|score| Evaluation {
                score,
                reason: "무난해 보였다".into(),
            }),
            status: CellStatus::Completed,
        }
    }

    #[test]
    fn gap_requires_both_scores() {
        assert_eq!(gap(&completed_record(6, Some(3))), Some(3));
        assert_eq!(gap(&completed_record(6, None)), None);
    }

    #[test]
    fn gap_of_three_crosses_a_threshold_of_three() {
        let g = gap(&completed_record(6, Some(3))).unwrap();
        assert_eq!(classify(g, 3), GapClass::GapPresent);
        assert_eq!(classify(g, 4), GapClass::NoGap);
    }

    #[test]
    fn incomplete_completed_record_is_rejected() {
        let mut record = completed_record(6, Some(3));
        record.reply.clear();
        assert!(ensure_complete(&record).is_err());
    }

    #[test]
    fn failed_record_may_be_sparse() {
        let mut record = completed_record(6, None);
        record.status = CellStatus::Failed {
            phase: crate::sim::record::CellPhase::CommandIssued,
            error: "oracle down".into(),
        };
        record.command.clear();
        record.self_eval = SelfAssessment::NotApplicable;
        assert!(ensure_complete(&record).is_ok());
    }

    #[test]
    fn csv_escaping_handles_quotes_and_commas() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
