//! Tick generation - schedule hours onto the quarter grid
//!
//! One schedule hour becomes `60 / tick_minutes` ordered quarter
//! descriptors. Content comes from the narrative oracle; this module only
//! sequences, validates, and applies the feasibility gate. The hour-level
//! label is inherited verbatim so quarters cannot contradict it.

use crate::core::clock::SimTime;
use crate::core::config::SimConfig;
use crate::core::error::{GapError, Result};
use crate::core::types::Tick;
use crate::household::person::{Person, ScheduleEntry};
use crate::oracle::{generate_json_validated, CallSite, Oracle, RetryPolicy};
use serde::Deserialize;

const NARRATIVE_ROLE: &str =
    "당신은 한국어로 시뮬레이션 데이터를 생성합니다. 반드시 JSON만 출력하세요.";

/// One quarter-hour slice of a schedule hour
#[derive(Debug, Clone, PartialEq)]
pub struct QuarterDescriptor {
    pub time: SimTime,
    pub tick: Tick,
    pub hour_activity: String,
    pub quarter_activity: String,
    /// Observable-only description; carries no intent.
    pub visible_action: String,
    /// Concrete constraint/discomfort/goal behind the activity.
    pub hidden_intent: String,
    /// At least three sequential sentences consistent with both levels.
    pub concrete_action: String,
    pub command_eligible: bool,
}

#[derive(Debug, Deserialize)]
struct NarrativeOut {
    quarters: Vec<QuarterOut>,
}

#[derive(Debug, Deserialize)]
struct QuarterOut {
    quarter_activity: String,
    visible_action: String,
    hidden_intent: String,
    concrete_action: String,
}

pub struct TickGenerator<'a> {
    oracle: &'a dyn Oracle,
    retry: RetryPolicy,
    config: &'a SimConfig,
}

impl<'a> TickGenerator<'a> {
    pub fn new(oracle: &'a dyn Oracle, retry: RetryPolicy, config: &'a SimConfig) -> Self {
        Self {
            oracle,
            retry,
            config,
        }
    }

    /// Split one schedule hour into ordered quarter descriptors.
    pub async fn quarters(
        &self,
        person: &Person,
        entry: &ScheduleEntry,
    ) -> Result<Vec<QuarterDescriptor>> {
        let count = self.config.quarters_per_hour() as usize;
        let prompt = self.prompt(person, entry, count);
        let narrative: NarrativeOut = generate_json_validated(
            self.oracle,
            CallSite::QuarterNarrative,
            NARRATIVE_ROLE,
            &prompt,
            &self.retry,
            |out: &NarrativeOut| validate_narrative(out, count),
        )
        .await?;

        Ok(narrative
            .quarters
            .into_iter()
            .enumerate()
            .map(|(i, q)| {
                let time = entry.time.add_minutes(i as u32 * self.config.tick_minutes);
                let command_eligible = self.is_command_eligible(&q.quarter_activity);
                QuarterDescriptor {
                    time,
                    tick: time.tick_index(self.config.tick_minutes),
                    hour_activity: entry.activity.clone(),
                    quarter_activity: q.quarter_activity,
                    visible_action: q.visible_action,
                    hidden_intent: q.hidden_intent,
                    concrete_action: q.concrete_action,
                    command_eligible,
                }
            })
            .collect())
    }

    /// Configurable keyword gate: activities incompatible with speaking a
    /// command (asleep, out of the house) produce zero interaction records.
    pub fn is_command_eligible(&self, quarter_activity: &str) -> bool {
        !self
            .config
            .ineligible_keywords
            .iter()
            .any(|keyword| quarter_activity.contains(keyword.as_str()))
    }

    fn prompt(&self, person: &Person, entry: &ScheduleEntry, count: usize) -> String {
        format!(
            r#"현재 시각은 {time}입니다. 시간대 활동: "{activity}"
구간 수: {count}
인물 특성: {traits}

위 한 시간을 {minutes}분 단위 {count}개 구간으로 나누어 각 구간을 묘사하세요.

요구 사항:
1) quarter_activity: 시간대 활동과 모순되지 않는 구간별 활동 요약.
2) visible_action: 관찰 가능한 묘사만 합니다. 의도는 드러내지 않습니다.
3) hidden_intent: 구체적인 제약/불편/의도를 포함합니다.
4) concrete_action: 순차적인 3문장 이상의 구체 행동 묘사.
5) 반드시 JSON만 출력합니다.

출력 형식:
{{
  "quarters": [
    {{
      "quarter_activity": "...",
      "visible_action": "...",
      "hidden_intent": "...",
      "concrete_action": "..."
    }}
  ]
}}"#,
            time = entry.time,
            activity = entry.activity,
            minutes = self.config.tick_minutes,
            traits = person.traits,
        )
    }
}

fn validate_narrative(out: &NarrativeOut, expected: usize) -> Result<()> {
    if out.quarters.len() != expected {
        return Err(GapError::Schema(format!(
            "expected {expected} quarters, got {}",
            out.quarters.len()
        )));
    }
    for (i, q) in out.quarters.iter().enumerate() {
        if q.quarter_activity.trim().is_empty() || q.visible_action.trim().is_empty() {
            return Err(GapError::Schema(format!("quarter {i} has empty fields")));
        }
        if sentence_count(&q.concrete_action) < 3 {
            return Err(GapError::Schema(format!(
                "quarter {i} concrete_action has fewer than 3 sentences"
            )));
        }
    }
    Ok(())
}

fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PersonId;
    use crate::oracle::ScriptedOracle;
    use std::time::Duration;

    fn person() -> Person {
        Person {
            id: PersonId::new(),
            name: "지민".into(),
            traits: "아침형 1인 가구 직장인".into(),
            schedule: vec![],
        }
    }

    fn config() -> SimConfig {
        SimConfig::default()
    }

    #[test]
    fn counts_sentences() {
        assert_eq!(sentence_count("물을 받는다. 원두를 간다. 붓는다."), 3);
        assert_eq!(sentence_count("한 문장."), 1);
    }

    #[tokio::test]
    async fn splits_hour_into_four_quarters_on_the_grid() {
        let oracle = ScriptedOracle::new(11);
        let config = config();
        let generator =
            TickGenerator::new(&oracle, RetryPolicy::new(2, Duration::from_millis(1)), &config);
        let entry = ScheduleEntry {
            time: SimTime::parse("월요일 09:00").unwrap(),
            activity: "아침 준비".into(),
        };
        let quarters = generator.quarters(&person(), &entry).await.unwrap();
        assert_eq!(quarters.len(), 4);
        assert_eq!(quarters[0].time.to_string(), "월요일 09:00");
        assert_eq!(quarters[3].time.to_string(), "월요일 09:45");
        assert!(quarters.iter().all(|q| q.hour_activity == "아침 준비"));
        assert_eq!(quarters[1].tick, quarters[0].tick + 1);
        assert!(quarters.iter().all(|q| sentence_count(&q.concrete_action) >= 3));
    }

    #[test]
    fn sleep_keywords_gate_commands() {
        let oracle = ScriptedOracle::new(1);
        let config = config();
        let generator =
            TickGenerator::new(&oracle, RetryPolicy::new(1, Duration::ZERO), &config);
        assert!(!generator.is_command_eligible("수면 중"));
        assert!(generator.is_command_eligible("커피를 내리는 중"));
    }
}
