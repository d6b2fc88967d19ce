//! Observer evaluation pass
//!
//! A later pass over completed records that attaches a third-person 1-7
//! rating. The observer is a non-mind-reading party: its entire input is an
//! [`ObserverView`], a type that carries only the command, the reply, the
//! outwardly visible action, and the observable-only change description.
//! Hidden intent has no field here, so the self/observer information
//! asymmetry is enforced by construction, not convention.

use crate::core::error::{GapError, Result};
use crate::household::environment::Environment;
use crate::oracle::{generate_json_validated, CallSite, Oracle, RetryPolicy};
use crate::sim::record::{Evaluation, InteractionRecord, TickRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const OBSERVER_ROLE: &str =
    "당신은 관찰자 관점에서 평가합니다. 반드시 JSON만 출력하세요.";

/// Exactly what an outside observer may see of one interaction
#[derive(Debug, Clone, Serialize)]
pub struct ObserverView {
    pub visible_action: String,
    pub command: String,
    pub reply: String,
    /// Sentences for observable properties only; non-observable before/after
    /// values never reach this field.
    pub observable_changes: String,
}

impl ObserverView {
    pub fn new(visible_action: &str, record: &InteractionRecord, env: &Environment) -> Self {
        Self {
            visible_action: visible_action.to_string(),
            command: record.command.clone(),
            reply: record.reply.clone(),
            observable_changes: env.observable_change_text(&record.state_changes),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RatingOut {
    score: u8,
    reason: String,
}

pub struct ObserverEvaluator {
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
}

impl ObserverEvaluator {
    pub fn new(oracle: Arc<dyn Oracle>, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    /// Fill observer ratings for every completed, not-yet-rated record.
    /// Failures are contained per record: the record stays unrated and the
    /// pass continues. Returns how many ratings were attached.
    pub async fn evaluate_run(
        &self,
        env: &Environment,
        ticks: &mut [TickRecord],
    ) -> Result<usize> {
        let mut rated = 0usize;
        for tick in ticks.iter_mut() {
            let visible_action = tick.visible_action.clone();
            for record in tick.records_mut() {
                if !record.status.is_completed() || record.observer_eval.is_some() {
                    continue;
                }
                let view = ObserverView::new(&visible_action, record, env);
                match self.rate(&view).await {
                    Ok(evaluation) => {
                        record.observer_eval = Some(evaluation);
                        rated += 1;
                    }
                    Err(error) => {
                        tracing::warn!(cell = record.cell.label(), tick = record.tick, %error,
                            "observer rating failed, leaving record unrated");
                    }
                }
            }
        }
        Ok(rated)
    }

    async fn rate(&self, view: &ObserverView) -> Result<Evaluation> {
        let prompt = format!(
            r#"[관찰 데이터]
- 행동: {visible}
- 관측된 결과: {changes}
- 대화: 사용자="{command}" / VA="{reply}"

CCTV로 지켜보는 제 3자 입장에서, 이 상호작용이 얼마나 만족스러워 보입니까? (1-7점)
반드시 JSON만 출력하세요.

출력 형식:
{{
  "score": 1,
  "reason": "이유"
}}"#,
            visible = view.visible_action,
            changes = view.observable_changes,
            command = view.command,
            reply = view.reply,
        );
        let rating: RatingOut = generate_json_validated(
            self.oracle.as_ref(),
            CallSite::ObserverEval,
            OBSERVER_ROLE,
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
        .await?;
        Ok(Evaluation {
            score: rating.score,
            reason: rating.reason,
        })
    }
}
