//! A failing cell must not take down its siblings, its tick, or the run

use async_trait::async_trait;
use gapsim::core::config::{RunContext, SimConfig};
use gapsim::core::error::{GapError, Result};
use gapsim::core::types::PolicyKind;
use gapsim::household::environment::Environment;
use gapsim::household::person::Person;
use gapsim::oracle::{CallSite, Oracle};
use gapsim::policy::RuleTable;
use gapsim::sim::engine::SimulationEngine;
use gapsim::sim::record::{CellPhase, CellStatus};
use serde_json::json;
use std::sync::Arc;

/// Healthy everywhere except the generative reply site, which is down.
struct GenerativeOutageOracle;

#[async_trait]
impl Oracle for GenerativeOutageOracle {
    async fn complete(&self, site: CallSite, _system: &str, _user: &str) -> Result<String> {
        Ok(match site {
            CallSite::GenerativeReply => {
                return Err(GapError::Oracle("model overloaded".into()))
            }
            CallSite::QuarterNarrative => {
                let quarters: Vec<_> = (1..=4)
                    .map(|i| {
                        json!({
                            "quarter_activity": format!("커피를 내리는 중 ({i}/4)"),
                            "visible_action": "주방에서 커피를 내리고 있다.",
                            "hidden_intent": "어두워서 불을 켜고 싶지만 손이 바쁘다.",
                            "concrete_action":
                                "주전자에 물을 받는다. 원두를 간다. 드리퍼에 물을 붓는다.",
                        })
                    })
                    .collect();
                json!({ "quarters": quarters }).to_string()
            }
            CallSite::Command => json!({ "command": "불 켜줘" }).to_string(),
            CallSite::IntentClassify => json!({
                "intent": "LIGHT_ON",
                "device_entity": "거실 조명",
                "target_value": "",
            })
            .to_string(),
            CallSite::SelfEval | CallSite::ObserverEval => {
                json!({ "score": 5, "reason": "무난했다." }).to_string()
            }
        })
    }
}

#[tokio::test]
async fn generative_outage_fails_only_generative_cells() {
    let scratch =
        std::env::temp_dir().join(format!("gapsim-test-containment-{}", uuid::Uuid::new_v4()));
    let mut config = SimConfig::default();
    config.paths.run_log = scratch.join("run_log.jsonl");
    config.paths.memory_log = scratch.join("memory_log.jsonl");
    config.max_attempts = 2;
    config.retry_delay_ms = 1;

    let canonical: Environment = serde_json::from_value(json!({
        "rooms": {
            "거실": [{
                "name": "거실 조명",
                "properties": { "power": { "value": "off", "observable": true } }
            }]
        }
    }))
    .unwrap();
    let person: Person = serde_json::from_value(json!({
        "name": "지민",
        "traits": "실용적",
        "schedule": [{ "time": "월요일 09:00", "activity": "아침 준비" }]
    }))
    .unwrap();

    let engine = SimulationEngine::new(
        RunContext::new(config),
        Arc::new(GenerativeOutageOracle),
        RuleTable::default(),
    );
    let output = engine.run(&canonical, &[person]).await.unwrap();

    assert_eq!(output.ticks.len(), 4);
    for tick in &output.ticks {
        // still exactly four records; the outage never collapses a tick
        assert_eq!(tick.records().len(), 4);
        for record in tick.records() {
            match record.cell.policy {
                PolicyKind::Generative => {
                    match &record.status {
                        CellStatus::Failed { phase, error } => {
                            assert_eq!(*phase, CellPhase::AssistantResponded);
                            assert!(error.contains("model overloaded"));
                        }
                        CellStatus::Completed => panic!("generative cell should have failed"),
                    }
                    // aborted cells roll back: nothing applied, nothing replied
                    assert!(record.state_changes.is_empty());
                    assert!(record.reply.is_empty());
                }
                PolicyKind::RuleBased => {
                    assert!(record.status.is_completed());
                    assert_eq!(record.state_changes.len(), 1);
                    assert_eq!(record.state_changes[0].after, "on");
                }
            }
        }
    }
}
