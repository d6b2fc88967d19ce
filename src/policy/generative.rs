//! Generative assistant policy
//!
//! Free-form interpretation: the oracle reads the branch environment and the
//! command, and proposes both the reply wording and the state mutations.
//! Proposed mutations are resolved against the real environment before being
//! applied; a mutation that cannot be resolved is a state-consistency
//! failure contained to the calling cell.

use crate::core::error::{GapError, Result};
use crate::core::types::PolicyKind;
use crate::household::environment::{Environment, StateChange};
use crate::oracle::{generate_json, CallSite, Oracle, RetryPolicy};
use crate::policy::{format_changes, AssistantPolicy, PolicyOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const SYSTEM_ROLE: &str =
    "당신은 스마트홈 AI 비서입니다. 현재 집안의 가용 기기 상태를 보고 사용자의 명령을 수행하세요. 반드시 JSON만 출력하세요.";

pub struct GenerativePolicy {
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
}

/// Oracle proposal, schema-checked at the boundary. `before` values are
/// deliberately absent: the real before state is read from the environment
/// at application time, never trusted from generation.
#[derive(Debug, Deserialize)]
struct VaProposal {
    response_text: String,
    #[serde(default)]
    changes: Vec<ChangeProposal>,
    #[serde(default)]
    state_change_description: String,
}

#[derive(Debug, Deserialize)]
struct ChangeProposal {
    device: String,
    property: String,
    after: String,
}

impl GenerativePolicy {
    pub fn new(oracle: Arc<dyn Oracle>, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    fn prompt(command: &str, env: &Environment) -> Result<String> {
        let env_state = serde_json::to_string_pretty(env)?;
        Ok(format!(
            r#"[집안 기기 목록]
{allowlist}

[현재 기기 상태]
{env_state}

[사용자 명령]
"{command}"

[지시사항]
1. 명령을 해석해 적절한 기기를 찾고 상태를 변경하세요.
2. 명령이 모호하면 가장 적절한 기기를 추론해 실행하세요.
3. 실행할 수 없는 명령이면 정중히 거절하고 changes를 비워 두세요.
4. device와 property는 위 [집안 기기 목록]에 있는 정확한 값을 쓰세요.
5. 응답(response_text)은 한국어로 자연스럽게 작성하세요.
6. state_change_description은 기기가 어떻게 조작되었는지 한 문장으로 요약하세요. 변화가 없으면 빈 문자열.

[출력 형식]
{{
  "response_text": "네, 거실 조명을 켰습니다.",
  "changes": [{{ "device": "거실 조명", "property": "power", "after": "on" }}],
  "state_change_description": "거실 조명이 켜졌다."
}}"#,
            allowlist = env.device_allowlist(),
        ))
    }

    /// Resolve one proposal to a concrete (device, property) pair, tolerating
    /// the usual generation slop: sloppy device references and the
    /// brightness-for-power confusion on plain switches.
    fn resolve(
        env: &Environment,
        proposal: &ChangeProposal,
    ) -> Result<(String, String, String)> {
        let device = env.resolve_device_name(&proposal.device).ok_or_else(|| {
            GapError::UnknownProperty {
                device: proposal.device.clone(),
                property: proposal.property.clone(),
            }
        })?;
        let properties = &env.device(&device).expect("resolved device exists").properties;

        if properties.contains_key(&proposal.property) {
            return Ok((device, proposal.property.clone(), proposal.after.clone()));
        }
        if proposal.property == "brightness" && properties.contains_key("power") {
            let after = if proposal.after.trim() == "0" { "off" } else { "on" };
            tracing::debug!(%device, "mapped brightness proposal onto power");
            return Ok((device, "power".to_string(), after.to_string()));
        }
        Err(GapError::UnknownProperty {
            device,
            property: proposal.property.clone(),
        })
    }
}

#[async_trait]
impl AssistantPolicy for GenerativePolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Generative
    }

    async fn respond(&self, command: &str, env: &mut Environment) -> Result<PolicyOutcome> {
        let prompt = Self::prompt(command, env)?;
        let proposal: VaProposal = generate_json(
            self.oracle.as_ref(),
            CallSite::GenerativeReply,
            SYSTEM_ROLE,
            &prompt,
            &self.retry,
        )
        .await?;

        let mut changes: Vec<StateChange> = Vec::with_capacity(proposal.changes.len());
        for change in &proposal.changes {
            let (device, property, after) = Self::resolve(env, change)?;
            changes.push(env.apply(&device, &property, &after)?);
        }

        let change_description = if proposal.state_change_description.trim().is_empty() {
            format_changes(&changes)
        } else {
            proposal.state_change_description
        };

        Ok(PolicyOutcome {
            reply: proposal.response_text,
            changes,
            change_description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ScriptedOracle;
    use std::time::Duration;

    fn sample_env() -> Environment {
        serde_json::from_value(serde_json::json!({
            "rooms": {
                "거실": [{
                    "name": "거실 조명",
                    "properties": {
                        "power": { "value": "off", "observable": true }
                    }
                }]
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn applies_proposed_power_change() {
        let policy = GenerativePolicy::new(
            Arc::new(ScriptedOracle::new(7)),
            RetryPolicy::new(2, Duration::from_millis(1)),
        );
        let mut env = sample_env();
        let outcome = policy.respond("불 켜줘", &mut env).await.unwrap();
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].before, "off");
        assert_eq!(outcome.changes[0].after, "on");
        assert_eq!(
            env.device("거실 조명").unwrap().properties["power"].value,
            "on"
        );
    }

    #[test]
    fn brightness_fallback_maps_to_power() {
        let env = sample_env();
        let proposal = ChangeProposal {
            device: "거실 조명".into(),
            property: "brightness".into(),
            after: "0".into(),
        };
        let (device, property, after) = GenerativePolicy::resolve(&env, &proposal).unwrap();
        assert_eq!((device.as_str(), property.as_str(), after.as_str()),
                   ("거실 조명", "power", "off"));
    }

    #[test]
    fn unresolvable_mutation_is_a_consistency_error() {
        let env = sample_env();
        let proposal = ChangeProposal {
            device: "안방 가습기".into(),
            property: "power".into(),
            after: "on".into(),
        };
        assert!(matches!(
            GenerativePolicy::resolve(&env, &proposal),
            Err(GapError::UnknownProperty { .. })
        ));
    }
}
