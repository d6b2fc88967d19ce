//! Rule-based assistant policy
//!
//! Two stages: an oracle classifier constrained to the fixed intent
//! taxonomy, then a deterministic rule lookup that mutates the environment
//! and templates the reply. When no rule matches (unknown intent, missing
//! device, missing value) the policy answers with an explicit fallback and
//! changes no state.

use crate::core::error::Result;
use crate::core::types::PolicyKind;
use crate::household::environment::Environment;
use crate::oracle::{generate_json, CallSite, Oracle, RetryPolicy};
use crate::policy::intent::{Classification, IntentRule, RuleTable};
use crate::policy::{format_changes, AssistantPolicy, PolicyOutcome};
use async_trait::async_trait;
use std::sync::Arc;

const CLASSIFIER_ROLE: &str =
    "당신은 스마트홈 자유발화에서 의도와 대상 기기를 추출하는 NLU 분류기입니다. 반드시 JSON만 출력하세요.";

const FALLBACK_REPLY: &str =
    "죄송합니다. 원하시는 의도를 파악하기 어렵거나 현재 지원하지 않는 기능입니다.";

const DEVICE_NOT_FOUND_REPLY: &str = "죄송합니다. 말씀하신 기기를 집안에서 찾지 못했어요.";

pub struct RulePolicy {
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
    table: RuleTable,
}

impl RulePolicy {
    pub fn new(oracle: Arc<dyn Oracle>, retry: RetryPolicy, table: RuleTable) -> Self {
        Self {
            oracle,
            retry,
            table,
        }
    }

    fn classifier_prompt(&self, command: &str, env: &Environment) -> String {
        format!(
            r#"[의도 라벨 목록]
{labels}
- UNKNOWN: 위 어느 것에도 해당하지 않음

[집안 기기 목록]
{allowlist}

[사용자 명령]
"{command}"

[지시사항]
1. intent는 반드시 위 라벨 목록 중 하나여야 합니다.
2. device_entity에는 명령이 가리키는 기기 표현을, target_value에는 요청된 설정값(있을 때만)을 넣으세요.

[출력 형식]
{{ "intent": "LIGHT_ON", "device_entity": "거실 조명", "target_value": "" }}"#,
            labels = self.table.label_lines(),
            allowlist = env.device_allowlist(),
        )
    }

    /// Pick the device the rule applies to: a device whose name carries the
    /// rule's keyword, preferring one that also matches the classifier's
    /// entity hint.
    fn target_device(
        env: &Environment,
        rule: &IntentRule,
        entity_hint: &str,
    ) -> Option<String> {
        let candidates: Vec<&str> = env
            .rooms
            .values()
            .flat_map(|devices| devices.iter())
            .filter(|d| d.name.contains(&rule.device_keyword))
            .map(|d| d.name.as_str())
            .collect();
        if candidates.is_empty() {
            return env.resolve_device_name(entity_hint).filter(|name| {
                env.device(name)
                    .is_some_and(|d| d.properties.contains_key(&rule.property))
            });
        }
        let hinted = candidates
            .iter()
            .find(|name| !entity_hint.is_empty() && name.contains(entity_hint));
        Some(hinted.unwrap_or(&candidates[0]).to_string())
    }

    fn fallback(reply: &str) -> PolicyOutcome {
        PolicyOutcome {
            reply: reply.to_string(),
            changes: Vec::new(),
            change_description: format_changes(&[]),
        }
    }
}

#[async_trait]
impl AssistantPolicy for RulePolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::RuleBased
    }

    async fn respond(&self, command: &str, env: &mut Environment) -> Result<PolicyOutcome> {
        let prompt = self.classifier_prompt(command, env);
        let classification: Classification = generate_json(
            self.oracle.as_ref(),
            CallSite::IntentClassify,
            CLASSIFIER_ROLE,
            &prompt,
            &self.retry,
        )
        .await?;

        let Some(rule) = self.table.get(classification.intent) else {
            tracing::debug!(intent = ?classification.intent, "no rule for intent, falling back");
            return Ok(Self::fallback(FALLBACK_REPLY));
        };

        let Some(device) = Self::target_device(env, rule, &classification.device_entity) else {
            return Ok(Self::fallback(DEVICE_NOT_FOUND_REPLY));
        };

        let value = match &rule.value {
            Some(fixed) => fixed.clone(),
            None if !classification.target_value.trim().is_empty() => {
                classification.target_value.trim().to_string()
            }
            None => return Ok(Self::fallback(FALLBACK_REPLY)),
        };

        // A device matching the keyword but lacking the rule's property is a
        // taxonomy/environment mismatch, not a cell failure.
        if !env
            .device(&device)
            .is_some_and(|d| d.properties.contains_key(&rule.property))
        {
            return Ok(Self::fallback(DEVICE_NOT_FOUND_REPLY));
        }

        let change = env.apply(&device, &rule.property, &value)?;
        let reply = rule
            .reply
            .replace("{device}", &device)
            .replace("{value}", &value);
        let change_description = format_changes(std::slice::from_ref(&change));

        Ok(PolicyOutcome {
            reply,
            changes: vec![change],
            change_description,
        })
    }
}
