//! Fixed intent taxonomy for the rule-based assistant
//!
//! The classifier is constrained to these labels; each label maps to one
//! deterministic device mutation and reply template. The table ships with
//! built-in defaults and can be replaced wholesale from a TOML artifact.

use crate::core::error::{GapError, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported command intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentLabel {
    LightOn,
    LightOff,
    TvOn,
    TvOff,
    AcOn,
    AcOff,
    SetTemperature,
    CurtainOpen,
    CurtainClose,
    /// Anything the taxonomy does not cover; also the serde fallback for
    /// labels the classifier invents.
    #[serde(other)]
    Unknown,
}

/// Classifier output: label plus the entity hints the rule may need
#[derive(Debug, Clone, Deserialize)]
pub struct Classification {
    pub intent: IntentLabel,
    #[serde(default)]
    pub device_entity: String,
    #[serde(default)]
    pub target_value: String,
}

/// One deterministic rule: which device kind to touch, how, and what to say
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRule {
    pub intent: IntentLabel,
    /// Substring identifying the target device kind ("조명", "에어컨").
    pub device_keyword: String,
    pub property: String,
    /// Fixed target value; `None` takes the classifier's `target_value`
    /// (e.g. a requested temperature).
    #[serde(default)]
    pub value: Option<String>,
    /// Reply template with `{device}` and `{value}` placeholders.
    pub reply: String,
}

/// Intent -> rule lookup table
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: AHashMap<IntentLabel, IntentRule>,
}

#[derive(Deserialize)]
struct RuleTableFile {
    #[serde(rename = "rule")]
    rules: Vec<IntentRule>,
}

impl RuleTable {
    pub fn get(&self, intent: IntentLabel) -> Option<&IntentRule> {
        self.rules.get(&intent)
    }

    /// Load a replacement table from TOML (`[[rule]]` entries).
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: RuleTableFile =
            toml::from_str(text).map_err(|e| GapError::Config(e.to_string()))?;
        if file.rules.is_empty() {
            return Err(GapError::Config("rule table has no rules".into()));
        }
        Ok(Self {
            rules: file.rules.into_iter().map(|r| (r.intent, r)).collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Label list rendered for the classifier prompt.
    pub fn label_lines(&self) -> String {
        let mut intents: Vec<&IntentRule> = self.rules.values().collect();
        intents.sort_by_key(|r| format!("{:?}", r.intent));
        intents
            .iter()
            .map(|r| {
                format!(
                    "- {}: {} {} 제어",
                    serde_json::to_value(r.intent)
                        .ok()
                        .and_then(|v| v.as_str().map(String::from))
                        .unwrap_or_default(),
                    r.device_keyword,
                    r.property
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        let on = |intent, keyword: &str, verb: &str| IntentRule {
            intent,
            device_keyword: keyword.to_string(),
            property: "power".to_string(),
            value: Some(if verb == "켰습니다" { "on" } else { "off" }.to_string()),
            reply: format!("네, {{device}}을(를) {verb}."),
        };
        let rules = vec![
            on(IntentLabel::LightOn, "조명", "켰습니다"),
            on(IntentLabel::LightOff, "조명", "껐습니다"),
            on(IntentLabel::TvOn, "TV", "켰습니다"),
            on(IntentLabel::TvOff, "TV", "껐습니다"),
            on(IntentLabel::AcOn, "에어컨", "켰습니다"),
            on(IntentLabel::AcOff, "에어컨", "껐습니다"),
            IntentRule {
                intent: IntentLabel::SetTemperature,
                device_keyword: "에어컨".to_string(),
                property: "temperature".to_string(),
                value: None,
                reply: "네, {device} 온도를 {value}로 설정했습니다.".to_string(),
            },
            IntentRule {
                intent: IntentLabel::CurtainOpen,
                device_keyword: "커튼".to_string(),
                property: "position".to_string(),
                value: Some("open".to_string()),
                reply: "네, {device}을(를) 열었습니다.".to_string(),
            },
            IntentRule {
                intent: IntentLabel::CurtainClose,
                device_keyword: "커튼".to_string(),
                property: "position".to_string(),
                value: Some("closed".to_string()),
                reply: "네, {device}을(를) 닫았습니다.".to_string(),
            },
        ];
        Self {
            rules: rules.into_iter().map(|r| (r.intent, r)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_light_on() {
        let table = RuleTable::default();
        let rule = table.get(IntentLabel::LightOn).unwrap();
        assert_eq!(rule.property, "power");
        assert_eq!(rule.value.as_deref(), Some("on"));
    }

    #[test]
    fn unknown_label_falls_back_in_serde() {
        let c: Classification =
            serde_json::from_str(r#"{"intent": "MAKE_COFFEE", "device_entity": "커피머신"}"#)
                .unwrap();
        assert_eq!(c.intent, IntentLabel::Unknown);
    }

    #[test]
    fn toml_table_round_trip() {
        let table = RuleTable::from_toml_str(
            r#"
            [[rule]]
            intent = "LIGHT_ON"
            device_keyword = "조명"
            property = "power"
            value = "on"
            reply = "네, {device} 전원을 켰습니다."
            "#,
        )
        .unwrap();
        assert!(table.get(IntentLabel::LightOn).is_some());
        assert!(table.get(IntentLabel::TvOn).is_none());
    }
}
