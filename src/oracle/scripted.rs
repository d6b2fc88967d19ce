//! Deterministic scripted oracle
//!
//! Keyword-driven canned responses for offline runs and replay tests. Output
//! is a pure function of (seed, call-site, prompt): choices are drawn from a
//! ChaCha stream keyed by a stable hash of the prompt, never from mutable
//! state, so concurrent cells cannot perturb each other and two runs with
//! the same seed produce byte-identical artifacts.

use crate::core::error::Result;
use crate::oracle::{CallSite, Oracle};
use ahash::RandomState;
use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;

pub struct ScriptedOracle {
    seed: u64,
    hasher: RandomState,
}

const COMMANDS_WITH_INTENT: [&str; 4] = [
    "거실 조명 켜줘",
    "불 켜줘",
    "에어컨 온도 좀 낮춰줘",
    "TV 켜줘",
];

const COMMANDS_WITHOUT_INTENT: [&str; 4] =
    ["불 켜줘", "조명 꺼줘", "TV 켜줘", "오늘 날씨 알려줘"];

const HIDDEN_INTENTS: [&str; 3] = [
    "방이 어두워서 답답한데 손이 바빠 직접 스위치를 누르기 어렵다.",
    "집중이 안 돼서 주변 환경을 빨리 정돈하고 싶다.",
    "피곤해서 움직이지 않고 기기를 조작하고 싶다.",
];

const SELF_REASONS: [&str; 3] = [
    "원하던 대로 기기가 바로 조작되어 만족스러웠다.",
    "응답은 공손했지만 의도를 완전히 맞추지는 못했다.",
    "요청한 것보다 더 자연스럽게 처리해 주었다.",
];

const OBSERVER_REASONS: [&str; 3] = [
    "명령과 기기 반응이 맞아떨어져 무난해 보였다.",
    "겉으로 보기에 큰 변화가 없어 효과를 판단하기 어려웠다.",
    "대화가 짧고 기기 반응도 즉각적이어서 원활해 보였다.",
];

impl ScriptedOracle {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            hasher: RandomState::with_seeds(
                seed,
                seed ^ 0x9e3779b97f4a7c15,
                seed.rotate_left(17),
                seed.wrapping_mul(0x2545f4914f6cdd1d),
            ),
        }
    }

    /// RNG derived from (seed, prompt), so output is a pure function of the
    /// inputs and concurrent callers cannot perturb each other.
    fn rng_for(&self, prompt: &str) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed ^ self.hasher.hash_one(prompt))
    }

    fn pick<'a>(&self, pool: &[&'a str], prompt: &str) -> &'a str {
        pool[self.rng_for(prompt).gen_range(0..pool.len())]
    }

    fn quarter_narrative(&self, prompt: &str) -> String {
        let activity = quoted_after(prompt, "시간대 활동:").unwrap_or("일상 활동");
        let count = digits_after(prompt, "구간 수:").unwrap_or(4);
        let quarters: Vec<_> = (1..=count)
            .map(|i| {
                let hidden = self.pick(&HIDDEN_INTENTS, &format!("{prompt}#{i}"));
                json!({
                    "quarter_activity": format!("{activity} ({i}/{count} 구간)"),
                    "visible_action": format!("{activity} 중이다."),
                    "hidden_intent": hidden,
                    "concrete_action": format!(
                        "{activity}을(를) 이어간다. 주변 기기 상태를 한 번 살핀다. 필요한 물건을 손 닿는 곳으로 옮긴다."
                    ),
                })
            })
            .collect();
        json!({ "quarters": quarters }).to_string()
    }

    fn command(&self, prompt: &str) -> String {
        let pool = if prompt.contains("속마음") {
            COMMANDS_WITH_INTENT
        } else {
            COMMANDS_WITHOUT_INTENT
        };
        json!({ "command": self.pick(&pool, prompt) }).to_string()
    }

    fn generative_reply(&self, prompt: &str) -> String {
        let command = quoted_after(prompt, "[사용자 명령]").unwrap_or("");
        let off = command.contains('꺼');
        let target = allowlist_devices(prompt)
            .into_iter()
            .find(|(_, props)| props.contains(&"power".to_string()));
        match target {
            Some((device, _)) => {
                let after = if off { "off" } else { "on" };
                let verb = if off { "껐습니다" } else { "켰습니다" };
                json!({
                    "response_text": format!("네, {device} 전원을 {verb}."),
                    "changes": [{ "device": device, "property": "power", "after": after }],
                    "state_change_description": format!("{device} 전원이 {after} 상태가 되었다."),
                })
                .to_string()
            }
            None => json!({
                "response_text": "죄송합니다. 해당 명령을 수행할 수 있는 기기를 찾지 못했어요.",
                "changes": [],
                "state_change_description": "",
            })
            .to_string(),
        }
    }

    fn classify(&self, prompt: &str) -> String {
        let command = quoted_after(prompt, "[사용자 명령]").unwrap_or("");
        let (intent, entity, value) = if command.contains("온도") {
            ("SET_TEMPERATURE", "에어컨", "22도")
        } else if (command.contains("불") || command.contains("조명")) && command.contains('켜') {
            ("LIGHT_ON", "조명", "")
        } else if (command.contains("불") || command.contains("조명")) && command.contains('꺼') {
            ("LIGHT_OFF", "조명", "")
        } else if command.contains("TV") && command.contains('켜') {
            ("TV_ON", "TV", "")
        } else if command.contains("TV") && command.contains('꺼') {
            ("TV_OFF", "TV", "")
        } else {
            ("UNKNOWN", "", "")
        };
        json!({ "intent": intent, "device_entity": entity, "target_value": value }).to_string()
    }

    fn rate(&self, prompt: &str, base: u8, reasons: &[&str]) -> String {
        let score = base + self.rng_for(prompt).gen_range(0..3u8);
        json!({ "score": score, "reason": self.pick(reasons, prompt) }).to_string()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, site: CallSite, _system: &str, user: &str) -> Result<String> {
        Ok(match site {
            CallSite::QuarterNarrative => self.quarter_narrative(user),
            CallSite::Command => self.command(user),
            CallSite::GenerativeReply => self.generative_reply(user),
            CallSite::IntentClassify => self.classify(user),
            CallSite::SelfEval => self.rate(user, 4, &SELF_REASONS),
            CallSite::ObserverEval => self.rate(user, 3, &OBSERVER_REASONS),
        })
    }
}

/// First double-quoted string after `marker`.
fn quoted_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let rest = &text[text.find(marker)? + marker.len()..];
    let open = rest.find('"')?;
    let rest = &rest[open + 1..];
    let close = rest.find('"')?;
    Some(&rest[..close])
}

/// First integer after `marker`.
fn digits_after(text: &str, marker: &str) -> Option<usize> {
    let rest = text[text.find(marker)? + marker.len()..].trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Parse "  - <device> [prop, prop]" allow-list lines out of a prompt.
fn allowlist_devices(prompt: &str) -> Vec<(String, Vec<String>)> {
    prompt
        .lines()
        .filter_map(|line| {
            let line = line.strip_prefix("  - ")?;
            let (name, props) = line.split_once('[')?;
            let props = props
                .trim_end_matches(']')
                .split(',')
                .map(|p| p.trim().to_string())
                .collect();
            Some((name.trim().to_string(), props))
        })
        .collect()
}
