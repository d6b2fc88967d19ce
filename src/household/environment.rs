//! Mutable device/room state graph
//!
//! One canonical `Environment` exists at simulation start; every branch works
//! on its own deep copy taken via [`Environment::snapshot`]. Mutations go
//! through [`Environment::apply`], which is all-or-nothing per state change,
//! and observer-facing text comes only from properties whose `observable`
//! flag is set.

use crate::core::error::{GapError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rendered when a change list holds nothing a third party could see.
pub const NO_OBSERVABLE_CHANGE: &str = "관측 가능한 변화 없음";

/// Current value of one device property plus whether a third party could
/// perceive it by casual observation (a lamp's power is observable, a smart
/// plug's internal current draw is not).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyState {
    pub value: String,
    pub observable: bool,
}

/// A smart-home device with named properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub properties: BTreeMap<String, PropertyState>,
}

/// Room name -> devices. BTreeMap keeps serialization order stable so that
/// replays with a deterministic oracle produce byte-identical artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub rooms: BTreeMap<String, Vec<Device>>,
}

/// Record of one applied mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub device: String,
    pub property: String,
    pub before: String,
    pub after: String,
}

impl Environment {
    /// Fully independent deep copy usable as a branch's working state.
    /// All fields are owned, so a clone shares no mutable substructure.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Exact-name device lookup across all rooms.
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.rooms
            .values()
            .flat_map(|devices| devices.iter())
            .find(|d| d.name == name)
    }

    fn device_mut(&mut self, name: &str) -> Option<&mut Device> {
        self.rooms
            .values_mut()
            .flat_map(|devices| devices.iter_mut())
            .find(|d| d.name == name)
    }

    /// Resolve a possibly sloppy device reference ("침실1(안방) 메인 조명")
    /// to a canonical device name: exact match first, then whitespace- and
    /// punctuation-insensitive substring matching in either direction.
    pub fn resolve_device_name(&self, raw: &str) -> Option<String> {
        if self.device(raw).is_some() {
            return Some(raw.to_string());
        }
        let target = normalize(raw);
        if target.is_empty() {
            return None;
        }
        self.rooms
            .values()
            .flat_map(|devices| devices.iter())
            .find(|d| {
                let name = normalize(&d.name);
                name.contains(&target) || target.contains(&name)
            })
            .map(|d| d.name.clone())
    }

    /// Mutate one property and return the applied change. Unknown device or
    /// property leaves the environment untouched and reports a
    /// state-consistency violation.
    pub fn apply(&mut self, device: &str, property: &str, new_value: &str) -> Result<StateChange> {
        let unknown = || GapError::UnknownProperty {
            device: device.to_string(),
            property: property.to_string(),
        };
        let found = self.device_mut(device).ok_or_else(unknown)?;
        let state = found.properties.get_mut(property).ok_or_else(unknown)?;
        let before = std::mem::replace(&mut state.value, new_value.to_string());
        Ok(StateChange {
            device: device.to_string(),
            property: property.to_string(),
            before,
            after: new_value.to_string(),
        })
    }

    /// Whether a third party could see the given property. Unknown
    /// device/property counts as not observable.
    pub fn is_observable(&self, device: &str, property: &str) -> bool {
        self.device(device)
            .and_then(|d| d.properties.get(property))
            .map(|p| p.observable)
            .unwrap_or(false)
    }

    /// Natural-language sentences for the observable subset of `changes`.
    /// Non-observable before/after values never appear in the output.
    pub fn describe_observable_changes(&self, changes: &[StateChange]) -> Vec<String> {
        changes
            .iter()
            .filter(|c| self.is_observable(&c.device, &c.property))
            .map(describe_change)
            .collect()
    }

    /// Observer-facing summary line, "관측 가능한 변화 없음" when empty.
    pub fn observable_change_text(&self, changes: &[StateChange]) -> String {
        let sentences = self.describe_observable_changes(changes);
        if sentences.is_empty() {
            NO_OBSERVABLE_CHANGE.to_string()
        } else {
            sentences.join("; ")
        }
    }

    /// Room/device/property listing for prompt allow-lists.
    pub fn device_allowlist(&self) -> String {
        let mut lines = Vec::new();
        for (room, devices) in &self.rooms {
            lines.push(format!("- {room}"));
            for device in devices {
                let props: Vec<&str> = device.properties.keys().map(String::as_str).collect();
                lines.push(format!("  - {} [{}]", device.name, props.join(", ")));
            }
        }
        lines.join("\n")
    }
}

fn describe_change(change: &StateChange) -> String {
    let device = &change.device;
    match change.property.as_str() {
        "power" if change.after == "on" => {
            format!("{device}{} 켜졌다", subject_particle(device))
        }
        "power" if change.after == "off" => {
            format!("{device}{} 꺼졌다", subject_particle(device))
        }
        "temperature" => format!("{device}의 온도가 {}로 바뀌었다", change.after),
        "brightness" => format!("{device}의 밝기가 {}로 바뀌었다", change.after),
        "volume" => format!("{device}의 볼륨이 {}로 바뀌었다", change.after),
        other => format!("{device}의 {other}이(가) {}로 바뀌었다", change.after),
    }
}

/// Subject particle (이/가) for a Korean noun, chosen by whether the final
/// syllable carries a batchim.
fn subject_particle(word: &str) -> &'static str {
    match word.chars().next_back() {
        Some(c) if ('가'..='힣').contains(&c) => {
            if (c as u32 - 0xAC00) % 28 != 0 {
                "이"
            } else {
                "가"
            }
        }
        _ => "이",
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '/' | '(' | ')'))
        .collect()
}
