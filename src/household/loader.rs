//! Household artifact loader
//!
//! The canonical environment and person roster are generated elsewhere and
//! consumed here as read-only JSON artifacts.

use crate::core::error::{GapError, Result};
use crate::household::environment::Environment;
use crate::household::person::Person;
use std::path::Path;

/// Canonical environment at t=0.
pub fn load_environment(path: &Path) -> Result<Environment> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| GapError::Artifact(format!("environment {}: {e}", path.display())))?;
    let env: Environment = serde_json::from_str(&text)?;
    if env.rooms.is_empty() {
        return Err(GapError::Artifact(format!(
            "environment {} has no rooms",
            path.display()
        )));
    }
    Ok(env)
}

/// Person roster from a directory of `avatar_*.json` profiles, sorted by
/// file name so run ordering is stable.
pub fn load_persons(dir: &Path) -> Result<Vec<Person>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .map_err(|e| GapError::Artifact(format!("persons dir {}: {e}", dir.display())))?
    {
        let path = entry?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with("avatar_") && name.ends_with(".json") {
            paths.push(path);
        }
    }
    paths.sort();
    if paths.is_empty() {
        return Err(GapError::Artifact(format!(
            "no avatar_*.json profiles under {}",
            dir.display()
        )));
    }

    let mut persons = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        let person: Person = serde_json::from_str(&text)
            .map_err(|e| GapError::Artifact(format!("profile {}: {e}", path.display())))?;
        if person.schedule.is_empty() {
            return Err(GapError::Artifact(format!(
                "profile {} has an empty schedule",
                path.display()
            )));
        }
        persons.push(person);
    }
    Ok(persons)
}
