//! External generation oracle
//!
//! Everything natural-language in the simulation (quarter narratives,
//! commands, assistant replies, ratings) comes from an [`Oracle`]. The engine
//! only sequences and validates; it never invents content. Structured output
//! is parsed and schema-checked at this boundary, so downstream code works
//! with typed records, never ad hoc JSON field access.

pub mod http;
pub mod retry;
pub mod scripted;

pub use http::HttpOracle;
pub use retry::RetryPolicy;
pub use scripted::ScriptedOracle;

use crate::core::config::ModelTable;
use crate::core::error::{GapError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Where in the pipeline an oracle call originates. Each site can be routed
/// to a different model via [`ModelTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    /// Split one schedule hour into quarter descriptors.
    QuarterNarrative,
    /// Derive the person's voice command from a context slice.
    Command,
    /// Free-form assistant interpretation (generative policy).
    GenerativeReply,
    /// Intent classification (rule-based policy).
    IntentClassify,
    /// First-person satisfaction rating.
    SelfEval,
    /// Third-person satisfaction rating.
    ObserverEval,
}

impl CallSite {
    pub fn model<'a>(&self, table: &'a ModelTable) -> &'a str {
        match self {
            CallSite::QuarterNarrative => &table.narrative,
            CallSite::Command => &table.command,
            CallSite::GenerativeReply => &table.generative_reply,
            CallSite::IntentClassify => &table.classifier,
            CallSite::SelfEval => &table.self_eval,
            CallSite::ObserverEval => &table.observer_eval,
        }
    }
}

/// Black-box text/classification oracle
#[async_trait]
pub trait Oracle: Send + Sync {
    /// One completion. `system` frames the role, `user` carries the task.
    async fn complete(&self, site: CallSite, system: &str, user: &str) -> Result<String>;
}

/// Extract the JSON object from an oracle response (tolerates surrounding
/// prose or markdown fences).
pub fn extract_json(response: &str) -> Result<&str> {
    let start = response
        .find('{')
        .ok_or_else(|| GapError::Schema("no JSON object in response".into()))?;
    let end = response
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| GapError::Schema("no closing brace in response".into()))?;
    Ok(&response[start..=end])
}

/// Call the oracle and parse its output into `T`, retrying malformed or
/// failed calls within the policy's budget. Prompting for structured output
/// is best-effort, so a shape mismatch is retried exactly like a transport
/// failure.
pub async fn generate_json<T: DeserializeOwned>(
    oracle: &dyn Oracle,
    site: CallSite,
    system: &str,
    user: &str,
    retry: &RetryPolicy,
) -> Result<T> {
    generate_json_validated(oracle, site, system, user, retry, |_| Ok(())).await
}

/// Like [`generate_json`], with a semantic validation step that also counts
/// against the retry budget (e.g. "exactly N quarters, three sentences").
pub async fn generate_json_validated<T, V>(
    oracle: &dyn Oracle,
    site: CallSite,
    system: &str,
    user: &str,
    retry: &RetryPolicy,
    validate: V,
) -> Result<T>
where
    T: DeserializeOwned,
    V: Fn(&T) -> Result<()>,
{
    retry
        .run(|| async {
            let response = oracle.complete(site, system, user).await?;
            let json = extract_json(&response)?;
            let value: T = serde_json::from_str(json)
                .map_err(|e| GapError::Schema(format!("{e} in {:?} response", site)))?;
            validate(&value)?;
            Ok(value)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Deserialize)]
    struct Out {
        command: String,
    }

    struct FlakyOracle {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Oracle for FlakyOracle {
        async fn complete(&self, _: CallSite, _: &str, _: &str) -> Result<String> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(GapError::Oracle("connection reset".into())),
                1 => Ok("definitely not json".into()),
                _ => Ok("물론이죠! {\"command\": \"불 켜줘\"} 입니다.".into()),
            }
        }
    }

    #[test]
    fn extract_json_tolerates_prose() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw).unwrap(), "{\"a\": 1}");
        assert!(extract_json("no braces here").is_err());
    }

    #[tokio::test]
    async fn retries_through_transport_and_schema_failures() {
        let oracle = FlakyOracle {
            calls: AtomicUsize::new(0),
        };
        let retry = RetryPolicy::new(3, Duration::from_millis(1));
        let out: Out = generate_json(&oracle, CallSite::Command, "sys", "user", &retry)
            .await
            .unwrap();
        assert_eq!(out.command, "불 켜줘");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_reports_last_error() {
        let oracle = FlakyOracle {
            calls: AtomicUsize::new(0),
        };
        let retry = RetryPolicy::new(2, Duration::from_millis(1));
        let result: Result<Out> =
            generate_json(&oracle, CallSite::Command, "sys", "user", &retry).await;
        assert!(matches!(result, Err(GapError::Schema(_))));
    }
}
