//! Pull a JSON object out of model output
//!
//! Models wrap JSON in prose or markdown fences often enough that a plain
//! `serde_json::from_str` is not sufficient. Decoding tries, in order: the
//! trimmed text, the body of a fenced block, and the outermost `{...}` span.

use counsel_core::{CounselError, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"))
}

fn outer_object() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"))
}

/// Decode the first JSON object in `text` as `T`
///
/// Fails with [`CounselError::ProtocolViolation`] when no candidate decodes.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let trimmed = text.trim();
    let mut last_error = None;

    let candidates = std::iter::once(trimmed)
        .chain(
            fenced_block()
                .captures(trimmed)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str()),
        )
        .chain(outer_object().find(trimmed).map(|m| m.as_str()));

    for candidate in candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    Err(CounselError::ProtocolViolation(match last_error {
        Some(e) => format!("model output is not the expected JSON: {}", e),
        None => "model output contains no JSON object".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Routing {
        goal: String,
        #[serde(default)]
        agents: Vec<String>,
    }

    #[test]
    fn test_plain_json() {
        let routing: Routing = extract_json(r#"{"goal": "add_minor", "agents": ["a"]}"#).unwrap();
        assert_eq!(routing.goal, "add_minor");
    }

    #[test]
    fn test_fenced_json() {
        let text = "Here is the plan:\n```json\n{\"goal\": \"plan\"}\n```\nDone.";
        let routing: Routing = extract_json(text).unwrap();
        assert_eq!(routing, Routing { goal: "plan".to_string(), agents: vec![] });
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let text = "Sure! {\"goal\": \"check\", \"agents\": [\"policy_compliance\"]} Hope that helps.";
        let routing: Routing = extract_json(text).unwrap();
        assert_eq!(routing.agents, vec!["policy_compliance".to_string()]);
    }

    #[test]
    fn test_no_json_is_protocol_violation() {
        let result: Result<Routing> = extract_json("I cannot answer that.");
        assert!(matches!(result, Err(CounselError::ProtocolViolation(_))));
    }

    #[test]
    fn test_wrong_shape_is_protocol_violation() {
        let result: Result<Routing> = extract_json(r#"{"agents": 3}"#);
        assert!(matches!(result, Err(CounselError::ProtocolViolation(_))));
    }
}
