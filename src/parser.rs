//! Turns raw model text into a [`Decision`].
//!
//! Parsing runs in two independent steps: [`extract_payload`] strips an
//! optional fenced code block, then [`parse_payload`] reads the JSON object
//! and dispatches on its `type` field.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Structured intent extracted from one model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Plan { description: String },
    Action { tool: String, input: Value },
    Output { result: Value },
}

/// Recoverable reply errors; the loop reports them back to the model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Could not parse your JSON response `{candidate}`: {reason}")]
    Malformed { candidate: String, reason: String },

    #[error("`{kind}` response is missing the `{field}` field")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("unexpected type `{found}`. Expected 'action', 'plan', or 'output'")]
    UnexpectedType { found: String },
}

fn fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence pattern is valid")
    })
}

/// Returns the body of the first fenced block, or `raw` untouched.
pub fn extract_payload(raw: &str) -> &str {
    fence()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
}

/// A reply that is already valid JSON is used as is, so fences inside its
/// string values survive. Anything else goes through [`extract_payload`].
pub fn parse_decision(raw: &str) -> Result<Decision, ParseError> {
    let trimmed = raw.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => classify(value, trimmed),
        Err(_) => parse_payload(extract_payload(raw)),
    }
}

pub fn parse_payload(candidate: &str) -> Result<Decision, ParseError> {
    let value: Value = serde_json::from_str(candidate).map_err(|err| ParseError::Malformed {
        candidate: candidate.to_string(),
        reason: err.to_string(),
    })?;
    classify(value, candidate)
}

fn classify(value: Value, candidate: &str) -> Result<Decision, ParseError> {
    let Value::Object(object) = value else {
        return Err(ParseError::Malformed {
            candidate: candidate.to_string(),
            reason: "expected a JSON object".into(),
        });
    };

    match object.get("type") {
        Some(Value::String(kind)) if kind == "plan" => Ok(Decision::Plan {
            description: plan_text(&object),
        }),
        Some(Value::String(kind)) if kind == "action" => {
            let tool = object
                .get("function")
                .and_then(Value::as_str)
                .ok_or(ParseError::MissingField {
                    kind: "action",
                    field: "function",
                })?;
            let input = object.get("input").cloned().ok_or(ParseError::MissingField {
                kind: "action",
                field: "input",
            })?;
            Ok(Decision::Action {
                tool: tool.to_string(),
                input,
            })
        }
        Some(Value::String(kind)) if kind == "output" => {
            let result = object.get("output").cloned().ok_or(ParseError::MissingField {
                kind: "output",
                field: "output",
            })?;
            Ok(Decision::Output { result })
        }
        Some(Value::String(other)) => Err(ParseError::UnexpectedType {
            found: other.clone(),
        }),
        Some(other) => Err(ParseError::UnexpectedType {
            found: other.to_string(),
        }),
        None => Err(ParseError::UnexpectedType {
            found: "null".into(),
        }),
    }
}

fn plan_text(object: &Map<String, Value>) -> String {
    match object.get("plan").or_else(|| object.get("description")) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
