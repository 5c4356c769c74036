//! Structured outputs of the reasoning stages.
//!
//! [`Decision`] is what the diagnostic engine emits once per turn;
//! [`SolutionOutcome`] is the terminal record produced by the solution stage.
//! Both are extracted from free text by [`assembler::StreamAssembler`].

pub mod assembler;

pub use assembler::{DecisionAssembler, StreamAssembler};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SchemaError;

/// Records that can be recovered from a JSON object found in engine output.
pub trait Assembled: Sized {
    fn from_json(value: Value) -> Result<Self, SchemaError>;
}

/// Control-flow request carried by a [`Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NextAction {
    #[serde(rename = "continue")]
    Continue,
    #[serde(rename = "await_user_approval", alias = "await_approval")]
    AwaitApproval,
    #[serde(rename = "handoff_to_solution_agent", alias = "handoff")]
    Handoff,
}

/// Arguments for a collector, in whichever shape the engine produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ActionInput {
    Object(Map<String, Value>),
    List(Vec<Value>),
    Text(String),
}

impl ActionInput {
    /// Decode a string that itself holds a JSON object or array.
    pub fn normalized(self) -> ActionInput {
        if let ActionInput::Text(text) = &self {
            let trimmed = text.trim();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(Value::Object(map)) => return ActionInput::Object(map),
                    Ok(Value::Array(items)) => return ActionInput::List(items),
                    _ => {}
                }
            }
        }
        self
    }
}

/// One turn's outcome as produced by the diagnostic engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Decision {
    /// Reasoning about the evidence so far and what to check next.
    #[serde(default)]
    pub thought: String,
    /// Collector to call. Only meaningful with `next_action = continue`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_input: Option<ActionInput>,
    pub next_action: NextAction,
    /// Confirmed root cause. Set exactly when handing off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

impl Decision {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.root_cause.is_some() != (self.next_action == NextAction::Handoff) {
            return Err(SchemaError::RootCauseMismatch);
        }
        if self.action.is_some() && self.next_action != NextAction::Continue {
            return Err(SchemaError::ActionWithoutContinue);
        }
        Ok(())
    }

    fn normalize(mut self) -> Self {
        self.action = non_blank(self.action);
        self.root_cause = non_blank(self.root_cause);
        self
    }
}

impl Assembled for Decision {
    fn from_json(value: Value) -> Result<Self, SchemaError> {
        let decision = serde_json::from_value::<Decision>(value)
            .map_err(|e| SchemaError::Shape(e.to_string()))?
            .normalize();
        decision.validate()?;
        Ok(decision)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Escalation advice attached to a [`SolutionOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Escalation {
    pub recommended: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub target_team: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_draft: Option<String>,
}

/// Terminal record of the solution stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SolutionOutcome {
    /// Recommended fix, typically kubectl commands and the reasoning behind them.
    pub remediation: Value,
    pub escalation: Escalation,
    pub risk_level: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

impl Assembled for SolutionOutcome {
    fn from_json(value: Value) -> Result<Self, SchemaError> {
        let outcome = serde_json::from_value::<SolutionOutcome>(value)
            .map_err(|e| SchemaError::Shape(e.to_string()))?;
        if outcome.remediation.is_null() {
            return Err(SchemaError::Shape("remediation must not be null".to_string()));
        }
        Ok(outcome)
    }
}

/// JSON schema of [`Decision`], embedded in the diagnostic instructions.
pub fn decision_schema() -> String {
    serde_json::to_string_pretty(&schemars::schema_for!(Decision)).unwrap_or_default()
}

/// JSON schema of [`SolutionOutcome`], embedded in the solution instructions.
pub fn solution_schema() -> String {
    serde_json::to_string_pretty(&schemars::schema_for!(SolutionOutcome)).unwrap_or_default()
}
