//! Instruction and turn-input texts exchanged with the engines.

use crate::decision::{decision_schema, solution_schema, Decision};
use crate::issue::Issue;

pub const CONTINUE_PROMPT: &str =
    "Continue the investigation. Reply with a single JSON object in the required schema.";

pub const RESUME_PROMPT: &str =
    "The operator resumed this investigation. Continue from where you left off.";

/// Fed back after the operator approves an `await_user_approval` step. Such
/// decisions never name an action, so the prompt refers to the proposal.
pub const APPROVED_PROMPT: &str = "Proposed step APPROVED. Proceed.";

pub fn diagnostic_instructions(catalogue: &str) -> String {
    format!(
        r#"You are an SRE diagnostic agent. Find the root cause of the reported failure.

Every step follows a ReAct loop:
1. THOUGHT: reason about what the evidence means and what to check next.
2. ACTION: pick one tool and give its arguments as a JSON object.
3. OBSERVATION: the next message carries the tool output; analyse it.

Rules:
- Reply with exactly one JSON object matching the schema below, nothing else.
- Set next_action to "continue" with an action to run a tool.
- Set next_action to "await_user_approval" (no action) when you need the operator to confirm a step.
- Set next_action to "handoff_to_solution_agent" with root_cause once the root cause is confirmed.
- root_cause is only set when handing off.

Available tools:
{}

Schema:
{}"#,
        catalogue,
        decision_schema()
    )
}

pub fn solution_instructions() -> String {
    format!(
        r#"You are a solution architect for Kubernetes incidents. Given a confirmed root cause, provide a kubectl fix and an escalation summary.

Reply with one JSON object matching the schema below. Put the concrete commands and their rationale in remediation. Recommend escalation only when the fix needs another team or carries production risk.

Schema:
{}"#,
        solution_schema()
    )
}

pub fn initial_input(issue: &Issue) -> String {
    format!("Investigate this issue: {}", issue.describe())
}

pub fn observation(text: &str) -> String {
    format!("Observation: {}", text)
}

pub fn noop_observation(action: &str) -> String {
    format!("Observation: no-op (unknown action '{}')", action)
}

pub fn denied(hint: Option<&str>) -> String {
    format!(
        "Action DENIED. Reason/Hint: {}",
        hint.filter(|h| !h.trim().is_empty()).unwrap_or("none given")
    )
}

pub fn manual_handoff(decision: &Decision) -> String {
    format!(
        "Manual handoff requested by the operator. Conclude with your best root cause so far and set next_action to handoff_to_solution_agent. Last thought: {}",
        decision.thought
    )
}

pub fn handoff_denied(hint: Option<&str>) -> String {
    format!(
        "Handoff DENIED. Reason/Hint: {}. Keep investigating.",
        hint.filter(|h| !h.trim().is_empty()).unwrap_or("none given")
    )
}

pub fn solution_input(issue: &Issue, root_cause: &str, rationale: &str) -> String {
    format!(
        "Fix this.\nIssue: {}\nConfirmed root cause: {}\nSupporting rationale: {}",
        issue.describe(),
        root_cause,
        rationale
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::NextAction;

    fn awaiting() -> Decision {
        Decision {
            thought: "restart the deployment?".to_string(),
            action: None,
            action_input: None,
            next_action: NextAction::AwaitApproval,
            root_cause: None,
        }
    }

    #[test]
    fn test_gate_prompts() {
        assert_eq!(denied(Some("check quotas")), "Action DENIED. Reason/Hint: check quotas");
        assert_eq!(denied(Some("  ")), "Action DENIED. Reason/Hint: none given");
        assert!(manual_handoff(&awaiting()).contains("restart the deployment?"));
        assert!(handoff_denied(None).starts_with("Handoff DENIED"));
    }

    #[test]
    fn test_instructions_embed_catalogue_and_schema() {
        let text = diagnostic_instructions("- get_nodes_overview(): nodes");
        assert!(text.contains("get_nodes_overview()"));
        assert!(text.contains("await_user_approval"));
        assert!(solution_instructions().contains("escalation"));
    }
}
