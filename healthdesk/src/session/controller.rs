//! Turn controller: the ReAct loop of one diagnostic session.
//!
//! ```text
//! STARTING -> STREAMING -> DISPATCH_TOOL          -> STREAMING
//!                       -> AWAIT_APPROVAL         -> STREAMING | stop
//!                       -> AWAIT_HANDOFF_APPROVAL -> STREAMING | DONE
//! ```
//!
//! Turns are strictly sequential. The last valid decision of a turn governs
//! what happens next; a turn without one is retried with a generic prompt.

use futures::StreamExt;
use tracing::{debug, info, warn};

use super::gate::{ApprovalOutcome, HandoffOutcome, InterventionGate};
use super::handoff::HandoffStage;
use super::protocol::{OutboundEvent, SessionIo, SessionStatus};
use super::registry::SessionLease;
use super::SessionServices;
use crate::decision::{ActionInput, Decision, DecisionAssembler, NextAction};
use crate::engine::prompts;
use crate::error::{EngineError, SessionError, SessionResult};
use crate::issue::Issue;
use crate::threads::{Role, ThreadRef};
use crate::tools::ToolArgs;

/// Each turn records the input and the reply.
const MESSAGES_PER_TURN: usize = 2;

#[derive(Debug)]
enum TurnState {
    Streaming(String),
    DispatchTool {
        action: String,
        input: Option<ActionInput>,
    },
    AwaitApproval(Decision),
    AwaitHandoffApproval(Decision),
    Done,
}

fn route(decision: Decision) -> TurnState {
    match decision.next_action {
        NextAction::Continue => match decision.action {
            Some(action) => TurnState::DispatchTool {
                action,
                input: decision.action_input,
            },
            None => TurnState::Streaming(prompts::CONTINUE_PROMPT.to_string()),
        },
        NextAction::AwaitApproval => TurnState::AwaitApproval(decision),
        NextAction::Handoff => TurnState::AwaitHandoffApproval(decision),
    }
}

pub struct TurnController<'a> {
    services: &'a SessionServices,
    io: &'a mut SessionIo,
    lease: &'a mut SessionLease,
    issue: Issue,
    thread: ThreadRef,
    steps: u32,
}

impl<'a> TurnController<'a> {
    pub fn new(
        services: &'a SessionServices,
        io: &'a mut SessionIo,
        lease: &'a mut SessionLease,
        issue: Issue,
        thread: ThreadRef,
    ) -> Self {
        Self {
            services,
            io,
            lease,
            issue,
            thread,
            steps: 0,
        }
    }

    /// Open a new investigation from the issue description.
    pub async fn start(self) -> SessionResult<SessionStatus> {
        let input = prompts::initial_input(&self.issue);
        self.run(input).await
    }

    /// Continue an investigation on its existing thread.
    pub async fn resume(self) -> SessionResult<SessionStatus> {
        self.run(prompts::RESUME_PROMPT.to_string()).await
    }

    async fn run(mut self, input: String) -> SessionResult<SessionStatus> {
        let mut state = TurnState::Streaming(input);
        loop {
            state = match state {
                TurnState::Streaming(input) => {
                    if let Some(bound) = self.bound_reached().await? {
                        info!(issue_key = %self.issue.key(), steps = self.steps, bound, "turn bound reached");
                        return Ok(SessionStatus::InProgress);
                    }
                    self.steps += 1;
                    match self.stream_turn(&input).await? {
                        Some(decision) => route(decision),
                        None => {
                            debug!(step = self.steps, "no valid decision this turn");
                            TurnState::Streaming(prompts::CONTINUE_PROMPT.to_string())
                        }
                    }
                }
                TurnState::DispatchTool { action, input } => {
                    TurnState::Streaming(self.dispatch(&action, input).await)
                }
                TurnState::AwaitApproval(decision) => {
                    let outcome = InterventionGate::new(self.io)
                        .request_approval(self.steps, &decision)
                        .await?;
                    match outcome {
                        ApprovalOutcome::Continue(input) => TurnState::Streaming(input),
                        ApprovalOutcome::Declined => {
                            info!(issue_key = %self.issue.key(), "operator declined to continue");
                            return Ok(SessionStatus::InProgress);
                        }
                    }
                }
                TurnState::AwaitHandoffApproval(decision) => {
                    let root_cause = decision.root_cause.clone().unwrap_or_default();
                    let outcome = InterventionGate::new(self.io)
                        .request_handoff(self.steps, &decision, &root_cause)
                        .await?;
                    match outcome {
                        HandoffOutcome::Denied(input) => TurnState::Streaming(input),
                        HandoffOutcome::Approved => {
                            self.hand_off(&root_cause, &decision.thought).await?;
                            TurnState::Done
                        }
                    }
                }
                TurnState::Done => return Ok(SessionStatus::Handoff),
            };
        }
    }

    async fn bound_reached(&self) -> SessionResult<Option<&'static str>> {
        let limits = &self.services.limits;
        if self.steps >= limits.max_steps {
            return Ok(Some("max_steps"));
        }
        let history = self.services.threads.len(&self.thread).await?;
        if history + MESSAGES_PER_TURN > limits.max_history {
            return Ok(Some("max_history"));
        }
        Ok(None)
    }

    /// One STREAMING turn. Returns the last valid decision, if any.
    async fn stream_turn(&mut self, input: &str) -> SessionResult<Option<Decision>> {
        let step = self.steps;
        let timeout = self.services.limits.engine_timeout();
        let engine = &self.services.diagnostic_engine;
        let thread = &self.thread;
        let io = &*self.io;

        let turn = async {
            let mut fragments = engine.submit_streaming(thread, input).await?;
            let mut assembler = DecisionAssembler::new();
            let mut transcript = String::new();
            let mut last = None;
            let mut open = true;
            while open {
                let ready = match fragments.next().await {
                    Some(fragment) => {
                        let fragment = fragment?;
                        transcript.push_str(&fragment);
                        assembler.push(&fragment)
                    }
                    None => {
                        open = false;
                        assembler.finish()
                    }
                };
                for decision in ready {
                    io.emit(OutboundEvent::Diagnostic {
                        step,
                        decision: decision.clone(),
                    })
                    .await?;
                    last = Some(decision);
                }
            }
            Ok::<_, SessionError>((transcript, last))
        };

        let (transcript, last) = tokio::select! {
            result = tokio::time::timeout(timeout, turn) => match result {
                Ok(outcome) => outcome?,
                Err(_) => return Err(EngineError::Timeout(timeout.as_secs()).into()),
            },
            _ = io.closed() => return Err(SessionError::Disconnected),
        };

        let threads = &self.services.threads;
        threads.append(&self.thread, Role::User, input).await?;
        threads.append(&self.thread, Role::Assistant, &transcript).await?;
        if let Some(record) = self.lease.record_mut() {
            record.turns += 1;
            record.touch();
        }
        info!(
            issue_key = %self.issue.key(),
            step,
            next_action = ?last.as_ref().map(|d: &Decision| d.next_action),
            "turn complete"
        );
        Ok(last)
    }

    async fn dispatch(&self, action: &str, input: Option<ActionInput>) -> String {
        let mut fallback = ToolArgs::new();
        if let Some(namespace) = self.issue.namespace() {
            fallback = fallback.with("namespace", namespace);
        }
        match self.services.tools.dispatch(action, input, &fallback).await {
            Some(text) => {
                debug!(step = self.steps, action, bytes = text.len(), "collector answered");
                prompts::observation(&text)
            }
            None => {
                warn!(step = self.steps, action, "unknown action, continuing with no-op");
                prompts::noop_observation(action)
            }
        }
    }

    async fn hand_off(&mut self, root_cause: &str, rationale: &str) -> SessionResult<()> {
        let report = HandoffStage::new(self.services)
            .run(self.lease, &self.issue, root_cause, rationale)
            .await?;
        self.io
            .emit(OutboundEvent::Handoff {
                solution_thread: report.solution_thread,
                root_cause: report.root_cause,
                outcome: report.outcome,
                raw: report.raw,
                parse_error: report.parse_error,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decision(value: serde_json::Value) -> Decision {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_route_follows_next_action() {
        let state = route(decision(json!({
            "thought": "look at events",
            "action": "get_pod_events",
            "action_input": "web-0",
            "next_action": "continue"
        })));
        assert!(matches!(
            state,
            TurnState::DispatchTool { ref action, input: Some(ActionInput::Text(_)) } if action == "get_pod_events"
        ));

        let state = route(decision(json!({"thought": "hmm", "next_action": "continue"})));
        assert!(matches!(state, TurnState::Streaming(ref p) if p == prompts::CONTINUE_PROMPT));

        let state = route(decision(json!({"thought": "restart?", "next_action": "await_approval"})));
        assert!(matches!(state, TurnState::AwaitApproval(_)));

        let state = route(decision(json!({
            "thought": "done",
            "next_action": "handoff",
            "root_cause": "bad tag"
        })));
        assert!(matches!(state, TurnState::AwaitHandoffApproval(_)));
    }
}
