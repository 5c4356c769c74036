//! Intervention gate: suspends the turn loop until the operator answers.

use tracing::{info, warn};

use super::protocol::{InboundMessage, OutboundEvent, SessionIo};
use crate::decision::Decision;
use crate::engine::prompts;
use crate::error::{SessionError, SessionResult};

/// Operator answers understood at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionKind {
    Approve,
    Deny,
    HandoffNow,
}

impl InterventionKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(InterventionKind::Approve),
            "deny" => Some(InterventionKind::Deny),
            "handoff-now" | "handoff_now" => Some(InterventionKind::HandoffNow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intervention {
    pub decision: String,
    pub hint: Option<String>,
}

impl Intervention {
    pub fn kind(&self) -> Option<InterventionKind> {
        InterventionKind::parse(&self.decision)
    }
}

/// Result of an `AWAIT_APPROVAL` checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    /// Stream again with this input.
    Continue(String),
    /// The operator stopped the investigation.
    Declined,
}

/// Result of an `AWAIT_HANDOFF_APPROVAL` checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffOutcome {
    Approved,
    /// Stream again with this input.
    Denied(String),
}

pub struct InterventionGate<'a> {
    io: &'a mut SessionIo,
}

impl<'a> InterventionGate<'a> {
    pub fn new(io: &'a mut SessionIo) -> Self {
        Self { io }
    }

    /// `AWAIT_APPROVAL` checkpoint. Unrecognised answers decline.
    pub async fn request_approval(
        &mut self,
        step: u32,
        decision: &Decision,
    ) -> SessionResult<ApprovalOutcome> {
        self.io.reject_unsolicited()?;
        self.io
            .emit(OutboundEvent::AwaitingApproval {
                step,
                thought: decision.thought.clone(),
            })
            .await?;
        let answer = self.await_intervention().await?;
        info!(step, decision = %answer.decision, "approval checkpoint answered");
        Ok(match answer.kind() {
            Some(InterventionKind::Approve) => {
                ApprovalOutcome::Continue(prompts::APPROVED_PROMPT.to_string())
            }
            Some(InterventionKind::Deny) => {
                ApprovalOutcome::Continue(prompts::denied(answer.hint.as_deref()))
            }
            Some(InterventionKind::HandoffNow) => {
                ApprovalOutcome::Continue(prompts::manual_handoff(decision))
            }
            None => ApprovalOutcome::Declined,
        })
    }

    /// `AWAIT_HANDOFF_APPROVAL` checkpoint. Only approve and deny are valid.
    pub async fn request_handoff(
        &mut self,
        step: u32,
        decision: &Decision,
        root_cause: &str,
    ) -> SessionResult<HandoffOutcome> {
        self.io.reject_unsolicited()?;
        self.io
            .emit(OutboundEvent::HandoffApproval {
                step,
                thought: decision.thought.clone(),
                root_cause: root_cause.to_string(),
            })
            .await?;
        let answer = self.await_intervention().await?;
        info!(step, decision = %answer.decision, "handoff checkpoint answered");
        match answer.kind() {
            Some(InterventionKind::Approve) => Ok(HandoffOutcome::Approved),
            Some(InterventionKind::Deny) => Ok(HandoffOutcome::Denied(prompts::handoff_denied(
                answer.hint.as_deref(),
            ))),
            _ => {
                warn!(step, decision = %answer.decision, "invalid answer at handoff checkpoint");
                Err(SessionError::ProtocolViolation(format!(
                    "'{}' is not a valid answer at the handoff checkpoint (expected approve or deny)",
                    answer.decision
                )))
            }
        }
    }

    async fn await_intervention(&mut self) -> SessionResult<Intervention> {
        match self.io.receive().await? {
            InboundMessage::Intervene {
                decision: Some(decision),
                hint,
            } => Ok(Intervention { decision, hint }),
            InboundMessage::Intervene { decision: None, .. } => Err(
                SessionError::ProtocolViolation("intervene message without a decision".to_string()),
            ),
            other => Err(SessionError::ProtocolViolation(format!(
                "expected intervene, got {}",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::NextAction;
    use crate::session::protocol::SessionPeer;
    use serde_json::json;
    use tokio::task::JoinHandle;

    fn decision(next: NextAction, root_cause: Option<&str>) -> Decision {
        Decision {
            thought: "heap is too small".to_string(),
            action: None,
            action_input: None,
            next_action: next,
            root_cause: root_cause.map(str::to_string),
        }
    }

    /// Answer the first checkpoint the gate raises with `frame`.
    fn answer(mut peer: SessionPeer, frame: String) -> JoinHandle<Option<OutboundEvent>> {
        tokio::spawn(async move {
            let request = peer.next_event().await;
            peer.send_raw(frame).await;
            request
        })
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!(InterventionKind::parse(" Approve "), Some(InterventionKind::Approve));
        assert_eq!(InterventionKind::parse("handoff_now"), Some(InterventionKind::HandoffNow));
        assert_eq!(InterventionKind::parse("bogus"), None);
    }

    #[tokio::test]
    async fn test_deny_with_hint_continues() {
        let (mut io, peer) = SessionIo::pair(4);
        let operator = answer(
            peer,
            json!({"type": "intervene", "decision": "deny", "hint": "look at quotas"}).to_string(),
        );
        let outcome = InterventionGate::new(&mut io)
            .request_approval(3, &decision(NextAction::AwaitApproval, None))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ApprovalOutcome::Continue("Action DENIED. Reason/Hint: look at quotas".to_string())
        );
        assert!(matches!(
            operator.await.unwrap(),
            Some(OutboundEvent::AwaitingApproval { step: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_approve_feeds_proceed_prompt() {
        let (mut io, peer) = SessionIo::pair(4);
        let _operator = answer(peer, r#"{"type":"intervene","decision":"approve"}"#.to_string());
        let outcome = InterventionGate::new(&mut io)
            .request_approval(2, &decision(NextAction::AwaitApproval, None))
            .await
            .unwrap();
        assert_eq!(outcome, ApprovalOutcome::Continue(prompts::APPROVED_PROMPT.to_string()));
    }

    #[tokio::test]
    async fn test_unrecognised_answer_declines_at_approval() {
        let (mut io, peer) = SessionIo::pair(4);
        let _operator = answer(peer, r#"{"type":"intervene","decision":"exit"}"#.to_string());
        let outcome = InterventionGate::new(&mut io)
            .request_approval(1, &decision(NextAction::AwaitApproval, None))
            .await
            .unwrap();
        assert_eq!(outcome, ApprovalOutcome::Declined);
    }

    #[tokio::test]
    async fn test_handoff_checkpoint_rejects_other_answers() {
        for frame in [
            r#"{"type":"intervene","decision":"bogus"}"#,
            r#"{"type":"intervene","decision":"handoff-now"}"#,
            r#"{"type":"intervene"}"#,
            r#"{"type":"resume","decision":"yes"}"#,
            r#"garbage"#,
        ] {
            let (mut io, peer) = SessionIo::pair(4);
            let _operator = answer(peer, frame.to_string());
            let result = InterventionGate::new(&mut io)
                .request_handoff(5, &decision(NextAction::Handoff, Some("OOM")), "OOM")
                .await;
            assert!(
                matches!(result, Err(SessionError::ProtocolViolation(_))),
                "frame {} was accepted",
                frame
            );
        }
    }

    #[tokio::test]
    async fn test_handoff_deny_returns_to_streaming() {
        let (mut io, peer) = SessionIo::pair(4);
        let _operator = answer(peer, r#"{"type":"intervene","decision":"deny"}"#.to_string());
        let outcome = InterventionGate::new(&mut io)
            .request_handoff(5, &decision(NextAction::Handoff, Some("OOM")), "OOM")
            .await
            .unwrap();
        assert!(matches!(outcome, HandoffOutcome::Denied(ref p) if p.starts_with("Handoff DENIED")));
    }

    #[tokio::test]
    async fn test_answer_sent_before_checkpoint_is_rejected() {
        let (mut io, mut peer) = SessionIo::pair(4);
        peer.send_raw(r#"{"type":"intervene","decision":"approve"}"#).await;
        let result = InterventionGate::new(&mut io)
            .request_handoff(5, &decision(NextAction::Handoff, Some("OOM")), "OOM")
            .await;
        assert!(matches!(result, Err(SessionError::ProtocolViolation(ref d)) if d.contains("unsolicited")));
        // The checkpoint was never raised.
        drop(io);
        assert!(peer.next_event().await.is_none());

        let (mut io, peer) = SessionIo::pair(4);
        peer.send_raw(r#"{"type":"intervene","decision":"approve"}"#).await;
        let result = InterventionGate::new(&mut io)
            .request_approval(1, &decision(NextAction::AwaitApproval, None))
            .await;
        assert!(matches!(result, Err(SessionError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn test_disconnect_while_waiting() {
        let (mut io, peer) = SessionIo::pair(4);
        drop(peer);
        let result = InterventionGate::new(&mut io)
            .request_approval(1, &decision(NextAction::AwaitApproval, None))
            .await;
        assert!(matches!(result, Err(SessionError::Disconnected)));
    }
}
