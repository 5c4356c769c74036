//! Duplex session protocol.
//!
//! Inbound frames are JSON text tagged by `type`; outbound events use the
//! same convention. [`SessionIo`] is the session's end of a pair of channels;
//! the transport (or a test) holds the matching [`SessionPeer`].

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::decision::{Decision, SolutionOutcome};
use crate::error::{SessionError, SessionResult};
use crate::issue::{IssueKey, IssueReport};
use crate::threads::{ThreadMessage, ThreadRef};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Start {
        issue: IssueReport,
    },
    Intervene {
        #[serde(default)]
        decision: Option<String>,
        #[serde(default)]
        hint: Option<String>,
    },
    Resume {
        decision: ResumeDecision,
    },
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Start { .. } => "start",
            InboundMessage::Intervene { .. } => "intervene",
            InboundMessage::Resume { .. } => "resume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeDecision {
    Yes,
    No,
}

/// Terminal status reported in `complete` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    /// Bounds exhausted or the operator declined to continue.
    InProgress,
    /// The solution stage completed.
    Handoff,
    /// Protocol violation or unrecoverable upstream failure.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    History {
        issue_key: IssueKey,
        diagnostic: Vec<ThreadMessage>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        solution: Vec<ThreadMessage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<SolutionOutcome>,
    },
    ResumeAvailable {
        issue_key: IssueKey,
        thread: ThreadRef,
    },
    Diagnostic {
        step: u32,
        decision: Decision,
    },
    AwaitingApproval {
        step: u32,
        thought: String,
    },
    HandoffApproval {
        step: u32,
        thought: String,
        root_cause: String,
    },
    Handoff {
        solution_thread: ThreadRef,
        root_cause: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<SolutionOutcome>,
        raw: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parse_error: Option<String>,
    },
    Complete {
        status: SessionStatus,
    },
    Error {
        detail: String,
    },
}

/// The session's side of the transport.
#[derive(Debug)]
pub struct SessionIo {
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<OutboundEvent>,
}

/// The transport's side of a session.
#[derive(Debug)]
pub struct SessionPeer {
    pub inbound: mpsc::Sender<String>,
    pub outbound: mpsc::Receiver<OutboundEvent>,
}

impl SessionIo {
    pub fn new(inbound: mpsc::Receiver<String>, outbound: mpsc::Sender<OutboundEvent>) -> Self {
        Self { inbound, outbound }
    }

    pub fn pair(capacity: usize) -> (SessionIo, SessionPeer) {
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        (
            SessionIo::new(in_rx, out_tx),
            SessionPeer {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    pub async fn emit(&self, event: OutboundEvent) -> SessionResult<()> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| SessionError::Disconnected)
    }

    /// Next inbound message. A frame that is not a known message is a
    /// protocol violation; a closed transport is a disconnect.
    pub async fn receive(&mut self) -> SessionResult<InboundMessage> {
        let frame = self.inbound.recv().await.ok_or(SessionError::Disconnected)?;
        serde_json::from_str(&frame)
            .map_err(|e| SessionError::ProtocolViolation(format!("malformed message: {}", e)))
    }

    /// Fail if the peer sent anything while no answer was outstanding.
    /// Called right before a checkpoint is raised, so an answer queued ahead
    /// of the request can never be taken as the operator's reply.
    pub fn reject_unsolicited(&mut self) -> SessionResult<()> {
        match self.inbound.try_recv() {
            Ok(frame) => {
                let kind = serde_json::from_str::<InboundMessage>(&frame)
                    .map(|message| message.kind())
                    .unwrap_or("malformed frame");
                Err(SessionError::ProtocolViolation(format!(
                    "unsolicited {} received before any answer was requested",
                    kind
                )))
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(()),
        }
    }

    /// Resolves once the transport stops accepting events.
    pub async fn closed(&self) {
        self.outbound.closed().await
    }
}

impl SessionPeer {
    pub async fn send(&self, message: &InboundMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(frame) => self.inbound.send(frame).await.is_ok(),
            Err(_) => false,
        }
    }

    pub async fn send_raw(&self, frame: impl Into<String>) -> bool {
        self.inbound.send(frame.into()).await.is_ok()
    }

    pub async fn next_event(&mut self) -> Option<OutboundEvent> {
        self.outbound.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_wire_format() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"intervene","decision":"deny","hint":"check quota"}"#)
                .unwrap();
        assert_eq!(
            msg,
            InboundMessage::Intervene {
                decision: Some("deny".to_string()),
                hint: Some("check quota".to_string())
            }
        );

        let msg: InboundMessage = serde_json::from_str(r#"{"type":"resume","decision":"yes"}"#).unwrap();
        assert_eq!(msg.kind(), "resume");

        let msg: InboundMessage = serde_json::from_value(json!({
            "type": "start",
            "issue": {"issueType": "NodeNotReady", "resourceType": "Node", "resourceName": "node-3"}
        }))
        .unwrap();
        assert!(matches!(msg, InboundMessage::Start { ref issue } if issue.resource_name == "node-3"));

        assert!(serde_json::from_str::<InboundMessage>(r#"{"type":"explode"}"#).is_err());
    }

    #[test]
    fn test_outbound_wire_format() {
        let event = serde_json::to_value(OutboundEvent::Complete {
            status: SessionStatus::InProgress,
        })
        .unwrap();
        assert_eq!(event, json!({"type": "complete", "status": "in-progress"}));

        let event = serde_json::to_value(OutboundEvent::AwaitingApproval {
            step: 2,
            thought: "scale down?".to_string(),
        })
        .unwrap();
        assert_eq!(event["type"], "awaiting_approval");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_protocol_violation() {
        let (mut io, peer) = SessionIo::pair(4);
        assert!(peer.send_raw("{not json").await);
        assert!(matches!(
            io.receive().await,
            Err(SessionError::ProtocolViolation(_))
        ));
        drop(peer);
        assert!(matches!(io.receive().await, Err(SessionError::Disconnected)));
    }

    #[tokio::test]
    async fn test_queued_frame_is_unsolicited() {
        let (mut io, peer) = SessionIo::pair(4);
        assert!(io.reject_unsolicited().is_ok());

        assert!(peer.send_raw(r#"{"type":"intervene","decision":"approve"}"#).await);
        match io.reject_unsolicited() {
            Err(SessionError::ProtocolViolation(detail)) => {
                assert!(detail.contains("unsolicited intervene"))
            }
            other => panic!("queued answer accepted: {:?}", other),
        }
        assert!(io.reject_unsolicited().is_ok());

        // A closed transport is left for the next receive to report.
        drop(peer);
        assert!(io.reject_unsolicited().is_ok());
        assert!(matches!(io.receive().await, Err(SessionError::Disconnected)));
    }
}
