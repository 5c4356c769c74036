//! Diagnostic sessions.
//!
//! A [`DiagnosticSession`] drives one transport connection: it reads the
//! `start` message, claims the issue's registry slot, and then either replays
//! a finished investigation, offers to resume a paused one, or opens a new
//! diagnostic thread and hands control to the [`TurnController`].
//!
//! Every failure is turned into an outbound event here; nothing escapes to
//! the transport as a bare fault.

pub mod controller;
pub mod gate;
pub mod handoff;
pub mod protocol;
pub mod registry;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{CollectorBackend, HealthdeskConfig, LimitsConfig, ThreadBackend};
use crate::engine::{prompts, EngineSettings, OpenAiEngine, ReasoningEngine};
use crate::error::{ConfigError, SessionError, SessionResult};
use crate::issue::Issue;
use crate::threads::{chronological, FileThreadStore, InMemoryThreadStore, ThreadStore};
use crate::tools::kubectl::KubectlCollector;
use crate::tools::mock::MockClusterCollector;
use crate::tools::{Collector, ToolRegistry};

pub use controller::TurnController;
pub use gate::{ApprovalOutcome, HandoffOutcome, InterventionGate, InterventionKind};
pub use handoff::{HandoffReport, HandoffStage};
pub use protocol::{
    InboundMessage, OutboundEvent, ResumeDecision, SessionIo, SessionPeer, SessionStatus,
};
pub use registry::{SessionLease, SessionRecord, SessionRegistry, SessionSummary, SlotState};

/// Collaborators shared by every session of a gateway.
pub struct SessionServices {
    pub diagnostic_engine: Arc<dyn ReasoningEngine>,
    pub solution_engine: Arc<dyn ReasoningEngine>,
    pub threads: Arc<dyn ThreadStore>,
    pub tools: Arc<ToolRegistry>,
    pub registry: Arc<SessionRegistry>,
    pub limits: LimitsConfig,
}

impl SessionServices {
    pub fn new(
        diagnostic_engine: Arc<dyn ReasoningEngine>,
        solution_engine: Arc<dyn ReasoningEngine>,
        threads: Arc<dyn ThreadStore>,
        tools: Arc<ToolRegistry>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            diagnostic_engine,
            solution_engine,
            threads,
            tools,
            registry: Arc::new(SessionRegistry::new()),
            limits,
        }
    }

    /// Wire the configured thread store, collectors and engines.
    pub async fn from_config(config: &HealthdeskConfig) -> Result<Self, ConfigError> {
        let threads: Arc<dyn ThreadStore> = match config.threads.backend {
            ThreadBackend::Memory => Arc::new(InMemoryThreadStore::new()),
            ThreadBackend::File => Arc::new(
                FileThreadStore::new(config.threads.dir.clone())
                    .await
                    .map_err(|e| ConfigError::Setup {
                        component: "thread store",
                        detail: e.to_string(),
                    })?,
            ),
        };

        let collectors = &config.collectors;
        let collector: Arc<dyn Collector> = match collectors.backend {
            CollectorBackend::Mock => Arc::new(MockClusterCollector::new(collectors.mock_profile)),
            CollectorBackend::Kubectl => Arc::new(KubectlCollector::new(
                collectors.kubectl_path.clone(),
                collectors.kube_context.clone(),
            )),
        };
        let tools = Arc::new(ToolRegistry::with_catalogue(
            collector,
            config.limits.collector_timeout(),
        ));

        let engine = &config.engine;
        let api_key = engine.api_key();
        if api_key.is_none() {
            warn!(env = %engine.api_key_env, "no API key set; engine requests will be unauthenticated");
        }
        let settings = |temperature: f32| EngineSettings {
            base_url: engine.base_url.clone(),
            model: engine.model.clone(),
            api_key: api_key.clone(),
            temperature,
            connect_timeout: std::time::Duration::from_secs(engine.connect_timeout_secs),
        };
        let setup = |e: crate::error::EngineError| ConfigError::Setup {
            component: "reasoning engine",
            detail: e.to_string(),
        };
        let diagnostic_engine = OpenAiEngine::new(
            settings(engine.diagnostic_temperature),
            prompts::diagnostic_instructions(&tools.catalogue()),
            Arc::clone(&threads),
        )
        .map_err(setup)?;
        let solution_engine = OpenAiEngine::new(
            settings(engine.solution_temperature),
            prompts::solution_instructions(),
            Arc::clone(&threads),
        )
        .map_err(setup)?;

        info!(
            collectors = ?collectors.backend,
            threads = ?config.threads.backend,
            model = %engine.model,
            "session services ready"
        );
        Ok(Self::new(
            Arc::new(diagnostic_engine),
            Arc::new(solution_engine),
            threads,
            tools,
            config.limits.clone(),
        ))
    }
}

/// One connection's session.
pub struct DiagnosticSession {
    services: Arc<SessionServices>,
}

impl DiagnosticSession {
    pub fn new(services: Arc<SessionServices>) -> Self {
        Self { services }
    }

    /// Run the session to completion and report its terminal status.
    ///
    /// Dropping the returned future abandons the session; the registry keeps
    /// whatever the thread store already recorded.
    pub async fn run(&self, mut io: SessionIo) -> SessionStatus {
        let mut lease = None;
        let err = match self.drive(&mut io, &mut lease).await {
            Ok(status) => {
                let _ = io.emit(OutboundEvent::Complete { status }).await;
                return status;
            }
            Err(err) => err,
        };

        match &err {
            SessionError::Disconnected => {
                info!("transport closed, session abandoned");
                return SessionStatus::InProgress;
            }
            SessionError::ProtocolViolation(detail) => {
                warn!(%detail, "protocol violation, discarding session");
                if let Some(lease) = lease.as_mut() {
                    lease.discard();
                }
            }
            SessionError::Upstream(detail) => {
                error!(%detail, "upstream failure, session left resumable");
            }
            SessionError::Busy(detail) => {
                warn!(%detail, "rejecting start");
            }
        }
        let _ = io
            .emit(OutboundEvent::Error {
                detail: err.to_string(),
            })
            .await;
        SessionStatus::Error
    }

    async fn drive(
        &self,
        io: &mut SessionIo,
        slot: &mut Option<SessionLease>,
    ) -> SessionResult<SessionStatus> {
        let report = match io.receive().await? {
            InboundMessage::Start { issue } => issue,
            other => {
                return Err(SessionError::ProtocolViolation(format!(
                    "expected start, got {}",
                    other.kind()
                )))
            }
        };
        let issue = Issue::new(report).map_err(|e| SessionError::ProtocolViolation(e.to_string()))?;
        let key = issue.key().clone();
        let lease = slot.insert(self.services.registry.claim(&key)?);

        let existing = lease.record().cloned();
        match existing {
            Some(record) if record.is_terminal() => {
                info!(issue_key = %key, "replaying finished investigation");
                self.replay(io, &record).await?;
                Ok(SessionStatus::Handoff)
            }
            Some(record) => {
                self.replay(io, &record).await?;
                io.reject_unsolicited()?;
                io.emit(OutboundEvent::ResumeAvailable {
                    issue_key: key.clone(),
                    thread: record.diagnostic_thread.clone(),
                })
                .await?;
                match io.receive().await? {
                    InboundMessage::Resume {
                        decision: ResumeDecision::Yes,
                    } => {
                        info!(issue_key = %key, thread = %record.diagnostic_thread, "resuming investigation");
                        TurnController::new(
                            &self.services,
                            io,
                            lease,
                            issue,
                            record.diagnostic_thread,
                        )
                        .resume()
                        .await
                    }
                    InboundMessage::Resume {
                        decision: ResumeDecision::No,
                    } => {
                        info!(issue_key = %key, "operator declined to resume, discarding");
                        lease.discard();
                        Ok(SessionStatus::InProgress)
                    }
                    other => Err(SessionError::ProtocolViolation(format!(
                        "expected resume, got {}",
                        other.kind()
                    ))),
                }
            }
            None => {
                let thread = self.services.threads.create_thread().await?;
                info!(issue_key = %key, thread = %thread, "opening investigation");
                lease.insert(SessionRecord::new(issue.clone(), thread.clone()));
                TurnController::new(&self.services, io, lease, issue, thread)
                    .start()
                    .await
            }
        }
    }

    /// Send the audit trail of a known session.
    async fn replay(&self, io: &SessionIo, record: &SessionRecord) -> SessionResult<()> {
        let threads = self.services.threads.as_ref();
        let diagnostic = chronological(threads, &record.diagnostic_thread).await?;
        let solution = match &record.solution_thread {
            Some(thread) => chronological(threads, thread).await?,
            None => Vec::new(),
        };
        io.emit(OutboundEvent::History {
            issue_key: record.issue.key().clone(),
            diagnostic,
            solution,
            outcome: record.outcome.clone(),
        })
        .await
    }
}
