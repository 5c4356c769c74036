//! Solution stage, run once after the operator approves a handoff.

use tracing::{info, warn};

use super::registry::SessionLease;
use super::SessionServices;
use crate::decision::{SolutionOutcome, StreamAssembler};
use crate::engine::prompts;
use crate::error::{EngineError, SessionError, SessionResult};
use crate::issue::Issue;
use crate::threads::{Role, ThreadRef};

#[derive(Debug, Clone)]
pub struct HandoffReport {
    pub solution_thread: ThreadRef,
    pub root_cause: String,
    pub outcome: Option<SolutionOutcome>,
    pub raw: String,
    pub parse_error: Option<String>,
}

pub struct HandoffStage<'a> {
    services: &'a SessionServices,
}

impl<'a> HandoffStage<'a> {
    pub fn new(services: &'a SessionServices) -> Self {
        Self { services }
    }

    /// Ask the solution engine for a fix on a fresh thread and record the
    /// result. Recording the solution thread makes the session terminal.
    pub async fn run(
        &self,
        lease: &mut SessionLease,
        issue: &Issue,
        root_cause: &str,
        rationale: &str,
    ) -> SessionResult<HandoffReport> {
        let threads = &self.services.threads;
        let input = prompts::solution_input(issue, root_cause, rationale);
        let thread = threads.create_thread().await?;
        info!(issue_key = %issue.key(), thread = %thread, "starting solution stage");

        let timeout = self.services.limits.engine_timeout();
        let raw = tokio::time::timeout(timeout, self.services.solution_engine.submit(&thread, &input))
            .await
            .map_err(|_| SessionError::from(EngineError::Timeout(timeout.as_secs())))??;
        threads.append(&thread, Role::User, &input).await?;
        threads.append(&thread, Role::Assistant, &raw).await?;

        let outcome = StreamAssembler::<SolutionOutcome>::extract_all(&raw).pop();
        let parse_error = match outcome {
            Some(_) => None,
            None => {
                warn!(thread = %thread, "solution reply holds no valid outcome object");
                Some("reply contains no JSON object matching the solution schema".to_string())
            }
        };

        if let Some(record) = lease.record_mut() {
            record.solution_thread = Some(thread.clone());
            record.root_cause = Some(root_cause.to_string());
            record.outcome = outcome.clone();
            record.touch();
        }

        Ok(HandoffReport {
            solution_thread: thread,
            root_cause: root_cause.to_string(),
            outcome,
            raw,
            parse_error,
        })
    }
}
