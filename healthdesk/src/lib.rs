// Healthdesk Library
// Human-supervised diagnostic sessions for unhealthy cluster resources

pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
#[cfg(feature = "server")]
pub mod gateway;
pub mod issue;
pub mod session;
pub mod threads;
pub mod tools;

pub use config::HealthdeskConfig;
pub use decision::{Decision, NextAction, SolutionOutcome};
pub use error::{SessionError, SessionResult};
pub use issue::{Issue, IssueKey};
pub use session::{DiagnosticSession, SessionServices, SessionStatus};
