//! Error taxonomy for diagnostic sessions.
//!
//! Decision parse failures and collector failures are recoverable and never
//! leave their boundary as errors: the assembler drops schema-invalid objects
//! and the dispatcher turns collector failures into observation text. Only the
//! variants of [`SessionError`] end a session, and the session driver converts
//! each of them into an outbound protocol event.

use thiserror::Error;

/// Failures raised by a reasoning engine call.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Request(String),
    #[error("engine returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("engine stream failed: {0}")]
    Stream(String),
    #[error("engine call timed out after {0}s")]
    Timeout(u64),
    #[error("engine misconfigured: {0}")]
    Config(String),
    #[error("engine has no scripted response left")]
    Exhausted,
}

/// Failures raised by a thread store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("unknown thread: {0}")]
    UnknownThread(String),
    #[error("thread store I/O error: {0}")]
    Io(String),
    #[error("corrupt thread record in {thread}: {detail}")]
    Corrupt { thread: String, detail: String },
}

/// Failures raised by a diagnostic collector. Never fatal: the dispatcher
/// renders them as `Tool Error: ...` observations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("missing required argument '{0}'")]
    MissingArgument(String),
    #[error("argument '{name}' has the wrong type, expected {expected}")]
    InvalidArgument { name: String, expected: &'static str },
    #[error("unexpected argument shape: {0}")]
    ArgumentShape(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("collector timed out after {0}s")]
    Timeout(u64),
}

/// Schema violations of a well-formed JSON object.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("invalid shape: {0}")]
    Shape(String),
    #[error("root_cause must be set if and only if next_action is handoff")]
    RootCauseMismatch,
    #[error("action may only be set when next_action is continue")]
    ActionWithoutContinue,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("failed to initialise {component}: {detail}")]
    Setup {
        component: &'static str,
        detail: String,
    },
}

/// Fatal session outcomes, converted into protocol events at the driver
/// boundary.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Another connection is driving the same issue.
    #[error("{0}")]
    Busy(String),
    #[error("transport disconnected")]
    Disconnected,
}

impl From<EngineError> for SessionError {
    fn from(err: EngineError) -> Self {
        SessionError::Upstream(err.to_string())
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Upstream(err.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
