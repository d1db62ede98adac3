use std::fmt;
use std::time::Duration;

/// Why a session was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// The workflow-level deadline elapsed.
    Deadline(Duration),
    /// The caller cancelled the run (for example Ctrl-C in the CLI).
    Cancelled,
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptReason::Deadline(d) => {
                write!(f, "deadline exceeded after {:.1}s", d.as_secs_f64())
            }
            InterruptReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Coarse classification used by front ends to choose an exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Engine could not be set up (exit 3).
    Configuration,
    /// The script failed or was interrupted (exit 1).
    Runtime,
    /// The caller named something that is not a runnable workflow (exit 2).
    Usage,
}

impl FailureKind {
    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::Configuration => 3,
            FailureKind::Runtime => 1,
            FailureKind::Usage => 2,
        }
    }
}

/// Errors returned by [`Engine::run_workflow`](super::Engine::run_workflow).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("script not found: {identifier}")]
    NotFound { identifier: String },
    #[error("invalid amo workflow: {identifier} (must start with //!amo)")]
    InvalidWorkflow { identifier: String },
    #[error("workflow {identifier} failed: {message}")]
    Execution { identifier: String, message: String },
    #[error("workflow {identifier} interrupted: {reason}")]
    Interrupted {
        identifier: String,
        reason: InterruptReason,
    },
    #[error("engine initialization failed: {0}")]
    Init(String),
}

impl EngineError {
    /// True when the run ended because of its deadline or an explicit cancel.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Interrupted { .. })
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            EngineError::NotFound { .. } | EngineError::InvalidWorkflow { .. } => {
                FailureKind::Usage
            }
            EngineError::Execution { .. } | EngineError::Interrupted { .. } => {
                FailureKind::Runtime
            }
            EngineError::Init(_) => FailureKind::Configuration,
        }
    }
}
