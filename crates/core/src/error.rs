//! Orchestration error taxonomy.
//!
//! Admission-time errors surface synchronously to the caller. Once a job has
//! been accepted, errors are captured into the operation log as the terminal
//! `error` status and never propagate back out of the detached task.

use thiserror::Error;

/// Errors produced by the orchestration core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    /// A referenced record (operation, project, scenario, file) is absent.
    #[error("{0}")]
    NotFound(String),

    /// An operation with the same identity is already running.
    ///
    /// Returned by the operation log's atomic conditional insert when a
    /// concurrent start won the race.
    #[error("Result generation already running")]
    AlreadyRunning,

    /// A lifecycle or precondition conflict (already running, project not
    /// active, nothing to abort, ...).
    #[error("{0}")]
    DataConflict(String),

    /// Unsupported or incomplete configuration, detected before any spawn.
    #[error("{0}")]
    Configuration(String),

    /// The spawned analysis process exited with a nonzero code.
    #[error("Analysis process exited with code {code}: {stderr}")]
    ProcessFailure { code: i32, stderr: String },

    /// A sub-stage service signaled failure.
    #[error("{0}")]
    Service(String),
}

/// Type alias for Result with OrchestrationError.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
