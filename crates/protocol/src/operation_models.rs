//! Persisted operation records.
//!
//! An operation is the durable record of one long-running job: its lifecycle
//! status plus an append-only log of timestamped entries. Operations are
//! keyed by `(kind, project_id, scenario_id)`; at most one operation per
//! identity may be running at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operation kind for the result-generation job.
pub const OP_GENERATE_ANALYSIS: &str = "generate-analysis";

/// Lifecycle status of a persisted operation.
///
/// Normal progression: NotStarted -> Running -> Completed.
/// Error is the other terminal state; both are reached only through
/// a single `finish` call on the operation log.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OperationStatus {
    /// Record exists but the job has not begun executing.
    NotStarted,

    /// The job is actively executing.
    Running,

    /// The job finished successfully.
    Completed,

    /// The job finished with an error (message in the closing log entry).
    Error,
}

impl OperationStatus {
    /// True for the two terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Error)
    }
}

/// One timestamped entry in an operation's log.
///
/// Entries are read back in append order. `data` is free-form JSON: stage
/// parameters, streamed container output lines, or the closing error payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub data: serde_json::Value,
}

/// The persisted record of a named long-running job.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Operation {
    /// Unique identifier for this operation record.
    pub id: Uuid,

    /// Operation kind, e.g. [`OP_GENERATE_ANALYSIS`].
    pub kind: String,

    pub project_id: u64,
    pub scenario_id: u64,

    /// Current lifecycle status.
    pub status: OperationStatus,

    pub created_at: DateTime<Utc>,

    /// Append-only log of everything that happened during the run.
    pub log: Vec<LogEntry>,
}
