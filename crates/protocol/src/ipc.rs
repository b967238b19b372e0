//! Progress events streamed from the core to a caller.
//!
//! Orchestration runs detached from whoever requested it; these events are
//! the live view of a run. Every operation-log append is mirrored here, so
//! a caller can follow a job without polling the record store.
//!
//! Communication is asynchronous and channel-based: the core owns an
//! `mpsc::Sender<Event>` and never blocks on a slow or absent consumer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job_models::JobKey;
use crate::operation_models::OperationStatus;

/// Events sent from the orchestration core to a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A new operation has been admitted and persisted.
    OperationStarted { operation_id: Uuid, key: JobKey },

    /// A sub-stage has begun executing.
    StageStarted { operation_id: Uuid, stage: String },

    /// A sub-stage finished successfully.
    StageCompleted { operation_id: Uuid, stage: String },

    /// An entry was appended to the operation log.
    ///
    /// Carries streamed container output lines among other things; the
    /// consumer should treat `data` as opaque JSON.
    Log {
        operation_id: Uuid,
        event: String,
        data: serde_json::Value,
    },

    /// The operation reached a terminal status.
    OperationFinished {
        operation_id: Uuid,
        status: OperationStatus,
    },
}
