//! Collaborator seams for the record and blob stores.
//!
//! The relational data layer and the object store are external to this
//! crate; the orchestrator only needs the narrow interfaces below. The
//! in-memory implementation in [`memory`] backs tests and local runs.

pub mod memory;

use crate::error::OrchestrationResult;
use async_trait::async_trait;
use ram_protocol::job_models::JobKey;
use ram_protocol::operation_models::{LogEntry, Operation, OperationStatus};
use ram_protocol::scenario_models::{FileRecord, Project, Scenario};
use uuid::Uuid;

pub use memory::MemoryStore;

/// Record-store operations the orchestrator depends on.
///
/// This is a key-value/record view with simple predicate queries; the
/// persistence engine behind it is not this crate's concern.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_project(&self, project_id: u64) -> OrchestrationResult<Option<Project>>;

    async fn get_scenario(
        &self,
        project_id: u64,
        scenario_id: u64,
    ) -> OrchestrationResult<Option<Scenario>>;

    /// Read one scenario setting by key, e.g. `res_gen_at`.
    async fn get_scenario_setting(
        &self,
        project_id: u64,
        scenario_id: u64,
        key: &str,
    ) -> OrchestrationResult<Option<String>>;

    /// List stored-file records of the given kinds for a scenario.
    async fn list_file_records(
        &self,
        project_id: u64,
        scenario_id: u64,
        kinds: &[&str],
    ) -> OrchestrationResult<Vec<FileRecord>>;

    async fn delete_file_record(&self, id: u64) -> OrchestrationResult<()>;

    /// Atomic single-flight insert: persist `op` unless an operation with
    /// the same `(kind, project, scenario)` identity is already running.
    ///
    /// The existence check and the insert must happen in one store-side
    /// critical section. Returns
    /// [`OrchestrationError::AlreadyRunning`](crate::error::OrchestrationError::AlreadyRunning)
    /// when a concurrent start won.
    async fn insert_operation_if_none_running(&self, op: Operation) -> OrchestrationResult<()>;

    /// The most recent operation for an identity, if any exists.
    async fn latest_operation(
        &self,
        kind: &str,
        project_id: u64,
        scenario_id: u64,
    ) -> OrchestrationResult<Option<Operation>>;

    async fn append_operation_log(
        &self,
        operation_id: Uuid,
        entry: LogEntry,
    ) -> OrchestrationResult<()>;

    /// Conditionally transition an operation to a terminal status.
    ///
    /// Only a `running` operation transitions; returns `false` when the
    /// record is already terminal (a concurrent finish won). The check and
    /// the write must happen in one store-side critical section, so exactly
    /// one of two racing finishers observes `true`.
    async fn set_operation_status(
        &self,
        operation_id: Uuid,
        status: OperationStatus,
    ) -> OrchestrationResult<bool>;

    /// Release any exclusive local handle held for the scenario's database
    /// file. Required before spawning an external process that needs
    /// exclusive access to the same resource. No-op when nothing is held.
    async fn release_scenario_handle(&self, key: JobKey) -> OrchestrationResult<()>;
}

/// Blob-store operations the orchestrator depends on.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Delete a stored blob by path. Used best-effort when clearing
    /// previous result artifacts.
    async fn delete_blob(&self, path: &str) -> OrchestrationResult<()>;
}
