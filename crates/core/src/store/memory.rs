//! In-memory store implementation.
//!
//! Backs integration tests and local CLI runs. All state lives behind one
//! mutex, which is what makes the conditional operation insert atomic.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::store::{BlobStore, RecordStore};
use async_trait::async_trait;
use ram_protocol::job_models::JobKey;
use ram_protocol::operation_models::{LogEntry, Operation, OperationStatus};
use ram_protocol::scenario_models::{FileRecord, Project, Scenario};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    projects: HashMap<u64, Project>,
    scenarios: HashMap<(u64, u64), Scenario>,
    settings: HashMap<(u64, u64, String), String>,
    files: HashMap<u64, FileRecord>,
    operations: Vec<Operation>,
    deleted_blobs: Vec<String>,
    released_handles: Vec<JobKey>,
}

/// In-memory record and blob store.
///
/// Cloning is cheap and shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding helpers used by fixtures and the CLI.

    pub async fn insert_project(&self, project: Project) {
        self.inner.lock().await.projects.insert(project.id, project);
    }

    pub async fn insert_scenario(&self, scenario: Scenario) {
        self.inner
            .lock()
            .await
            .scenarios
            .insert((scenario.project_id, scenario.id), scenario);
    }

    pub async fn set_setting(&self, key: JobKey, name: &str, value: &str) {
        self.inner.lock().await.settings.insert(
            (key.project_id, key.scenario_id, name.to_string()),
            value.to_string(),
        );
    }

    pub async fn insert_file_record(&self, record: FileRecord) {
        self.inner.lock().await.files.insert(record.id, record);
    }

    // Inspection helpers used by tests.

    pub async fn operation(&self, id: Uuid) -> Option<Operation> {
        self.inner
            .lock()
            .await
            .operations
            .iter()
            .find(|op| op.id == id)
            .cloned()
    }

    pub async fn deleted_blobs(&self) -> Vec<String> {
        self.inner.lock().await.deleted_blobs.clone()
    }

    pub async fn released_handles(&self) -> Vec<JobKey> {
        self.inner.lock().await.released_handles.clone()
    }

    pub async fn file_record_count(&self) -> usize {
        self.inner.lock().await.files.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_project(&self, project_id: u64) -> OrchestrationResult<Option<Project>> {
        Ok(self.inner.lock().await.projects.get(&project_id).cloned())
    }

    async fn get_scenario(
        &self,
        project_id: u64,
        scenario_id: u64,
    ) -> OrchestrationResult<Option<Scenario>> {
        Ok(self
            .inner
            .lock()
            .await
            .scenarios
            .get(&(project_id, scenario_id))
            .cloned())
    }

    async fn get_scenario_setting(
        &self,
        project_id: u64,
        scenario_id: u64,
        key: &str,
    ) -> OrchestrationResult<Option<String>> {
        Ok(self
            .inner
            .lock()
            .await
            .settings
            .get(&(project_id, scenario_id, key.to_string()))
            .cloned())
    }

    async fn list_file_records(
        &self,
        project_id: u64,
        scenario_id: u64,
        kinds: &[&str],
    ) -> OrchestrationResult<Vec<FileRecord>> {
        let inner = self.inner.lock().await;
        let mut records: Vec<FileRecord> = inner
            .files
            .values()
            .filter(|f| {
                f.project_id == project_id
                    && f.scenario_id == scenario_id
                    && kinds.contains(&f.kind.as_str())
            })
            .cloned()
            .collect();
        records.sort_by_key(|f| f.id);
        Ok(records)
    }

    async fn delete_file_record(&self, id: u64) -> OrchestrationResult<()> {
        self.inner.lock().await.files.remove(&id);
        Ok(())
    }

    async fn insert_operation_if_none_running(&self, op: Operation) -> OrchestrationResult<()> {
        let mut inner = self.inner.lock().await;
        // Check and insert under the same lock: this is the single-flight
        // guarantee.
        let running = inner.operations.iter().any(|existing| {
            existing.kind == op.kind
                && existing.project_id == op.project_id
                && existing.scenario_id == op.scenario_id
                && existing.status == OperationStatus::Running
        });
        if running {
            return Err(OrchestrationError::AlreadyRunning);
        }
        inner.operations.push(op);
        Ok(())
    }

    async fn latest_operation(
        &self,
        kind: &str,
        project_id: u64,
        scenario_id: u64,
    ) -> OrchestrationResult<Option<Operation>> {
        Ok(self
            .inner
            .lock()
            .await
            .operations
            .iter()
            .rev()
            .find(|op| {
                op.kind == kind && op.project_id == project_id && op.scenario_id == scenario_id
            })
            .cloned())
    }

    async fn append_operation_log(
        &self,
        operation_id: Uuid,
        entry: LogEntry,
    ) -> OrchestrationResult<()> {
        let mut inner = self.inner.lock().await;
        let op = inner
            .operations
            .iter_mut()
            .find(|op| op.id == operation_id)
            .ok_or_else(|| {
                OrchestrationError::NotFound(format!("Operation {operation_id} not found"))
            })?;
        op.log.push(entry);
        Ok(())
    }

    async fn set_operation_status(
        &self,
        operation_id: Uuid,
        status: OperationStatus,
    ) -> OrchestrationResult<bool> {
        let mut inner = self.inner.lock().await;
        let op = inner
            .operations
            .iter_mut()
            .find(|op| op.id == operation_id)
            .ok_or_else(|| {
                OrchestrationError::NotFound(format!("Operation {operation_id} not found"))
            })?;
        if op.status.is_terminal() {
            return Ok(false);
        }
        op.status = status;
        Ok(true)
    }

    async fn release_scenario_handle(&self, key: JobKey) -> OrchestrationResult<()> {
        self.inner.lock().await.released_handles.push(key);
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn delete_blob(&self, path: &str) -> OrchestrationResult<()> {
        self.inner.lock().await.deleted_blobs.push(path.to_string());
        Ok(())
    }
}
