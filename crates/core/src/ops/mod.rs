//! Operation lifecycle state machine.
//!
//! An [`OperationLog`] is a handle to one persisted operation record. It
//! owns the status transitions (`not-started -> running -> {completed,
//! error}`), appends timestamped log entries in order, and mirrors every
//! append onto the progress event channel.
//!
//! The terminal transition is first-wins: the abort path and the
//! supervision task hold independent handles to the same record and may
//! race to finish it, so `finish` delegates the decision to the store's
//! conditional status write and the loser backs off without appending a
//! second closing entry.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::store::RecordStore;
use chrono::Utc;
use ram_protocol::ipc::Event;
use ram_protocol::job_models::JobKey;
use ram_protocol::operation_models::{LogEntry, Operation, OperationStatus};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Handle to one persisted operation record.
pub struct OperationLog {
    store: Arc<dyn RecordStore>,
    events: Option<Sender<Event>>,
    id: Uuid,
    kind: String,
    key: JobKey,
    /// Cached status; authoritative copy lives in the store.
    status: Mutex<OperationStatus>,
}

impl OperationLog {
    /// Start a new operation in `running` state.
    ///
    /// Uses the store's atomic conditional insert, so two concurrent starts
    /// for the same `(kind, project, scenario)` identity cannot both
    /// succeed; the loser gets [`OrchestrationError::AlreadyRunning`].
    pub async fn start(
        store: Arc<dyn RecordStore>,
        events: Option<Sender<Event>>,
        kind: &str,
        key: JobKey,
    ) -> OrchestrationResult<Self> {
        let op = Operation {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            project_id: key.project_id,
            scenario_id: key.scenario_id,
            status: OperationStatus::Running,
            created_at: Utc::now(),
            log: Vec::new(),
        };
        store.insert_operation_if_none_running(op.clone()).await?;

        let log = Self {
            store,
            events,
            id: op.id,
            kind: op.kind,
            key,
            status: Mutex::new(OperationStatus::Running),
        };
        log.emit(Event::OperationStarted {
            operation_id: log.id,
            key,
        })
        .await;
        Ok(log)
    }

    /// Load the most recent operation for an identity.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] when no record exists.
    pub async fn load_by_data(
        store: Arc<dyn RecordStore>,
        events: Option<Sender<Event>>,
        kind: &str,
        key: JobKey,
    ) -> OrchestrationResult<Self> {
        let op = store
            .latest_operation(kind, key.project_id, key.scenario_id)
            .await?
            .ok_or_else(|| {
                OrchestrationError::NotFound(format!("Operation {kind} for {key} not found"))
            })?;

        Ok(Self {
            store,
            events,
            id: op.id,
            kind: op.kind,
            key,
            status: Mutex::new(op.status),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn key(&self) -> JobKey {
        self.key
    }

    /// True iff the operation is currently `running`.
    pub async fn is_started(&self) -> bool {
        *self.status.lock().await == OperationStatus::Running
    }

    /// True iff the operation reached a terminal status.
    pub async fn is_completed(&self) -> bool {
        self.status.lock().await.is_terminal()
    }

    /// Append a log entry. Entries are read back in append order.
    pub async fn log(&self, event: &str, data: serde_json::Value) -> OrchestrationResult<()> {
        let entry = LogEntry {
            timestamp: Utc::now(),
            event: event.to_string(),
            data: data.clone(),
        };
        self.store.append_operation_log(self.id, entry).await?;
        self.emit(Event::Log {
            operation_id: self.id,
            event: event.to_string(),
            data,
        })
        .await;
        Ok(())
    }

    /// Transition to a terminal status with a closing log entry.
    ///
    /// First-wins: returns `false` without writing anything when a
    /// concurrent finish already settled the record.
    pub async fn finish(
        &self,
        status: OperationStatus,
        data: serde_json::Value,
    ) -> OrchestrationResult<bool> {
        debug_assert!(status.is_terminal());

        if !self.store.set_operation_status(self.id, status).await? {
            // Lost the race. The cached status may name the wrong terminal
            // state, but stays terminal, which is all callers query.
            *self.status.lock().await = status;
            return Ok(false);
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            event: match status {
                OperationStatus::Error => "error".to_string(),
                _ => "success".to_string(),
            },
            data,
        };
        self.store.append_operation_log(self.id, entry).await?;
        *self.status.lock().await = status;

        self.emit(Event::OperationFinished {
            operation_id: self.id,
            status,
        })
        .await;
        Ok(true)
    }

    /// Best-effort send on the progress channel; a slow or absent consumer
    /// never blocks orchestration.
    pub async fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
