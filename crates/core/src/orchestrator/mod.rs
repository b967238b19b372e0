//! Analysis orchestrator: admission, supervision and cancellation of
//! result-generation jobs.
//!
//! `start_generate` validates preconditions, clears stale artifacts,
//! atomically admits exactly one running operation per job key and spawns
//! the supervision task; the caller gets the operation id back immediately.
//! The spawned task drives the stage chain (optional road-network export,
//! optional vector tiles, then always the analysis container) and settles
//! the operation's terminal status. `abort` kills whichever sub-stage is
//! active and marks the operation failed.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::ops::OperationLog;
use crate::registry::ProcessRegistry;
use crate::stages::{
    run_stages, AnalysisRunner, ExportRoadNetwork, GenerateVectorTiles, RunAnalysisContainer,
    ServiceRunner, Stage, StageContext, TileGenerator,
};
use crate::store::{BlobStore, RecordStore};
use ram_protocol::ipc::Event;
use ram_protocol::job_models::JobKey;
use ram_protocol::operation_models::{OperationStatus, OP_GENERATE_ANALYSIS};
use ram_protocol::scenario_models::{
    ProjectStatus, RESULT_FILE_KINDS, SETTING_RES_GEN_AT, SETTING_RN_ACTIVE_EDITING,
    SETTING_RN_UPDATED_AT,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Orchestrates result-generation jobs. Cloning shares all state; the
/// supervision task runs on a clone of the orchestrator that admitted it.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    exporter: Arc<dyn ServiceRunner>,
    tiles: Arc<dyn TileGenerator>,
    analysis: Arc<dyn AnalysisRunner>,
    registry: ProcessRegistry,
    events: Sender<Event>,
}

impl AnalysisOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        exporter: Arc<dyn ServiceRunner>,
        tiles: Arc<dyn TileGenerator>,
        analysis: Arc<dyn AnalysisRunner>,
        registry: ProcessRegistry,
        events: Sender<Event>,
    ) -> Self {
        Self {
            records,
            blobs,
            exporter,
            tiles,
            analysis,
            registry,
            events,
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Admit and launch a result-generation job for `key`.
    ///
    /// Validates the project/scenario preconditions, deletes stale result
    /// artifacts, atomically inserts the running operation record and
    /// spawns the supervision task. Returns the new operation's id.
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::DataConflict`] when a generation is already
    ///   running for the key, the project is not active, or the scenario
    ///   has no admin areas.
    /// - [`OrchestrationError::NotFound`] when the project or scenario does
    ///   not exist.
    pub async fn start_generate(&self, key: JobKey) -> OrchestrationResult<Uuid> {
        if let Some(latest) = self
            .records
            .latest_operation(OP_GENERATE_ANALYSIS, key.project_id, key.scenario_id)
            .await?
        {
            if latest.status == OperationStatus::Running {
                return Err(OrchestrationError::DataConflict(
                    "Result generation already running".to_string(),
                ));
            }
        }

        let project = self
            .records
            .get_project(key.project_id)
            .await?
            .ok_or_else(|| {
                OrchestrationError::NotFound(format!("Project {} not found", key.project_id))
            })?;
        if project.status != ProjectStatus::Active {
            return Err(OrchestrationError::DataConflict(format!(
                "Project {} is not active",
                key.project_id
            )));
        }

        let scenario = self
            .records
            .get_scenario(key.project_id, key.scenario_id)
            .await?
            .ok_or_else(|| {
                OrchestrationError::NotFound(format!("Scenario {} not found", key.scenario_id))
            })?;
        if scenario.admin_areas.is_empty() {
            return Err(OrchestrationError::DataConflict(format!(
                "Scenario {} has no admin areas selected",
                key.scenario_id
            )));
        }

        self.delete_stale_results(key).await?;

        // Atomic admission: the record insert is the single-flight gate, so
        // two concurrent starts that both pass the checks above cannot both
        // get here with a running record.
        let op = OperationLog::start(
            self.records.clone(),
            Some(self.events.clone()),
            OP_GENERATE_ANALYSIS,
            key,
        )
        .await
        .map_err(|e| match e {
            OrchestrationError::AlreadyRunning => OrchestrationError::DataConflict(
                "Result generation already running".to_string(),
            ),
            other => other,
        })?;
        op.log(
            "start",
            json!({ "projId": key.project_id, "scId": key.scenario_id }),
        )
        .await?;

        let id = op.id();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.generate_results(Arc::new(op)).await;
        });
        Ok(id)
    }

    /// Abort the running generation for `key`.
    ///
    /// Kills the active sub-stage (export wins over tiles; otherwise the
    /// detached container is removed) and settles the operation as failed.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::DataConflict`] when no generation is running
    /// for the key; nothing is killed or written in that case.
    pub async fn abort(&self, key: JobKey) -> OrchestrationResult<()> {
        let op = OperationLog::load_by_data(
            self.records.clone(),
            Some(self.events.clone()),
            OP_GENERATE_ANALYSIS,
            key,
        )
        .await
        .map_err(|e| match e {
            OrchestrationError::NotFound(_) => not_running(),
            other => other,
        })?;
        if !op.is_started().await {
            return Err(not_running());
        }

        self.kill_active_stage(key).await;
        op.finish(
            OperationStatus::Error,
            json!({ "error": "Operation aborted" }),
        )
        .await?;
        Ok(())
    }

    /// Kill whichever sub-stage is currently active for `key`.
    ///
    /// Stage precedence mirrors execution order: an occupied `update_rn`
    /// slot wins over `gen_vt`; with neither occupied the container stage
    /// (if anything) is running and gets a detached forced removal.
    async fn kill_active_stage(&self, key: JobKey) {
        match self.registry.take_active(key).await {
            Some((slot, handle)) => {
                tracing::info!(%key, ?slot, "Killing active sub-stage");
                handle.kill();
            }
            None => {
                tracing::info!(%key, "No sub-stage registered; removing container");
                self.analysis.remove_detached(key);
            }
        }
    }

    /// Delete stale result artifacts (blobs best-effort, records firmly).
    async fn delete_stale_results(&self, key: JobKey) -> OrchestrationResult<()> {
        let stale = self
            .records
            .list_file_records(key.project_id, key.scenario_id, &RESULT_FILE_KINDS)
            .await?;
        if stale.is_empty() {
            return Ok(());
        }

        let mut deletions = JoinSet::new();
        for record in stale {
            let blobs = self.blobs.clone();
            let records = self.records.clone();
            deletions.spawn(async move {
                // A missing blob must not block regeneration.
                if let Err(e) = blobs.delete_blob(&record.path).await {
                    tracing::warn!(path = %record.path, error = %e, "Stale blob deletion failed");
                }
                records.delete_file_record(record.id).await
            });
        }
        while let Some(joined) = deletions.join_next().await {
            match joined {
                Ok(result) => result?,
                Err(e) => {
                    return Err(OrchestrationError::Service(format!(
                        "Artifact deletion task failed: {e}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Supervision task body: run the stage chain and settle the terminal
    /// status. Never propagates errors to the (detached) caller.
    async fn generate_results(&self, op: Arc<OperationLog>) {
        let key = op.key();
        if let Err(e) = self.run_job(op.clone()).await {
            tracing::error!(%key, error = %e, "Result generation failed");
            // An abort settles the operation concurrently; only the first
            // terminal transition wins.
            if !op.is_completed().await {
                if let Err(e) = op
                    .finish(OperationStatus::Error, json!({ "error": e.to_string() }))
                    .await
                {
                    tracing::error!(%key, error = %e, "Failed to record operation error");
                }
            }
        }
        // A kill mid-chain leaves the entry behind; the terminal stage's own
        // removal is a no-op by then.
        self.registry.remove(key).await;
    }

    async fn run_job(&self, op: Arc<OperationLog>) -> OrchestrationResult<()> {
        let key = op.key();
        let need_export = self.export_needed(key).await?;

        // Let the admission caller observe the running record before any
        // stage work begins.
        tokio::task::yield_now().await;

        let mut stages: Vec<Box<dyn Stage>> = Vec::new();
        if need_export {
            // The editing session holds the scenario lock; release it so the
            // export sees a consistent snapshot.
            self.records.release_scenario_handle(key).await?;
            stages.push(Box::new(ExportRoadNetwork::new(self.exporter.clone())));
            stages.push(Box::new(GenerateVectorTiles::new(self.tiles.clone())));
        }
        stages.push(Box::new(RunAnalysisContainer::new(self.analysis.clone())));

        let ctx = StageContext {
            key,
            op: op.clone(),
            registry: self.registry.clone(),
            records: self.records.clone(),
        };
        run_stages(&stages, &ctx).await?;

        if !op.is_completed().await {
            op.finish(OperationStatus::Completed, json!({})).await?;
        }
        Ok(())
    }

    /// Decide whether the road-network export/tiles stages are needed.
    async fn export_needed(&self, key: JobKey) -> OrchestrationResult<bool> {
        let active_editing = self
            .setting(key, SETTING_RN_ACTIVE_EDITING)
            .await?
            .map(|v| v == "true")
            .unwrap_or(false);
        let generated_at = parse_millis(self.setting(key, SETTING_RES_GEN_AT).await?);
        let updated_at = parse_millis(self.setting(key, SETTING_RN_UPDATED_AT).await?);
        Ok(export_needed(active_editing, generated_at, updated_at))
    }

    async fn setting(&self, key: JobKey, name: &str) -> OrchestrationResult<Option<String>> {
        self.records
            .get_scenario_setting(key.project_id, key.scenario_id, name)
            .await
    }
}

fn not_running() -> OrchestrationError {
    OrchestrationError::DataConflict("Result generation not running".to_string())
}

/// Export freshness rule.
///
/// Without an active editing session the stored network is authoritative
/// and never re-exported. With one, export when results have never been
/// generated, or when the network changed after the last generation. A
/// recorded generation with no network timestamp means nothing changed.
fn export_needed(
    active_editing: bool,
    generated_at: Option<i64>,
    updated_at: Option<i64>,
) -> bool {
    if !active_editing {
        return false;
    }
    match (generated_at, updated_at) {
        (None, _) => true,
        (Some(generated), Some(updated)) => updated > generated,
        (Some(_), None) => false,
    }
}

/// Millisecond-timestamp settings treat absent, unparsable and `"0"`
/// values as unset.
fn parse_millis(value: Option<String>) -> Option<i64> {
    value
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|&millis| millis != 0)
}
