//! Sequential, cancellable sub-stages of a generation job.
//!
//! Stages are uniform: each exposes a name and a `run` that registers its
//! cancellable handle in the process registry, drives one external
//! process/service to completion, and clears its slot. The orchestrator
//! executes an ordered list of stage descriptors through [`run_stages`];
//! cancellation reduces to "take the active handle, kill it".

pub mod analysis;
pub mod export;
pub mod tiles;

use crate::error::OrchestrationResult;
use crate::ops::OperationLog;
use crate::registry::ProcessRegistry;
use crate::store::RecordStore;
use async_trait::async_trait;
use ram_protocol::ipc::Event;
use ram_protocol::job_models::JobKey;
use serde_json::json;
use std::sync::Arc;

pub use analysis::{AnalysisRunner, ContainerRunner, RunAnalysisContainer};
pub use export::{ExportRoadNetwork, ServiceInvocation, ServiceParams, ServiceRunner};
pub use tiles::{GenerateVectorTiles, TileGenerator, TilesJob};

/// Everything a stage needs to run.
pub struct StageContext {
    pub key: JobKey,
    pub op: Arc<OperationLog>,
    pub registry: ProcessRegistry,
    pub records: Arc<dyn RecordStore>,
}

/// One sequential unit of work delegated to an external process/service.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drive the stage to completion. An error here fails the whole run.
    async fn run(&self, ctx: &StageContext) -> OrchestrationResult<()>;
}

/// Execute stages strictly in sequence, failing fast on the first error.
pub async fn run_stages(stages: &[Box<dyn Stage>], ctx: &StageContext) -> OrchestrationResult<()> {
    for stage in stages {
        ctx.op.log("stage", json!({ "name": stage.name() })).await?;
        ctx.op
            .emit(Event::StageStarted {
                operation_id: ctx.op.id(),
                stage: stage.name().to_string(),
            })
            .await;

        stage.run(ctx).await?;

        ctx.op
            .emit(Event::StageCompleted {
                operation_id: ctx.op.id(),
                stage: stage.name().to_string(),
            })
            .await;
    }
    Ok(())
}
