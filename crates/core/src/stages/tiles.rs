//! Vector-tile generation stage.
//!
//! Looks up the scenario's exported road-network file and hands it to the
//! tile-generation capability, which reports progress straight into the
//! operation log. The returned job exposes a completion future and a kill
//! capability; the registry's `gen_vt` slot holds the handle and is
//! cleared on completion regardless of outcome.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::ops::OperationLog;
use crate::registry::{StageHandle, StageSlot};
use crate::stages::{Stage, StageContext};
use async_trait::async_trait;
use ram_protocol::scenario_models::FILE_ROAD_NETWORK;
use std::sync::Arc;
use tokio::sync::oneshot;

/// A running tile-generation job.
pub struct TilesJob {
    pub handle: StageHandle,
    pub done: oneshot::Receiver<Result<(), String>>,
}

/// Seam for the tile-generation capability.
#[async_trait]
pub trait TileGenerator: Send + Sync {
    /// Start generating tiles from the road-network file at `source_path`.
    ///
    /// The operation log is passed for progress logging.
    async fn generate(
        &self,
        op: Arc<OperationLog>,
        source_path: &str,
    ) -> OrchestrationResult<TilesJob>;
}

/// Stage: generate vector tiles from the exported road network.
pub struct GenerateVectorTiles {
    generator: Arc<dyn TileGenerator>,
}

impl GenerateVectorTiles {
    pub fn new(generator: Arc<dyn TileGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for GenerateVectorTiles {
    fn name(&self) -> &'static str {
        "generate-vector-tiles"
    }

    async fn run(&self, ctx: &StageContext) -> OrchestrationResult<()> {
        let records = ctx
            .records
            .list_file_records(ctx.key.project_id, ctx.key.scenario_id, &[FILE_ROAD_NETWORK])
            .await?;
        let source = records.first().ok_or_else(|| {
            OrchestrationError::NotFound(format!(
                "Road network file for {} not found",
                ctx.key
            ))
        })?;

        let job = self.generator.generate(ctx.op.clone(), &source.path).await?;

        ctx.registry
            .register(ctx.key, StageSlot::GenVt, job.handle)
            .await;

        let outcome = job.done.await;
        ctx.registry.clear(ctx.key, StageSlot::GenVt).await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(OrchestrationError::Service(message)),
            Err(_) => Err(OrchestrationError::Service(
                "Tile generation terminated without completing".to_string(),
            )),
        }
    }
}
