//! Road-network export stage.
//!
//! Wraps an external service invocation named `export-road-network`. The
//! service emits exactly one completion signal per invocation; the stage
//! holds the registry's `update_rn` slot for the duration and clears it on
//! that signal.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::registry::{StageHandle, StageSlot};
use crate::stages::{Stage, StageContext};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Name of the external export service invocation.
pub const EXPORT_ROAD_NETWORK: &str = "export-road-network";

/// Parameters passed to a service invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceParams {
    pub project_id: u64,
    pub scenario_id: u64,
    pub operation_id: Uuid,
}

/// A started service invocation.
///
/// `handle` kills the invocation; `done` resolves with the single
/// completion signal, carrying the service's error message if it failed.
pub struct ServiceInvocation {
    pub handle: StageHandle,
    pub done: oneshot::Receiver<Result<(), String>>,
}

/// Seam for the external service runner that hosts named invocations.
#[async_trait]
pub trait ServiceRunner: Send + Sync {
    /// Start a named service invocation.
    async fn start(
        &self,
        service: &str,
        params: ServiceParams,
    ) -> OrchestrationResult<ServiceInvocation>;
}

/// Stage: export the scenario's road network via the external service.
pub struct ExportRoadNetwork {
    runner: Arc<dyn ServiceRunner>,
}

impl ExportRoadNetwork {
    pub fn new(runner: Arc<dyn ServiceRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Stage for ExportRoadNetwork {
    fn name(&self) -> &'static str {
        EXPORT_ROAD_NETWORK
    }

    async fn run(&self, ctx: &StageContext) -> OrchestrationResult<()> {
        let params = ServiceParams {
            project_id: ctx.key.project_id,
            scenario_id: ctx.key.scenario_id,
            operation_id: ctx.op.id(),
        };
        let invocation = self.runner.start(EXPORT_ROAD_NETWORK, params).await?;

        ctx.registry
            .register(ctx.key, StageSlot::UpdateRn, invocation.handle)
            .await;

        let outcome = invocation.done.await;
        ctx.registry.clear(ctx.key, StageSlot::UpdateRn).await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(OrchestrationError::Service(message)),
            // Sender dropped without signaling: treat as a failed invocation.
            Err(_) => Err(OrchestrationError::Service(format!(
                "{EXPORT_ROAD_NETWORK} terminated without a completion signal"
            ))),
        }
    }
}
