//! Scripted stand-ins for the orchestrator's external collaborators.
//!
//! Each stub records what it was asked to do into a shared trace so tests
//! can assert on stage ordering, and settles its completion channel
//! according to a scripted behavior.

use async_trait::async_trait;
use ram_core::error::{OrchestrationError, OrchestrationResult};
use ram_core::ops::OperationLog;
use ram_core::registry::StageHandle;
use ram_core::stages::{
    AnalysisRunner, ServiceInvocation, ServiceParams, ServiceRunner, StageContext, TileGenerator,
    TilesJob,
};
use ram_core::store::RecordStore;
use ram_protocol::job_models::JobKey;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Notify};

/// Ordered record of collaborator invocations across all stubs.
pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn new_trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn trace_snapshot(trace: &Trace) -> Vec<String> {
    trace.lock().expect("trace lock").clone()
}

fn record(trace: &Trace, entry: &str) {
    trace.lock().expect("trace lock").push(entry.to_string());
}

/// How a scripted sub-stage settles.
#[derive(Clone, Copy)]
pub enum StubBehavior {
    /// Signal success immediately.
    Success,
    /// Signal failure with this message.
    Fail(&'static str),
    /// Hold the completion channel open until the stage handle is killed,
    /// then drop it without signaling.
    BlockUntilKilled,
}

fn scripted_invocation(behavior: StubBehavior) -> ServiceInvocation {
    let (handle, mut cancel) = StageHandle::new();
    let (tx, done) = oneshot::channel();
    tokio::spawn(async move {
        match behavior {
            StubBehavior::Success => {
                let _ = tx.send(Ok(()));
            }
            StubBehavior::Fail(message) => {
                let _ = tx.send(Err(message.to_string()));
            }
            StubBehavior::BlockUntilKilled => {
                let _ = cancel.changed().await;
                drop(tx);
            }
        }
    });
    ServiceInvocation { handle, done }
}

pub struct StubServiceRunner {
    pub behavior: StubBehavior,
    pub trace: Trace,
}

#[async_trait]
impl ServiceRunner for StubServiceRunner {
    async fn start(
        &self,
        service: &str,
        _params: ServiceParams,
    ) -> OrchestrationResult<ServiceInvocation> {
        record(&self.trace, service);
        Ok(scripted_invocation(self.behavior))
    }
}

pub struct StubTileGenerator {
    pub behavior: StubBehavior,
    pub trace: Trace,
    /// Road-network paths the generator was handed.
    pub sources: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TileGenerator for StubTileGenerator {
    async fn generate(
        &self,
        _op: Arc<OperationLog>,
        source_path: &str,
    ) -> OrchestrationResult<TilesJob> {
        record(&self.trace, "generate-vector-tiles");
        self.sources
            .lock()
            .expect("sources lock")
            .push(source_path.to_string());
        let invocation = scripted_invocation(self.behavior);
        Ok(TilesJob {
            handle: invocation.handle,
            done: invocation.done,
        })
    }
}

/// How the scripted analysis container settles.
#[derive(Clone, Copy)]
pub enum AnalysisBehavior {
    Success,
    Fail { code: i32, stderr: &'static str },
    /// Block until `remove_detached` fires, then return cleanly.
    BlockUntilRemoved,
}

pub struct StubAnalysisRunner {
    pub behavior: AnalysisBehavior,
    pub trace: Trace,
    /// Keys handed to `remove_detached`.
    pub removed: Arc<Mutex<Vec<JobKey>>>,
    unblock: Arc<Notify>,
}

impl StubAnalysisRunner {
    pub fn new(behavior: AnalysisBehavior, trace: Trace) -> Self {
        Self {
            behavior,
            trace,
            removed: Arc::new(Mutex::new(Vec::new())),
            unblock: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl AnalysisRunner for StubAnalysisRunner {
    fn preflight(&self) -> OrchestrationResult<()> {
        Ok(())
    }

    async fn refresh_image(&self, _op: &OperationLog) {
        record(&self.trace, "image-refresh");
    }

    async fn run(&self, ctx: &StageContext) -> OrchestrationResult<()> {
        record(&self.trace, "run-analysis-container");
        match self.behavior {
            AnalysisBehavior::Success => Ok(()),
            AnalysisBehavior::Fail { code, stderr } => Err(OrchestrationError::ProcessFailure {
                code,
                stderr: stderr.to_string(),
            }),
            AnalysisBehavior::BlockUntilRemoved => {
                self.unblock.notified().await;
                // Forced removal comes from the abort path, which also
                // settles the record; wait for the store write so the
                // supervision task observes the terminal status.
                loop {
                    let latest = ctx
                        .records
                        .latest_operation(ctx.op.kind(), ctx.key.project_id, ctx.key.scenario_id)
                        .await?;
                    if latest.is_some_and(|op| op.status.is_terminal()) {
                        return Ok(());
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                }
            }
        }
    }

    fn remove_detached(&self, key: JobKey) {
        self.removed.lock().expect("removed lock").push(key);
        self.unblock.notify_one();
    }
}
