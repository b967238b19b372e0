//! Seeded stores and orchestrator harnesses.

use crate::common::stubs::{
    new_trace, AnalysisBehavior, StubAnalysisRunner, StubBehavior, StubServiceRunner,
    StubTileGenerator, Trace,
};
use ram_core::orchestrator::AnalysisOrchestrator;
use ram_core::registry::ProcessRegistry;
use ram_core::store::MemoryStore;
use ram_protocol::ipc::Event;
use ram_protocol::job_models::JobKey;
use ram_protocol::operation_models::Operation;
use ram_protocol::scenario_models::{
    FileRecord, Project, ProjectStatus, Scenario, FILE_ROAD_NETWORK, SETTING_RES_GEN_AT,
    SETTING_RN_ACTIVE_EDITING, SETTING_RN_UPDATED_AT,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const PROJECT_ID: u64 = 1;
pub const SCENARIO_ID: u64 = 2;

pub fn job_key() -> JobKey {
    JobKey::new(PROJECT_ID, SCENARIO_ID)
}

/// Seed an active project with a scenario that passes all admission checks.
///
/// `needs_export` controls the road-network freshness settings: when true,
/// an editing session is active and the network changed after the last
/// generation, so the export and tiles stages must run.
pub async fn seed_scenario(store: &MemoryStore, needs_export: bool) {
    store
        .insert_project(Project {
            id: PROJECT_ID,
            name: "Test project".to_string(),
            status: ProjectStatus::Active,
        })
        .await;
    store
        .insert_scenario(Scenario {
            id: SCENARIO_ID,
            project_id: PROJECT_ID,
            name: "Test scenario".to_string(),
            admin_areas: vec!["district-a".to_string()],
        })
        .await;

    let key = job_key();
    if needs_export {
        store
            .set_setting(key, SETTING_RN_ACTIVE_EDITING, "true")
            .await;
        store.set_setting(key, SETTING_RES_GEN_AT, "1000").await;
        store.set_setting(key, SETTING_RN_UPDATED_AT, "2000").await;
    } else {
        store
            .set_setting(key, SETTING_RN_ACTIVE_EDITING, "false")
            .await;
    }

    store
        .insert_file_record(FileRecord {
            id: 100,
            project_id: PROJECT_ID,
            scenario_id: SCENARIO_ID,
            kind: FILE_ROAD_NETWORK.to_string(),
            path: format!("scenario-{SCENARIO_ID}/road-network.osm"),
        })
        .await;
}

/// Everything an end-to-end test touches.
pub struct Harness {
    pub store: MemoryStore,
    pub orchestrator: AnalysisOrchestrator,
    pub events: mpsc::Receiver<Event>,
    pub trace: Trace,
    /// Keys forcibly removed via the detached container path.
    pub removed: Arc<Mutex<Vec<JobKey>>>,
    /// Road-network paths handed to the tile generator.
    pub tile_sources: Arc<Mutex<Vec<String>>>,
}

pub fn harness(
    store: MemoryStore,
    export: StubBehavior,
    tiles: StubBehavior,
    analysis: AnalysisBehavior,
) -> Harness {
    let trace = new_trace();
    let tile_sources = Arc::new(Mutex::new(Vec::new()));
    let analysis_runner = Arc::new(StubAnalysisRunner::new(analysis, trace.clone()));
    let removed = analysis_runner.removed.clone();
    let (events_tx, events) = mpsc::channel(64);

    let orchestrator = AnalysisOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(StubServiceRunner {
            behavior: export,
            trace: trace.clone(),
        }),
        Arc::new(StubTileGenerator {
            behavior: tiles,
            trace: trace.clone(),
            sources: tile_sources.clone(),
        }),
        analysis_runner,
        ProcessRegistry::new(),
        events_tx,
    );

    Harness {
        store,
        orchestrator,
        events,
        trace,
        removed,
        tile_sources,
    }
}

/// Poll until the operation reaches a terminal status.
pub async fn wait_for_terminal(store: &MemoryStore, id: Uuid) -> Operation {
    for _ in 0..400 {
        if let Some(op) = store.operation(id).await {
            if op.status.is_terminal() {
                return op;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Operation {id} did not reach a terminal status in time");
}

/// Poll until `condition` holds.
pub async fn wait_until<F, Fut>(description: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Timed out waiting for: {description}");
}
