//! End-to-end orchestration flows against scripted collaborators.

mod common;

use common::fixtures::{harness, job_key, seed_scenario, wait_for_terminal, wait_until};
use common::stubs::{trace_snapshot, AnalysisBehavior, StubBehavior};
use ram_core::error::OrchestrationError;
use ram_core::store::MemoryStore;
use ram_protocol::ipc::Event;
use ram_protocol::operation_models::OperationStatus;
use ram_protocol::scenario_models::{FileRecord, Project, ProjectStatus, Scenario};

fn result_record(id: u64, kind: &str) -> FileRecord {
    FileRecord {
        id,
        project_id: 1,
        scenario_id: 2,
        kind: kind.to_string(),
        path: format!("scenario-2/{kind}"),
    }
}

#[tokio::test]
async fn test_analysis_only_run_completes() {
    let store = MemoryStore::new();
    seed_scenario(&store, false).await;
    let h = harness(
        store,
        StubBehavior::Success,
        StubBehavior::Success,
        AnalysisBehavior::Success,
    );

    let id = h.orchestrator.start_generate(job_key()).await.expect("start");
    let op = wait_for_terminal(&h.store, id).await;

    assert_eq!(op.status, OperationStatus::Completed);
    assert_eq!(
        trace_snapshot(&h.trace),
        vec!["image-refresh", "run-analysis-container"]
    );
    // Stored network untouched: no handle release without an export.
    assert!(h.store.released_handles().await.is_empty());

    let events: Vec<&str> = op.log.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(events, vec!["start", "stage", "success"]);
    assert_eq!(op.log[1].data["name"], "run-analysis-container");
}

#[tokio::test]
async fn test_stale_network_runs_all_three_stages_in_order() {
    let store = MemoryStore::new();
    seed_scenario(&store, true).await;
    let h = harness(
        store,
        StubBehavior::Success,
        StubBehavior::Success,
        AnalysisBehavior::Success,
    );

    let id = h.orchestrator.start_generate(job_key()).await.expect("start");
    let op = wait_for_terminal(&h.store, id).await;

    assert_eq!(op.status, OperationStatus::Completed);
    assert_eq!(
        trace_snapshot(&h.trace),
        vec![
            "export-road-network",
            "generate-vector-tiles",
            "image-refresh",
            "run-analysis-container",
        ]
    );
    // The scenario's database handle is released before the export spawns.
    assert_eq!(h.store.released_handles().await, vec![job_key()]);
    // Tiles were generated from the stored road-network file.
    assert_eq!(
        h.tile_sources.lock().expect("sources")[..],
        ["scenario-2/road-network.osm".to_string()]
    );
}

#[tokio::test]
async fn test_second_start_conflicts_while_running() {
    let store = MemoryStore::new();
    seed_scenario(&store, false).await;
    let h = harness(
        store,
        StubBehavior::Success,
        StubBehavior::Success,
        AnalysisBehavior::BlockUntilRemoved,
    );

    let _id = h.orchestrator.start_generate(job_key()).await.expect("start");

    let second = h.orchestrator.start_generate(job_key()).await;
    assert!(
        matches!(second, Err(OrchestrationError::DataConflict(ref msg)) if msg == "Result generation already running")
    );
}

#[tokio::test]
async fn test_start_rejects_bad_preconditions() {
    let store = MemoryStore::new();
    let h = harness(
        store.clone(),
        StubBehavior::Success,
        StubBehavior::Success,
        AnalysisBehavior::Success,
    );

    // Unknown project.
    let result = h.orchestrator.start_generate(job_key()).await;
    assert!(matches!(result, Err(OrchestrationError::NotFound(_))));

    // Pending project.
    store
        .insert_project(Project {
            id: 1,
            name: "p".to_string(),
            status: ProjectStatus::Pending,
        })
        .await;
    let result = h.orchestrator.start_generate(job_key()).await;
    assert!(matches!(result, Err(OrchestrationError::DataConflict(_))));

    // Active project, unknown scenario.
    store
        .insert_project(Project {
            id: 1,
            name: "p".to_string(),
            status: ProjectStatus::Active,
        })
        .await;
    let result = h.orchestrator.start_generate(job_key()).await;
    assert!(matches!(result, Err(OrchestrationError::NotFound(_))));

    // Scenario with no admin areas selected.
    store
        .insert_scenario(Scenario {
            id: 2,
            project_id: 1,
            name: "s".to_string(),
            admin_areas: Vec::new(),
        })
        .await;
    let result = h.orchestrator.start_generate(job_key()).await;
    assert!(matches!(result, Err(OrchestrationError::DataConflict(_))));
}

#[tokio::test]
async fn test_start_deletes_stale_result_artifacts() {
    let store = MemoryStore::new();
    seed_scenario(&store, false).await;
    store.insert_file_record(result_record(101, "results-csv")).await;
    store.insert_file_record(result_record(102, "results-json")).await;
    let h = harness(
        store,
        StubBehavior::Success,
        StubBehavior::Success,
        AnalysisBehavior::Success,
    );

    let id = h.orchestrator.start_generate(job_key()).await.expect("start");
    wait_for_terminal(&h.store, id).await;

    let mut deleted = h.store.deleted_blobs().await;
    deleted.sort();
    assert_eq!(
        deleted,
        vec![
            "scenario-2/results-csv".to_string(),
            "scenario-2/results-json".to_string(),
        ]
    );
    // Only the road-network record survives.
    assert_eq!(h.store.file_record_count().await, 1);
}

#[tokio::test]
async fn test_container_failure_marks_operation_error() {
    let store = MemoryStore::new();
    seed_scenario(&store, false).await;
    let h = harness(
        store,
        StubBehavior::Success,
        StubBehavior::Success,
        AnalysisBehavior::Fail {
            code: 3,
            stderr: "container blew up",
        },
    );

    let id = h.orchestrator.start_generate(job_key()).await.expect("start");
    let op = wait_for_terminal(&h.store, id).await;

    assert_eq!(op.status, OperationStatus::Error);
    let closing = op.log.last().expect("closing entry");
    assert_eq!(closing.event, "error");
    let message = closing.data["error"].as_str().expect("message");
    assert!(message.contains("code 3"));
    assert!(message.contains("container blew up"));
    assert!(!h.orchestrator.registry().contains(job_key()).await);
}

#[tokio::test]
async fn test_export_failure_skips_later_stages() {
    let store = MemoryStore::new();
    seed_scenario(&store, true).await;
    let h = harness(
        store,
        StubBehavior::Fail("export service failed"),
        StubBehavior::Success,
        AnalysisBehavior::Success,
    );

    let id = h.orchestrator.start_generate(job_key()).await.expect("start");
    let op = wait_for_terminal(&h.store, id).await;

    assert_eq!(op.status, OperationStatus::Error);
    assert_eq!(trace_snapshot(&h.trace), vec!["export-road-network"]);
    let closing = op.log.last().expect("closing entry");
    assert_eq!(closing.data["error"], "export service failed");
}

#[tokio::test]
async fn test_missing_road_network_file_fails_tiles_stage() {
    let store = MemoryStore::new();
    seed_scenario(&store, true).await;
    let h = harness(
        store,
        StubBehavior::Success,
        StubBehavior::Success,
        AnalysisBehavior::Success,
    );
    // Remove the seeded road-network record.
    use ram_core::store::RecordStore;
    h.store.delete_file_record(100).await.expect("delete");

    let id = h.orchestrator.start_generate(job_key()).await.expect("start");
    let op = wait_for_terminal(&h.store, id).await;

    assert_eq!(op.status, OperationStatus::Error);
    let closing = op.log.last().expect("closing entry");
    let message = closing.data["error"].as_str().expect("message");
    assert!(message.contains("Road network file"));
    // The analysis container was never reached.
    assert!(!trace_snapshot(&h.trace).contains(&"run-analysis-container".to_string()));
}

#[tokio::test]
async fn test_abort_without_running_operation_conflicts() {
    let store = MemoryStore::new();
    seed_scenario(&store, false).await;
    let h = harness(
        store,
        StubBehavior::Success,
        StubBehavior::Success,
        AnalysisBehavior::Success,
    );

    // No operation record at all.
    let result = h.orchestrator.abort(job_key()).await;
    assert!(
        matches!(result, Err(OrchestrationError::DataConflict(ref msg)) if msg == "Result generation not running")
    );

    // Terminal operation record.
    let id = h.orchestrator.start_generate(job_key()).await.expect("start");
    wait_for_terminal(&h.store, id).await;
    let result = h.orchestrator.abort(job_key()).await;
    assert!(matches!(result, Err(OrchestrationError::DataConflict(_))));

    // No kill side effects either way.
    assert!(h.removed.lock().expect("removed").is_empty());
}

#[tokio::test]
async fn test_abort_during_export_kills_export_and_stops_chain() {
    let store = MemoryStore::new();
    seed_scenario(&store, true).await;
    let h = harness(
        store,
        StubBehavior::BlockUntilKilled,
        StubBehavior::Success,
        AnalysisBehavior::Success,
    );

    let id = h.orchestrator.start_generate(job_key()).await.expect("start");

    let registry = h.orchestrator.registry().clone();
    wait_until("export stage registered", || {
        let registry = registry.clone();
        async move { registry.slot_state(job_key()).await.0 }
    })
    .await;

    h.orchestrator.abort(job_key()).await.expect("abort");
    let op = wait_for_terminal(&h.store, id).await;

    assert_eq!(op.status, OperationStatus::Error);
    // The abort and the killed stage's own failure race to settle the
    // record; exactly one closing entry wins either way.
    let closing = op.log.last().expect("closing entry");
    assert_eq!(closing.event, "error");
    // Neither tiles nor the container ran after the kill.
    assert_eq!(trace_snapshot(&h.trace), vec!["export-road-network"]);
    // Detached container removal was never needed.
    assert!(h.removed.lock().expect("removed").is_empty());
}

#[tokio::test]
async fn test_abort_during_tiles_kills_tiles_only() {
    let store = MemoryStore::new();
    seed_scenario(&store, true).await;
    let h = harness(
        store,
        StubBehavior::Success,
        StubBehavior::BlockUntilKilled,
        AnalysisBehavior::Success,
    );

    let id = h.orchestrator.start_generate(job_key()).await.expect("start");

    let registry = h.orchestrator.registry().clone();
    wait_until("tiles stage registered", || {
        let registry = registry.clone();
        async move { registry.slot_state(job_key()).await.1 }
    })
    .await;

    h.orchestrator.abort(job_key()).await.expect("abort");
    let op = wait_for_terminal(&h.store, id).await;

    assert_eq!(op.status, OperationStatus::Error);
    assert!(!trace_snapshot(&h.trace).contains(&"run-analysis-container".to_string()));
    assert!(h.removed.lock().expect("removed").is_empty());

    wait_until("registry entry cleaned up", || {
        let registry = registry.clone();
        async move { !registry.contains(job_key()).await }
    })
    .await;
}

#[tokio::test]
async fn test_abort_during_container_removes_it_detached() {
    let store = MemoryStore::new();
    seed_scenario(&store, false).await;
    let h = harness(
        store,
        StubBehavior::Success,
        StubBehavior::Success,
        AnalysisBehavior::BlockUntilRemoved,
    );

    let id = h.orchestrator.start_generate(job_key()).await.expect("start");

    let trace = h.trace.clone();
    wait_until("container stage running", || {
        let trace = trace.clone();
        async move { trace_snapshot(&trace).contains(&"run-analysis-container".to_string()) }
    })
    .await;

    h.orchestrator.abort(job_key()).await.expect("abort");
    let op = wait_for_terminal(&h.store, id).await;

    assert_eq!(op.status, OperationStatus::Error);
    let closing = op.log.last().expect("closing entry");
    assert_eq!(closing.data["error"], "Operation aborted");
    assert_eq!(h.removed.lock().expect("removed")[..], [job_key()]);
}

#[tokio::test]
async fn test_events_stream_mirrors_run() {
    let store = MemoryStore::new();
    seed_scenario(&store, false).await;
    let mut h = harness(
        store,
        StubBehavior::Success,
        StubBehavior::Success,
        AnalysisBehavior::Success,
    );

    let id = h.orchestrator.start_generate(job_key()).await.expect("start");
    wait_for_terminal(&h.store, id).await;

    let mut events = Vec::new();
    loop {
        let event = h.events.recv().await.expect("event");
        let finished = matches!(event, Event::OperationFinished { .. });
        events.push(event);
        if finished {
            break;
        }
    }

    assert!(
        matches!(&events[0], Event::OperationStarted { operation_id, key } if *operation_id == id && *key == job_key())
    );
    assert!(events.iter().any(
        |e| matches!(e, Event::StageStarted { stage, .. } if stage == "run-analysis-container")
    ));
    assert!(events.iter().any(
        |e| matches!(e, Event::StageCompleted { stage, .. } if stage == "run-analysis-container")
    ));
    assert!(matches!(
        events.last(),
        Some(Event::OperationFinished {
            status: OperationStatus::Completed,
            ..
        })
    ));
}
