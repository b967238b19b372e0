//! `ram-analysis`: run a scenario analysis job from the command line.
//!
//! Local runs drive the container stage only; the record and blob stores
//! are in-memory, and the road-network export service is not connected.

use clap::{Parser, Subcommand};
use colored::Colorize;
use ram_core::config::load_config;
use ram_core::error::{OrchestrationError, OrchestrationResult};
use ram_core::ops::OperationLog;
use ram_core::orchestrator::AnalysisOrchestrator;
use ram_core::registry::ProcessRegistry;
use ram_core::stages::{
    ContainerRunner, ServiceInvocation, ServiceParams, ServiceRunner, TileGenerator, TilesJob,
};
use ram_core::store::MemoryStore;
use ram_protocol::ipc::Event;
use ram_protocol::job_models::JobKey;
use ram_protocol::operation_models::OperationStatus;
use ram_protocol::scenario_models::{
    Project, ProjectStatus, Scenario, SETTING_RN_ACTIVE_EDITING,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "ram-analysis", version, about = "Scenario analysis job runner")]
struct Cli {
    /// Path to the analysis configuration file.
    #[arg(long, default_value = "analysis.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate analysis results for a scenario and stream progress.
    Generate {
        /// Project id.
        #[arg(long)]
        project: u64,

        /// Scenario id.
        #[arg(long)]
        scenario: u64,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate { project, scenario } => {
            generate(&cli.config, JobKey::new(project, scenario)).await
        }
    }
}

async fn generate(config_path: &PathBuf, key: JobKey) -> color_eyre::Result<()> {
    let config = load_config(config_path)?;

    let store = MemoryStore::new();
    seed(&store, key).await;

    let (events_tx, mut events) = mpsc::channel(256);
    let orchestrator = AnalysisOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(store),
        Arc::new(UnavailableServiceRunner),
        Arc::new(UnavailableTileGenerator),
        Arc::new(ContainerRunner::new(config)),
        ProcessRegistry::new(),
        events_tx,
    );

    let id = orchestrator.start_generate(key).await?;
    println!("{} operation {id} for {key}", "Started".green().bold());

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else { break };
                if let Some(status) = print_event(&event) {
                    return match status {
                        OperationStatus::Completed => {
                            println!("{}", "Generation completed".green().bold());
                            Ok(())
                        }
                        _ => Err(color_eyre::eyre::eyre!("Generation failed")),
                    };
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("{}", "Aborting...".yellow().bold());
                orchestrator.abort(key).await?;
            }
        }
    }
    Ok(())
}

/// Seed the in-memory store so the scenario passes admission. The stored
/// road network is treated as current, so only the container stage runs.
async fn seed(store: &MemoryStore, key: JobKey) {
    store
        .insert_project(Project {
            id: key.project_id,
            name: format!("Project {}", key.project_id),
            status: ProjectStatus::Active,
        })
        .await;
    store
        .insert_scenario(Scenario {
            id: key.scenario_id,
            project_id: key.project_id,
            name: format!("Scenario {}", key.scenario_id),
            admin_areas: vec!["all".to_string()],
        })
        .await;
    store
        .set_setting(key, SETTING_RN_ACTIVE_EDITING, "false")
        .await;
}

/// Print one progress event; returns the terminal status when finished.
fn print_event(event: &Event) -> Option<OperationStatus> {
    match event {
        Event::OperationStarted { .. } => {}
        Event::StageStarted { stage, .. } => {
            println!("{} {stage}", "stage".cyan().bold());
        }
        Event::StageCompleted { stage, .. } => {
            println!("{} {stage}", "done ".green());
        }
        Event::Log { event, data, .. } => match event.as_str() {
            "container-output" => {
                if let Some(line) = data["line"].as_str() {
                    println!("  {line}");
                }
            }
            "container-error" => {
                if let Some(line) = data["line"].as_str() {
                    eprintln!("  {}", line.red());
                }
            }
            _ => {}
        },
        Event::OperationFinished { status, .. } => return Some(*status),
    }
    None
}

/// Placeholder for the export service, which only exists in service
/// deployments. Unreachable as long as [`seed`] marks the network current.
struct UnavailableServiceRunner;

#[async_trait::async_trait]
impl ServiceRunner for UnavailableServiceRunner {
    async fn start(
        &self,
        service: &str,
        _params: ServiceParams,
    ) -> OrchestrationResult<ServiceInvocation> {
        Err(OrchestrationError::Service(format!(
            "Service {service} is not available in local runs"
        )))
    }
}

struct UnavailableTileGenerator;

#[async_trait::async_trait]
impl TileGenerator for UnavailableTileGenerator {
    async fn generate(
        &self,
        _op: Arc<OperationLog>,
        _source_path: &str,
    ) -> OrchestrationResult<TilesJob> {
        Err(OrchestrationError::Service(
            "Tile generation is not available in local runs".to_string(),
        ))
    }
}
