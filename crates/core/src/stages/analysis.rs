//! Analysis container stage.
//!
//! The terminal stage of every run. Two phases: a best-effort image
//! refresh, then the spawn of the analysis container under a deterministic
//! name so the infrastructure itself enforces at most one instance per job
//! key. Child stdout/stderr stream into the operation log line-by-line as
//! they arrive; a nonzero exit code fails the run with the captured
//! stderr. The registry entry for the key is removed when this stage
//! exits, whatever the outcome.

use crate::config::AnalysisConfig;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::ops::OperationLog;
use crate::stages::{Stage, StageContext};
use async_trait::async_trait;
use ram_protocol::job_models::JobKey;
use serde_json::json;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

/// Seam for the container-backed analysis worker.
#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    /// Cheap configuration check, run before any spawn attempt.
    fn preflight(&self) -> OrchestrationResult<()>;

    /// Best-effort image refresh; failures are logged and swallowed.
    async fn refresh_image(&self, op: &OperationLog);

    /// Spawn and supervise the analysis process to completion.
    async fn run(&self, ctx: &StageContext) -> OrchestrationResult<()>;

    /// Fire-and-forget forced removal of the job's container. Used by the
    /// cancellation path when the container stage is the active one.
    fn remove_detached(&self, key: JobKey);
}

/// Stage: run the analysis container to completion.
pub struct RunAnalysisContainer {
    runner: Arc<dyn AnalysisRunner>,
}

impl RunAnalysisContainer {
    pub fn new(runner: Arc<dyn AnalysisRunner>) -> Self {
        Self { runner }
    }

    async fn execute(&self, ctx: &StageContext) -> OrchestrationResult<()> {
        self.runner.preflight()?;
        self.runner.refresh_image(&ctx.op).await;
        self.runner.run(ctx).await
    }
}

#[async_trait]
impl Stage for RunAnalysisContainer {
    fn name(&self) -> &'static str {
        "run-analysis-container"
    }

    async fn run(&self, ctx: &StageContext) -> OrchestrationResult<()> {
        let result = self.execute(ctx).await;
        // Terminal stage: the registry entry's lifetime ends here.
        ctx.registry.remove(ctx.key).await;
        result
    }
}

/// Production [`AnalysisRunner`] shelling out to the configured container
/// service binary (`docker` or `hyper`).
pub struct ContainerRunner {
    config: AnalysisConfig,
}

impl ContainerRunner {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Deterministic container name for a job key.
    pub fn container_name(&self, key: JobKey) -> String {
        format!(
            "{}-analysisp{}s{}",
            self.config.instance_id, key.project_id, key.scenario_id
        )
    }

    /// Environment contract handed to the analysis container, in the order
    /// the container documentation lists it.
    fn spawn_env(&self, key: JobKey, operation_id: Uuid) -> Vec<(String, String)> {
        let storage = &self.config.storage;
        vec![
            ("DB_URI".to_string(), self.config.db_uri.clone()),
            ("PROJECT_ID".to_string(), key.project_id.to_string()),
            ("SCENARIO_ID".to_string(), key.scenario_id.to_string()),
            ("OPERATION_ID".to_string(), operation_id.to_string()),
            ("STORAGE_HOST".to_string(), storage.host.clone()),
            ("STORAGE_PORT".to_string(), storage.port.to_string()),
            ("STORAGE_ENGINE".to_string(), storage.engine.clone()),
            ("STORAGE_ACCESS_KEY".to_string(), storage.access_key.clone()),
            ("STORAGE_SECRET_KEY".to_string(), storage.secret_key.clone()),
            ("STORAGE_BUCKET".to_string(), storage.bucket.clone()),
            ("STORAGE_REGION".to_string(), storage.region.clone()),
            ("CONVERSION_DIR".to_string(), "/conversion".to_string()),
        ]
    }

    /// Build the full argument list for the `run` invocation.
    ///
    /// # Errors
    ///
    /// `Configuration` for an unsupported service name or a `hyper`
    /// backend without credentials. Checked before any spawn attempt.
    pub fn build_run_args(&self, key: JobKey, operation_id: Uuid) -> OrchestrationResult<Vec<String>> {
        let name = self.container_name(key);
        let mut args: Vec<String> = vec!["run".to_string(), "--name".to_string(), name];

        match self.config.service.as_str() {
            "docker" => {
                args.push("--network".to_string());
                args.push("ram".to_string());
                // Names are deterministic per key; a finished container must
                // free its name before the next run.
                args.push("--rm".to_string());
            }
            "hyper" => {
                let hyper = self.hyper_config()?;
                if let Some(size) = &hyper.size {
                    args.push("--size".to_string());
                    args.push(size.clone());
                }
            }
            other => {
                return Err(OrchestrationError::Configuration(format!(
                    "Unsupported container service '{other}'"
                )));
            }
        }

        for (name, value) in self.spawn_env(key, operation_id) {
            args.push("-e".to_string());
            args.push(format!("{name}={value}"));
        }
        args.push(self.config.container.clone());
        Ok(args)
    }

    fn hyper_config(&self) -> OrchestrationResult<&crate::config::HyperConfig> {
        self.config.hyper.as_ref().ok_or_else(|| {
            OrchestrationError::Configuration(
                "hyper service requires access and secret credentials".to_string(),
            )
        })
    }

    /// Environment for the service binary itself (not the container).
    fn process_env(&self) -> Vec<(String, String)> {
        match (self.config.service.as_str(), &self.config.hyper) {
            ("hyper", Some(hyper)) => vec![
                ("HYPER_ACCESS_KEY".to_string(), hyper.access_key.clone()),
                ("HYPER_SECRET_KEY".to_string(), hyper.secret_key.clone()),
            ],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl AnalysisRunner for ContainerRunner {
    fn preflight(&self) -> OrchestrationResult<()> {
        match self.config.service.as_str() {
            "docker" => Ok(()),
            "hyper" => self.hyper_config().map(|_| ()),
            other => Err(OrchestrationError::Configuration(format!(
                "Unsupported container service '{other}'"
            ))),
        }
    }

    async fn refresh_image(&self, op: &OperationLog) {
        let binary = self.config.service_binary();
        let image = &self.config.container;
        let mut cmd = Command::new(binary);
        cmd.args(["pull", image]);
        for (name, value) in self.process_env() {
            cmd.env(name, value);
        }

        // Non-zero exit or spawn failure means we continue with a
        // possibly-stale image.
        match cmd.output().await {
            Ok(output) if output.status.success() => {
                let _ = op.log("image-refresh", json!({ "image": image })).await;
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                tracing::warn!(image = %image, stderr = %stderr, "Image refresh failed");
                let _ = op
                    .log("image-refresh-failed", json!({ "stderr": stderr }))
                    .await;
            }
            Err(e) => {
                tracing::warn!(image = %image, error = %e, "Image refresh failed");
                let _ = op
                    .log("image-refresh-failed", json!({ "error": e.to_string() }))
                    .await;
            }
        }
    }

    async fn run(&self, ctx: &StageContext) -> OrchestrationResult<()> {
        let args = self.build_run_args(ctx.key, ctx.op.id())?;
        let binary = self.config.service_binary().to_string();
        which::which(&binary).map_err(|_| {
            OrchestrationError::Configuration(format!(
                "Container service binary '{binary}' not found"
            ))
        })?;

        let mut cmd = Command::new(&binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (name, value) in self.process_env() {
            cmd.env(name, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            OrchestrationError::Service(format!("Failed to spawn '{binary}': {e}"))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            OrchestrationError::Service("Failed to capture analysis stdout".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            OrchestrationError::Service("Failed to capture analysis stderr".to_string())
        })?;

        // Stream output into the operation log without blocking the wait.
        let op = ctx.op.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = line_stream(stdout);
            while let Some(line) = lines.next().await {
                let _ = op.log("container-output", json!({ "line": line })).await;
            }
        });

        let op = ctx.op.clone();
        let stderr_task = tokio::spawn(async move {
            let mut captured = String::new();
            let mut lines = line_stream(stderr);
            while let Some(line) = lines.next().await {
                let _ = op.log("container-error", json!({ "line": line })).await;
                captured.push_str(&line);
                captured.push('\n');
            }
            captured
        });

        let status = child.wait().await.map_err(|e| {
            OrchestrationError::Service(format!("Failed to wait for analysis process: {e}"))
        })?;

        let _ = stdout_task.await;
        let captured_stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(OrchestrationError::ProcessFailure {
                code: status.code().unwrap_or(-1),
                stderr: captured_stderr.trim().to_string(),
            })
        }
    }

    fn remove_detached(&self, key: JobKey) {
        let binary = self.config.service_binary().to_string();
        let name = self.container_name(key);
        let env = self.process_env();
        tokio::spawn(async move {
            let mut cmd = Command::new(&binary);
            cmd.args(["rm", "-f", &name]);
            for (k, v) in env {
                cmd.env(k, v);
            }
            match cmd.output().await {
                Ok(output) if output.status.success() => {}
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    tracing::warn!(container = %name, stderr = %stderr, "Forced container removal failed");
                }
                Err(e) => {
                    tracing::warn!(container = %name, error = %e, "Forced container removal failed");
                }
            }
        });
    }
}

/// Line-by-line stream over a child pipe. Empty lines are skipped.
fn line_stream<R>(reader: R) -> Pin<Box<dyn Stream<Item = String> + Send>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    Box::pin(async_stream::stream! {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            yield line;
        }
    })
}
