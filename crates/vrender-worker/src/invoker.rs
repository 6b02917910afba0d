//! Render invocation through the external CLI.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use vrender_models::{JobId, RenderSpec};

use crate::classify::{classify_failure, ClassifiedFailure};
use crate::command::RenderCommand;
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::output::{parse_cost, parse_progress, parse_result_url};

/// Highest progress reported before the renderer has returned.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Receives progress percentages while a render runs.
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// Result of one render invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Completed { result: String, cost: Option<f64> },
    Failed(ClassifiedFailure),
}

/// Something that turns a render spec into an artifact.
#[async_trait]
pub trait RenderRunner: Send + Sync {
    async fn render(&self, job_id: &JobId, payload: &RenderSpec, progress: ProgressSink)
        -> RenderOutcome;

    /// Drop transient state of a cancelled job.
    async fn discard(&self, _job_id: &JobId) {}
}

/// Runs the Remotion Lambda CLI (or a configured replacement).
pub struct RenderInvoker {
    config: WorkerConfig,
}

impl RenderInvoker {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Path of the transient spec file for `job_id`.
    pub fn spec_path(&self, job_id: &JobId) -> PathBuf {
        self.config.work_dir.join(format!("{}.json", job_id))
    }

    fn build_command(&self, spec_path: &std::path::Path) -> Result<RenderCommand, ClassifiedFailure> {
        let serve_url = self
            .config
            .serve_url
            .as_deref()
            .ok_or_else(|| ClassifiedFailure::unknown("REMOTION_SERVE_URL is not configured"))?;
        let mut command = RenderCommand::from_parts(&self.config.render_command)
            .ok_or_else(|| ClassifiedFailure::unknown("render command is empty"))?
            .arg(serve_url)
            .arg(&self.config.composition)
            .arg(format!("--props={}", spec_path.display()))
            .arg(format!("--region={}", self.config.region))
            .with_timeout(self.config.render_timeout);

        if let Some(key) = &self.config.aws_access_key_id {
            command = command.env("REMOTION_AWS_ACCESS_KEY_ID", key);
        }
        if let Some(secret) = &self.config.aws_secret_access_key {
            command = command.env("REMOTION_AWS_SECRET_ACCESS_KEY", secret);
        }
        Ok(command)
    }

    async fn write_spec(&self, job_id: &JobId, payload: &RenderSpec) -> Result<PathBuf, WorkerError> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let path = self.spec_path(job_id);
        tokio::fs::write(&path, serde_json::to_vec_pretty(payload)?).await?;
        debug!(job_id = %job_id, "Wrote render spec to {}", path.display());
        Ok(path)
    }

    async fn remove_spec(&self, job_id: &JobId) {
        let path = self.spec_path(job_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(job_id = %job_id, "Failed to remove {}: {}", path.display(), e),
        }
    }

    async fn run(&self, job_id: &JobId, payload: &RenderSpec, progress: ProgressSink) -> RenderOutcome {
        let spec_path = match self.write_spec(job_id, payload).await {
            Ok(path) => path,
            Err(e) => {
                return RenderOutcome::Failed(ClassifiedFailure::unknown(format!(
                    "could not write render spec: {}",
                    e
                )))
            }
        };
        let command = match self.build_command(&spec_path) {
            Ok(command) => command,
            Err(failure) => return RenderOutcome::Failed(failure),
        };

        let on_line = move |line: &str| {
            if let Some(pct) = parse_progress(line) {
                progress(pct.min(MAX_RUNNING_PROGRESS));
            }
        };

        match command.run(on_line).await {
            Ok(output) => match parse_result_url(&output.stdout) {
                Some(result) => RenderOutcome::Completed {
                    cost: parse_cost(&output.stdout).or_else(|| parse_cost(&output.stderr)),
                    result,
                },
                None => RenderOutcome::Failed(classify_failure(&output.stderr, &output.stdout)),
            },
            Err(WorkerError::CommandFailed { stdout, stderr, .. }) => {
                RenderOutcome::Failed(classify_failure(&stderr, &stdout))
            }
            Err(WorkerError::Timeout(secs)) => RenderOutcome::Failed(ClassifiedFailure::timeout(secs)),
            Err(e) => RenderOutcome::Failed(ClassifiedFailure::unknown(e)),
        }
    }
}

#[async_trait]
impl RenderRunner for RenderInvoker {
    async fn render(
        &self,
        job_id: &JobId,
        payload: &RenderSpec,
        progress: ProgressSink,
    ) -> RenderOutcome {
        let outcome = self.run(job_id, payload, progress).await;
        self.remove_spec(job_id).await;
        outcome
    }

    async fn discard(&self, job_id: &JobId) {
        self.remove_spec(job_id).await;
    }
}
