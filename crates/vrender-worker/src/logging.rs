//! Structured job logging.

use tracing::{error, info, warn, Span};
use vrender_models::JobId;

/// Logs render lifecycle events with the job and owner attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    user_id: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, user_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            user_id: user_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, user_id = %self.user_id, "Render started: {}", message);
    }

    pub fn log_progress(&self, progress: u8) {
        info!(job_id = %self.job_id, progress, "Render progress");
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, user_id = %self.user_id, "Render warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, user_id = %self.user_id, "Render failed: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, user_id = %self.user_id, "Render completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span carrying the job context, for instrumenting the render future.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("render", job_id = %self.job_id, user_id = %self.user_id)
    }
}
