//! Worker error types.

use thiserror::Error;
use vrender_models::JobStatus;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Render command not found: {0}")]
    CommandNotFound(String),

    #[error("Render command failed: {message}")]
    CommandFailed {
        message: String,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("Render timed out after {0} seconds")]
    Timeout(u64),

    #[error("Job is already {0}")]
    NotCancellable(JobStatus),

    #[error("Usage ledger write failed: {0}")]
    Ledger(String),

    #[error("Queue error: {0}")]
    Queue(#[from] vrender_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn command_failed(
        message: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::CommandFailed {
            message: message.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkerError::Queue(e) if e.is_not_found())
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self, WorkerError::Queue(vrender_queue::QueueError::QueueFull(_)))
    }
}
