//! Queue error types.

use thiserror::Error;
use vrender_models::{JobId, TransitionError};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Queue is full ({0} jobs waiting)")]
    QueueFull(usize),

    #[error("Job already queued: {0}")]
    AlreadyQueued(JobId),

    #[error("Invalid job transition: {0}")]
    Transition(#[from] TransitionError),
}

impl QueueError {
    pub fn not_found(job_id: &JobId) -> Self {
        Self::JobNotFound(job_id.clone())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::JobNotFound(_))
    }
}
