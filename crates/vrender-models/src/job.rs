//! Render job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::RenderSpec;

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a render job.
///
/// Jobs only move forward: `pending -> processing -> {completed|failed|cancelled}`,
/// and a pending job may be cancelled before it is ever dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the fair queue
    #[default]
    Pending,
    /// Dispatched to the external renderer
    Processing,
    /// Render finished and produced an artifact
    Completed,
    /// Render failed
    Failed,
    /// Cancelled by the owner
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` follows the allowed graph.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job is already {0}")]
    AlreadyTerminal(JobStatus),

    #[error("invalid transition from {from} to {to}")]
    Invalid { from: JobStatus, to: JobStatus },
}

/// Partial set of fields merged into a stored job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub cost: Option<f64>,
}

impl JobUpdate {
    /// Move the job to processing.
    pub fn processing() -> Self {
        Self {
            status: Some(JobStatus::Processing),
            ..Default::default()
        }
    }

    /// Report render progress only.
    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    /// Mark completed with an artifact location and cost.
    pub fn completed(result: impl Into<String>, cost: Option<f64>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            result: Some(result.into()),
            cost,
            ..Default::default()
        }
    }

    /// Mark failed with a user-facing message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Mark cancelled.
    pub fn cancelled() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            ..Default::default()
        }
    }
}

/// A render job tracked by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Owning user, fixed at creation
    pub user_id: String,

    /// Current state
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Render specification, opaque to the scheduler
    pub payload: RenderSpec,

    /// Artifact location (completed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Failure explanation (failed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// External render cost in USD (completed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,

    /// Submission timestamp
    pub created_at: DateTime<Utc>,

    /// Dispatch timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set on any terminal transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Set when a cancel request was accepted
    #[serde(default)]
    pub cancelled: bool,
}

impl Job {
    /// Create a new pending job.
    pub fn new(id: JobId, user_id: impl Into<String>, payload: RenderSpec) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            status: JobStatus::Pending,
            progress: 0,
            payload,
            result: None,
            error: None,
            cost: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cancelled: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge an update into this job.
    ///
    /// Terminal jobs reject every update. Progress never decreases, result and
    /// cost only stick on completion, and the error only sticks on failure.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self.status));
        }

        let next = update.status.unwrap_or(self.status);
        if next != self.status && !self.status.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        if next != self.status {
            match next {
                JobStatus::Processing => self.started_at = Some(now),
                JobStatus::Cancelled => {
                    self.cancelled = true;
                    self.completed_at = Some(now);
                }
                JobStatus::Completed | JobStatus::Failed => self.completed_at = Some(now),
                JobStatus::Pending => {}
            }
            self.status = next;
        }

        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }

        match next {
            JobStatus::Completed => {
                self.progress = 100;
                if update.result.is_some() {
                    self.result = update.result;
                }
                if update.cost.is_some() {
                    self.cost = update.cost;
                }
            }
            JobStatus::Failed => {
                if update.error.is_some() {
                    self.error = update.error;
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Project name used for artifact file names.
    pub fn project_name(&self) -> Option<&str> {
        self.payload.project_name.as_deref()
    }
}
