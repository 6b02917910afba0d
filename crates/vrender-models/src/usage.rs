//! Render usage records for the cost ledger.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// One completed render, as written to the analytics sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub user_id: String,
    pub job_id: JobId,
    /// Render cost in USD
    pub cost: f64,
    /// Rendered duration in milliseconds
    pub duration_ms: f64,
    pub platform: String,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Build a record from a completed job; `None` if the job carries no cost.
    pub fn from_job(job: &Job) -> Option<Self> {
        let cost = job.cost?;
        Some(Self {
            user_id: job.user_id.clone(),
            job_id: job.id.clone(),
            cost,
            duration_ms: job.payload.duration.unwrap_or_default(),
            platform: job.payload.platform.name.clone(),
            created_at: job.completed_at.unwrap_or_else(Utc::now),
        })
    }
}
