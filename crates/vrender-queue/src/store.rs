//! Authoritative in-memory job table.
//!
//! State is process-local and lost on restart. Every mutation goes through
//! one lock so a merge is never observed half-applied.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use vrender_models::{Job, JobId, JobStatus, JobUpdate, RenderSpec};

use crate::error::{QueueError, QueueResult};

/// Job counts per status.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// In-memory job store.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending job and return its fresh identifier.
    pub async fn create(&self, payload: RenderSpec, owner_id: &str) -> JobId {
        let mut jobs = self.jobs.write().await;
        let mut id = JobId::new();
        while jobs.contains_key(&id) {
            id = JobId::new();
        }
        jobs.insert(id.clone(), Job::new(id.clone(), owner_id, payload));
        debug!(job_id = %id, user_id = %owner_id, "Created job");
        id
    }

    /// Snapshot of a job.
    pub async fn get(&self, job_id: &JobId) -> QueueResult<Job> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::not_found(job_id))
    }

    /// Merge fields into a job and return the updated snapshot.
    ///
    /// Rejected transitions leave the record untouched.
    pub async fn update(&self, job_id: &JobId, update: JobUpdate) -> QueueResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::not_found(job_id))?;

        let mut next = job.clone();
        next.apply(update)?;
        *job = next;
        Ok(job.clone())
    }

    /// Remove terminal jobs finished more than `max_age` ago.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now().checked_sub_signed(max_age);

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            let expired = match (job.completed_at, cutoff) {
                (Some(done), Some(cutoff)) => job.is_terminal() && done <= cutoff,
                _ => false,
            };
            !expired
        });
        let removed = before - jobs.len();
        if removed > 0 {
            info!("Swept {} finished jobs ({} remaining)", removed, jobs.len());
        }
        removed
    }

    /// All jobs owned by `user_id`, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn counts(&self) -> StatusCounts {
        let jobs = self.jobs.read().await;
        let mut counts = StatusCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    #[cfg(test)]
    async fn backdate_completion(&self, job_id: &JobId, by: Duration) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            let by = chrono::Duration::from_std(by).unwrap();
            job.completed_at = job.completed_at.map(|t| t - by);
        }
    }
}
