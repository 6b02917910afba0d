//! Fair scheduling of pending renders across users.
//!
//! Selection is not FIFO: among waiting jobs whose owner is below the
//! per-user ceiling, the job of the owner with the fewest active renders
//! wins, and ties go to the earliest queue position. Each selection is a
//! linear scan of the waiting list; the list is bounded by
//! `max_queue_length`.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use vrender_models::JobId;

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};

/// A waiting job and its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub user_id: String,
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: usize,
    pub active: usize,
    pub max_concurrent: usize,
    pub max_per_user: usize,
    pub active_users: usize,
}

/// Waiting list plus global and per-user active counters.
#[derive(Debug)]
pub struct FairQueue {
    pending: VecDeque<QueuedJob>,
    active_by_user: HashMap<String, usize>,
    active: usize,
    max_concurrent: usize,
    max_per_user: usize,
    max_queue_length: usize,
}

impl FairQueue {
    pub fn new(max_concurrent: usize, max_per_user: usize, max_queue_length: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            active_by_user: HashMap::new(),
            active: 0,
            max_concurrent: max_concurrent.max(1),
            max_per_user: max_per_user.max(1),
            max_queue_length,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.max_concurrent,
            config.max_per_user,
            config.max_queue_length,
        )
    }

    /// Append a job; returns its zero-based position.
    pub fn push(&mut self, job_id: JobId, user_id: impl Into<String>) -> QueueResult<usize> {
        if self.is_full() {
            return Err(QueueError::QueueFull(self.pending.len()));
        }
        if self.pending.iter().any(|q| q.job_id == job_id) {
            return Err(QueueError::AlreadyQueued(job_id));
        }
        self.pending.push_back(QueuedJob {
            job_id,
            user_id: user_id.into(),
        });
        Ok(self.pending.len() - 1)
    }

    /// Pick the next job to dispatch and count it as active.
    ///
    /// Returns `None` when the global ceiling is reached, the queue is empty,
    /// or every waiting owner is already at the per-user ceiling.
    pub fn select_next(&mut self) -> Option<QueuedJob> {
        if self.active >= self.max_concurrent || self.pending.is_empty() {
            return None;
        }

        let mut best: Option<(usize, usize)> = None;
        for (index, queued) in self.pending.iter().enumerate() {
            let active = self.active_for(&queued.user_id);
            if active >= self.max_per_user {
                continue;
            }
            if best.map_or(true, |(_, fewest)| active < fewest) {
                best = Some((index, active));
                if active == 0 {
                    break;
                }
            }
        }

        let (index, _) = best?;
        let selected = self.pending.remove(index)?;
        self.active += 1;
        *self
            .active_by_user
            .entry(selected.user_id.clone())
            .or_insert(0) += 1;
        Some(selected)
    }

    /// Release the slot held by a dispatched job of `user_id`.
    pub fn release(&mut self, user_id: &str) {
        self.active = self.active.saturating_sub(1);
        if let Some(count) = self.active_by_user.get_mut(user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.active_by_user.remove(user_id);
            }
        }
    }

    /// Drop a waiting job; `false` if it was not waiting.
    pub fn remove(&mut self, job_id: &JobId) -> bool {
        match self.pending.iter().position(|q| &q.job_id == job_id) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Zero-based position of a waiting job.
    pub fn position(&self, job_id: &JobId) -> Option<usize> {
        self.pending.iter().position(|q| &q.job_id == job_id)
    }

    /// Positions of every waiting job owned by `user_id`.
    pub fn positions_for(&self, user_id: &str) -> Vec<(JobId, usize)> {
        self.pending
            .iter()
            .enumerate()
            .filter(|(_, q)| q.user_id == user_id)
            .map(|(index, q)| (q.job_id.clone(), index))
            .collect()
    }

    /// Whether a further `push` would be rejected for capacity.
    pub fn is_full(&self) -> bool {
        self.max_queue_length > 0 && self.pending.len() >= self.max_queue_length
    }

    pub fn active_for(&self, user_id: &str) -> usize {
        self.active_by_user.get(user_id).copied().unwrap_or(0)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.len(),
            active: self.active,
            max_concurrent: self.max_concurrent,
            max_per_user: self.max_per_user,
            active_users: self.active_by_user.len(),
        }
    }
}
