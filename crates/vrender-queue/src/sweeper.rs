//! Background service that drops finished jobs after the retention period.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::metrics;
use crate::store::JobStore;

/// Periodic retention sweeper.
pub struct JobSweeper {
    store: Arc<JobStore>,
    interval: Duration,
    retention: Duration,
}

impl JobSweeper {
    pub fn new(store: Arc<JobStore>, interval: Duration, retention: Duration) -> Self {
        Self {
            store,
            interval,
            retention,
        }
    }

    pub fn from_config(store: Arc<JobStore>, config: &QueueConfig) -> Self {
        Self::new(store, config.sweep_interval, config.retention)
    }

    /// Start the sweep loop.
    ///
    /// Runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        info!(
            "Starting job sweeper (interval: {:?}, retention: {:?})",
            self.interval, self.retention
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// Run a single sweep; returns how many jobs were removed.
    pub async fn sweep_once(&self) -> usize {
        let removed = self.store.sweep(self.retention).await;
        if removed > 0 {
            metrics::record_jobs_swept(removed);
        } else {
            debug!("Sweep found nothing to remove");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrender_models::{JobUpdate, RenderSpec};

    #[tokio::test]
    async fn test_sweep_once_with_zero_retention() {
        let store = Arc::new(JobStore::new());
        let done = store.create(RenderSpec::default(), "u").await;
        let waiting = store.create(RenderSpec::default(), "u").await;
        store.update(&done, JobUpdate::cancelled()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let sweeper = JobSweeper::new(store.clone(), Duration::from_secs(60), Duration::ZERO);
        assert_eq!(sweeper.sweep_once().await, 1);
        assert!(store.get(&done).await.is_err());
        assert!(store.get(&waiting).await.is_ok());
        assert_eq!(sweeper.sweep_once().await, 0);
    }

    #[tokio::test]
    async fn test_long_retention_keeps_finished_jobs() {
        let store = Arc::new(JobStore::new());
        let done = store.create(RenderSpec::default(), "u").await;
        store.update(&done, JobUpdate::cancelled()).await.unwrap();

        let sweeper = JobSweeper::from_config(store.clone(), &QueueConfig::default());
        assert_eq!(sweeper.sweep_once().await, 0);
        assert!(store.get(&done).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_sweeps_on_interval() {
        let store = Arc::new(JobStore::new());
        let done = store.create(RenderSpec::default(), "u").await;
        store.update(&done, JobUpdate::cancelled()).await.unwrap();

        let sweeper = JobSweeper::new(store.clone(), Duration::from_secs(10), Duration::ZERO);
        let handle = tokio::spawn(async move { sweeper.run().await });

        tokio::time::sleep(Duration::from_secs(11)).await;
        // Let the spawned loop finish its sweep.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        handle.abort();
        assert_eq!(store.len().await, 0);
    }
}
