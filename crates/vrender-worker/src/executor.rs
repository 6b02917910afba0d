//! Job executor: submission, fair dispatch, completion and cancellation.
//!
//! All scheduling state lives behind one queue mutex. Whenever both locks
//! are needed the queue lock is taken first, then the store lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn, Instrument};

use vrender_models::{Job, JobId, JobStatus, JobUpdate, RenderSpec};
use vrender_queue::{
    metrics, FairQueue, JobStore, QueueConfig, QueueError, QueueStats, QueuedJob, StatusCounts,
};

use crate::error::{WorkerError, WorkerResult};
use crate::invoker::{ProgressSink, RenderOutcome, RenderRunner};
use crate::ledger::{record_usage, UsageLedger};
use crate::logging::JobLogger;

/// A waiting job's place in line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePosition {
    pub job_id: JobId,
    pub position: usize,
}

/// Queue counters plus the caller's waiting jobs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    #[serde(flatten)]
    pub stats: QueueStats,
    pub jobs: StatusCounts,
    pub your_jobs: Vec<QueuePosition>,
}

struct ExecutorInner {
    store: Arc<JobStore>,
    queue: Mutex<FairQueue>,
    runner: Arc<dyn RenderRunner>,
    ledger: Arc<dyn UsageLedger>,
    rescan_delay: Duration,
}

/// Service object owning the job table, the fair queue and the renderer.
#[derive(Clone)]
pub struct JobExecutor {
    inner: Arc<ExecutorInner>,
}

impl JobExecutor {
    pub fn new(
        config: &QueueConfig,
        store: Arc<JobStore>,
        runner: Arc<dyn RenderRunner>,
        ledger: Arc<dyn UsageLedger>,
    ) -> Self {
        info!(
            "Job executor ready (max {} concurrent, {} per user)",
            config.max_concurrent, config.max_per_user
        );
        Self {
            inner: Arc::new(ExecutorInner {
                store,
                queue: Mutex::new(FairQueue::from_config(config)),
                runner,
                ledger,
                rescan_delay: config.rescan_delay,
            }),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.inner.store
    }

    /// Normalise the payload, create a pending job and try to dispatch.
    pub async fn submit(&self, owner_id: &str, mut payload: RenderSpec) -> WorkerResult<JobId> {
        let timing = payload.normalize();
        let frames = timing.duration_in_frames(payload.platform.fps);
        payload.user_id = Some(owner_id.to_string());

        let job_id = {
            let mut queue = self.inner.queue.lock().await;
            if queue.is_full() {
                metrics::record_job_rejected();
                return Err(QueueError::QueueFull(queue.pending_len()).into());
            }
            let job_id = self.inner.store.create(payload, owner_id).await;
            let position = queue.push(job_id.clone(), owner_id)?;
            info!(
                job_id = %job_id,
                user_id = %owner_id,
                position,
                effective_ms = timing.effective_ms,
                frames,
                multiplier = timing.multiplier,
                "Render queued"
            );
            job_id
        };

        metrics::record_job_submitted();
        self.pump().await;
        Ok(job_id)
    }

    pub async fn get(&self, job_id: &JobId) -> WorkerResult<Job> {
        Ok(self.inner.store.get(job_id).await?)
    }

    /// Cancel a job.
    ///
    /// Pending jobs leave the queue and are never dispatched. Processing jobs
    /// keep running externally but their outcome is discarded. Cancelling a
    /// cancelled job returns it unchanged.
    pub async fn cancel(&self, job_id: &JobId) -> WorkerResult<Job> {
        let job = {
            let mut queue = self.inner.queue.lock().await;
            let job = self.inner.store.get(job_id).await?;
            match job.status {
                JobStatus::Cancelled => return Ok(job),
                JobStatus::Completed | JobStatus::Failed => {
                    return Err(WorkerError::NotCancellable(job.status))
                }
                JobStatus::Pending | JobStatus::Processing => {}
            }
            queue.remove(job_id);
            self.inner
                .store
                .update(job_id, JobUpdate::cancelled())
                .await?
        };

        info!(job_id = %job_id, user_id = %job.user_id, "Render cancelled");
        metrics::record_job_cancelled();
        self.publish_gauges().await;
        self.inner.runner.discard(job_id).await;
        Ok(job)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Vec<Job> {
        self.inner.store.list_for_user(user_id).await
    }

    pub async fn queue_snapshot(&self, user_id: &str) -> QueueSnapshot {
        let (stats, positions) = {
            let queue = self.inner.queue.lock().await;
            (queue.stats(), queue.positions_for(user_id))
        };
        QueueSnapshot {
            stats,
            jobs: self.inner.store.counts().await,
            your_jobs: positions
                .into_iter()
                .map(|(job_id, position)| QueuePosition { job_id, position })
                .collect(),
        }
    }

    pub async fn active_count(&self) -> usize {
        self.inner.queue.lock().await.active_len()
    }

    /// Wait until no render is in flight, up to `timeout`.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.active_count().await == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Dispatch as many waiting jobs as the ceilings allow.
    pub async fn pump(&self) {
        loop {
            let next = {
                let mut queue = self.inner.queue.lock().await;
                let Some(next) = queue.select_next() else {
                    break;
                };
                match self
                    .inner
                    .store
                    .update(&next.job_id, JobUpdate::processing())
                    .await
                {
                    Ok(job) => Some((next, job)),
                    Err(e) => {
                        warn!(job_id = %next.job_id, "Skipping dispatch: {}", e);
                        queue.release(&next.user_id);
                        None
                    }
                }
            };

            if let Some((queued, job)) = next {
                let executor = self.clone();
                tokio::spawn(async move { executor.execute_job(queued, job).await });
            }
        }
        self.publish_gauges().await;
    }

    async fn execute_job(self, queued: QueuedJob, job: Job) {
        let logger = JobLogger::new(&job.id, &job.user_id);
        let span = logger.create_span();
        async {
            logger.log_start(job.project_name().unwrap_or("untitled"));
            let started = Instant::now();

            let (progress, progress_task) = self.progress_channel(&job.id, logger.clone());
            let outcome = self.inner.runner.render(&job.id, &job.payload, progress).await;
            progress_task.abort();

            self.finish(&job.id, outcome, started.elapsed(), &logger).await;

            let rescan = {
                let mut queue = self.inner.queue.lock().await;
                queue.release(&queued.user_id);
                !queue.is_empty()
            };
            self.publish_gauges().await;
            if rescan {
                self.schedule_rescan();
            }
        }
        .instrument(span)
        .await
    }

    fn progress_channel(
        &self,
        job_id: &JobId,
        logger: JobLogger,
    ) -> (ProgressSink, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let store = Arc::clone(&self.inner.store);
        let job_id = job_id.clone();
        let task = tokio::spawn(async move {
            let mut last_logged = 0u8;
            while let Some(pct) = rx.recv().await {
                if store.update(&job_id, JobUpdate::progress(pct)).await.is_err() {
                    break;
                }
                if pct >= last_logged.saturating_add(25) {
                    logger.log_progress(pct);
                    last_logged = pct;
                }
            }
        });
        let sink: ProgressSink = Arc::new(move |pct| {
            let _ = tx.send(pct);
        });
        (sink, task)
    }

    async fn finish(&self, job_id: &JobId, outcome: RenderOutcome, elapsed: Duration, logger: &JobLogger) {
        let secs = elapsed.as_secs_f64();
        let (update, failure) = match outcome {
            RenderOutcome::Completed { result, cost } => (JobUpdate::completed(result, cost), None),
            RenderOutcome::Failed(failure) => {
                (JobUpdate::failed(failure.message.clone()), Some(failure))
            }
        };

        match self.inner.store.update(job_id, update).await {
            Ok(job) => match failure {
                None => {
                    logger.log_completion(job.result.as_deref().unwrap_or_default());
                    metrics::record_job_completed(secs);
                    let ledger = Arc::clone(&self.inner.ledger);
                    tokio::spawn(async move { record_usage(ledger.as_ref(), &job).await });
                }
                Some(failure) => {
                    if failure.category.is_transient() {
                        logger.log_warning(&failure.message);
                    } else {
                        logger.log_error(&failure.message);
                    }
                    metrics::record_job_failed(failure.category.as_str(), secs);
                }
            },
            // Cancelled while rendering, or swept.
            Err(e) => {
                logger.log_warning(&format!("Discarding render outcome: {}", e));
            }
        }
    }

    fn schedule_rescan(&self) {
        let executor = self.clone();
        let delay = self.inner.rescan_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Rescanning render queue");
            executor.pump().await;
        });
    }

    async fn publish_gauges(&self) {
        let queue = self.inner.queue.lock().await;
        metrics::set_queue_gauges(queue.pending_len(), queue.active_len());
    }
}
