//! Usage/cost ledger sink.
//!
//! Ledger writes are best-effort: callers spawn them and only log failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use vrender_models::{Job, UsageRecord};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Destination for completed-render usage records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn record(&self, record: &UsageRecord) -> WorkerResult<()>;
}

/// Posts records to a PostgREST-style table endpoint.
pub struct HttpUsageLedger {
    url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpUsageLedger {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> WorkerResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            url: url.into(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl UsageLedger for HttpUsageLedger {
    async fn record(&self, record: &UsageRecord) -> WorkerResult<()> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Prefer", "return=minimal")
            .json(record);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::ledger(format!("{}: {}", status, body)));
        }

        debug!(job_id = %record.job_id, "Usage record stored");
        Ok(())
    }
}

/// Writes records to the log only.
pub struct LogOnlyLedger;

#[async_trait]
impl UsageLedger for LogOnlyLedger {
    async fn record(&self, record: &UsageRecord) -> WorkerResult<()> {
        info!(
            job_id = %record.job_id,
            user_id = %record.user_id,
            cost = record.cost,
            duration_ms = record.duration_ms,
            "Render usage"
        );
        Ok(())
    }
}

/// Ledger for the configured endpoint, or the log-only sink without one.
pub fn ledger_from_config(config: &WorkerConfig) -> WorkerResult<Arc<dyn UsageLedger>> {
    match &config.ledger_url {
        Some(url) => Ok(Arc::new(HttpUsageLedger::new(
            url.clone(),
            config.ledger_key.clone(),
        )?)),
        None => Ok(Arc::new(LogOnlyLedger)),
    }
}

/// Record usage for a completed job; jobs without a cost are skipped.
pub async fn record_usage(ledger: &dyn UsageLedger, job: &Job) {
    let Some(record) = UsageRecord::from_job(job) else {
        debug!(job_id = %job.id, "No cost reported, skipping usage record");
        return;
    };
    if let Err(e) = ledger.record(&record).await {
        warn!(job_id = %job.id, "Failed to record usage: {}", e);
    }
}
