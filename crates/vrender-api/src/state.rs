//! Application state.

use std::sync::Arc;

use tracing::warn;

use vrender_queue::{JobStore, QueueConfig};
use vrender_storage::{ArtifactStore, S3ArtifactStore, S3Config};
use vrender_worker::{ledger_from_config, JobExecutor, RenderInvoker, WorkerConfig};

use crate::auth::JwtVerifier;
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue_config: QueueConfig,
    pub worker: Arc<WorkerConfig>,
    pub executor: JobExecutor,
    pub storage: Arc<dyn ArtifactStore>,
    pub auth: Arc<JwtVerifier>,
}

impl AppState {
    /// Assemble state from already-built parts.
    pub fn new(
        config: ApiConfig,
        queue_config: QueueConfig,
        worker: WorkerConfig,
        executor: JobExecutor,
        storage: Arc<dyn ArtifactStore>,
    ) -> Self {
        let auth = JwtVerifier::from_secret(config.jwt_secret.as_deref());
        Self {
            config,
            queue_config,
            worker: Arc::new(worker),
            executor,
            storage,
            auth: Arc::new(auth),
        }
    }

    /// Create application state from the environment.
    pub async fn from_env(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let queue_config = QueueConfig::from_env();
        let worker = WorkerConfig::from_env();

        if config.jwt_secret.is_none() {
            warn!("SUPABASE_JWT_SECRET not set; every authenticated request will be rejected");
        }
        if !worker.has_credentials() {
            warn!("Render credentials not set; submissions will fail until they are configured");
        }

        let storage: Arc<dyn ArtifactStore> = match S3ArtifactStore::from_env() {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!("Artifact store not fully configured: {}", e);
                Arc::new(S3ArtifactStore::new(S3Config {
                    access_key_id: String::new(),
                    secret_access_key: String::new(),
                    region: worker.region.clone(),
                    endpoint_url: None,
                }))
            }
        };

        let ledger = ledger_from_config(&worker)?;
        let runner = Arc::new(RenderInvoker::new(worker.clone()));
        let executor = JobExecutor::new(&queue_config, Arc::new(JobStore::new()), runner, ledger);

        Ok(Self::new(config, queue_config, worker, executor, storage))
    }
}
