//! Scheduling configuration.

use std::time::Duration;

/// Queue and scheduling configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Global ceiling on concurrently dispatched renders
    pub max_concurrent: usize,
    /// Per-user ceiling on concurrently dispatched renders
    pub max_per_user: usize,
    /// Pause before re-scanning the queue after a render returns
    pub rescan_delay: Duration,
    /// Maximum number of waiting jobs before submissions are rejected
    pub max_queue_length: usize,
    /// How often finished jobs are swept
    pub sweep_interval: Duration,
    /// How long finished jobs stay queryable
    pub retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_per_user: 2,
            rescan_delay: Duration::from_millis(1000),
            max_queue_length: 1000,
            sweep_interval: Duration::from_secs(300), // 5 minutes
            retention: Duration::from_secs(3600),     // 1 hour
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent: env_parse("RENDER_MAX_CONCURRENT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent),
            max_per_user: env_parse("RENDER_MAX_PER_USER")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_per_user),
            rescan_delay: env_parse("RENDER_RESCAN_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.rescan_delay),
            max_queue_length: env_parse("RENDER_MAX_QUEUE_LENGTH")
                .unwrap_or(defaults.max_queue_length),
            sweep_interval: env_parse("RENDER_SWEEP_INTERVAL_SECS")
                .filter(|n: &u64| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            retention: env_parse("RENDER_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
