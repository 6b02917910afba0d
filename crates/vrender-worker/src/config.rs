//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

const DEFAULT_RENDER_COMMAND: &str = "npx remotion lambda render";

/// Render invoker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Program and leading arguments of the render command
    pub render_command: Vec<String>,
    /// Deployed Remotion site the renderer loads
    pub serve_url: Option<String>,
    /// Composition id inside the site
    pub composition: String,
    /// AWS region of the render function
    pub region: String,
    /// Renderer credentials, passed to the child through its environment
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    /// Render timeout
    pub render_timeout: Duration,
    /// Directory for transient spec files
    pub work_dir: PathBuf,
    /// REST endpoint receiving usage records
    pub ledger_url: Option<String>,
    /// API key for the usage endpoint
    pub ledger_key: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            render_command: split_command(DEFAULT_RENDER_COMMAND),
            serve_url: None,
            composition: "main".to_string(),
            region: "us-east-1".to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            render_timeout: Duration::from_secs(600), // 10 minutes
            work_dir: std::env::temp_dir().join("vrender"),
            ledger_url: None,
            ledger_key: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            render_command: non_empty("RENDER_COMMAND")
                .map(|s| split_command(&s))
                .filter(|parts| !parts.is_empty())
                .unwrap_or(defaults.render_command),
            serve_url: non_empty("REMOTION_SERVE_URL"),
            composition: non_empty("REMOTION_COMPOSITION").unwrap_or(defaults.composition),
            region: non_empty("REMOTION_REGION").unwrap_or(defaults.region),
            aws_access_key_id: non_empty("REMOTION_AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: non_empty("REMOTION_AWS_SECRET_ACCESS_KEY"),
            render_timeout: std::env::var("RENDER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.render_timeout),
            work_dir: non_empty("RENDER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ledger_url: non_empty("USAGE_LEDGER_URL"),
            ledger_key: non_empty("USAGE_LEDGER_KEY"),
        }
    }

    /// Whether both renderer credentials are set.
    pub fn has_credentials(&self) -> bool {
        self.aws_access_key_id.is_some() && self.aws_secret_access_key.is_some()
    }

    /// Fail with a configuration error naming the missing credentials.
    pub fn ensure_credentials(&self) -> WorkerResult<()> {
        let missing: Vec<&str> = [
            ("REMOTION_AWS_ACCESS_KEY_ID", &self.aws_access_key_id),
            ("REMOTION_AWS_SECRET_ACCESS_KEY", &self.aws_secret_access_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(WorkerError::config_error(format!(
                "Render credentials not configured: {}",
                missing.join(", ")
            )))
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}
