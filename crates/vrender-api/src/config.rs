//! API configuration.

use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Prefix for the poll/download URLs handed back on submission
    pub public_base_url: String,
    /// Pause before reading a finished artifact from the store
    pub download_delay: Duration,
    /// HS256 secret used to verify Supabase access tokens
    pub jwt_secret: Option<String>,
    /// How long shutdown waits for in-flight renders
    pub shutdown_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 10 * 1024 * 1024, // 10MB
            environment: "development".to_string(),
            public_base_url: String::new(),
            download_delay: Duration::from_millis(2000),
            jwt_secret: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_rps),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            download_delay: std::env::var("DOWNLOAD_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.download_delay),
            jwt_secret: std::env::var("SUPABASE_JWT_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            shutdown_timeout: std::env::var("SHUTDOWN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Absolute or root-relative URL for an API path.
    pub fn public_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.public_base_url, path_and_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_public_url_strips_trailing_slash() {
        std::env::set_var("PUBLIC_BASE_URL", "https://api.example.com/");
        std::env::set_var("DOWNLOAD_DELAY_MS", "0");
        let config = ApiConfig::from_env();
        assert_eq!(
            config.public_url("/api/render/status?jobId=1"),
            "https://api.example.com/api/render/status?jobId=1"
        );
        assert_eq!(config.download_delay, Duration::ZERO);
        std::env::remove_var("PUBLIC_BASE_URL");
        std::env::remove_var("DOWNLOAD_DELAY_MS");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        std::env::remove_var("PUBLIC_BASE_URL");
        std::env::remove_var("ENVIRONMENT");
        let config = ApiConfig::from_env();
        assert_eq!(config.public_url("/x"), "/x");
        assert_eq!(config.download_delay, Duration::from_secs(2));
        assert!(!config.is_production());
    }
}
