//! Artifact store implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::location::ArtifactLocation;

/// Read access to finished render artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Download the whole object.
    async fn download_bytes(&self, location: &ArtifactLocation) -> StorageResult<Vec<u8>>;
}

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Default region when the artifact URL carries none
    pub region: String,
    /// Custom endpoint (S3-compatible stores, local testing)
    pub endpoint_url: Option<String>,
}

impl S3Config {
    /// Create config from environment variables.
    ///
    /// Reuses the renderer credentials, since the render bucket belongs to
    /// the same AWS account.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            access_key_id: std::env::var("REMOTION_AWS_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("REMOTION_AWS_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("REMOTION_AWS_SECRET_ACCESS_KEY").map_err(|_| {
                StorageError::config_error("REMOTION_AWS_SECRET_ACCESS_KEY not set")
            })?,
            region: std::env::var("REMOTION_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
        })
    }
}

/// S3 client for render artifacts.
#[derive(Clone)]
pub struct S3ArtifactStore {
    client: Client,
    default_region: String,
}

impl S3ArtifactStore {
    /// Create a new S3 store from configuration.
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "remotion",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            default_region: config.region,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(S3Config::from_env()?))
    }

    fn region_for(&self, location: &ArtifactLocation) -> Region {
        Region::new(
            location
                .region
                .clone()
                .unwrap_or_else(|| self.default_region.clone()),
        )
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn download_bytes(&self, location: &ArtifactLocation) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", location);

        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .customize()
            .config_override(Builder::default().region(self.region_for(location)))
            .send()
            .await
            .map_err(|e| {
                let message = format!("{:?}", e);
                if message.contains("NoSuchKey") {
                    StorageError::not_found(location.to_string())
                } else {
                    StorageError::DownloadFailed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec();

        info!("Downloaded {} ({} bytes)", location, bytes.len());
        Ok(bytes)
    }
}

/// In-process artifact store for tests and local development.
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, location: &ArtifactLocation, bytes: Vec<u8>) {
        self.objects
            .write()
            .await
            .insert((location.bucket.clone(), location.key.clone()), bytes);
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn download_bytes(&self, location: &ArtifactLocation) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(location.bucket.clone(), location.key.clone()))
            .cloned()
            .ok_or_else(|| StorageError::not_found(location.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryArtifactStore::new();
        let loc = ArtifactLocation::new("bucket", "renders/a.mp4");

        assert!(matches!(
            store.download_bytes(&loc).await,
            Err(StorageError::NotFound(_))
        ));

        store.put(&loc, vec![1, 2, 3]).await;
        assert_eq!(store.download_bytes(&loc).await.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_region_falls_back_to_default() {
        let store = S3ArtifactStore::new(S3Config {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
            region: "eu-central-1".to_string(),
            endpoint_url: None,
        });
        let loc = ArtifactLocation::new("bucket", "key");
        assert_eq!(store.region_for(&loc).as_ref(), "eu-central-1");

        let loc = ArtifactLocation::parse("https://s3.us-west-2.amazonaws.com/b/k").unwrap();
        assert_eq!(store.region_for(&loc).as_ref(), "us-west-2");
    }
}
