//! Parsing of S3 artifact URLs.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{StorageError, StorageResult};

/// Bucket/key pair of a rendered artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub bucket: String,
    pub key: String,
    /// Region encoded in the host name, if any
    pub region: Option<String>,
}

impl ArtifactLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            region: None,
        }
    }

    /// Parse `s3://bucket/key`, path-style
    /// `https://s3.<region>.amazonaws.com/<bucket>/<key>` or virtual-hosted
    /// `https://<bucket>.s3.<region>.amazonaws.com/<key>` URLs.
    pub fn parse(raw: &str) -> StorageResult<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| StorageError::invalid_location(format!("{}: {}", raw, e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| StorageError::invalid_location(format!("{}: missing host", raw)))?
            .to_lowercase();
        let path = url.path().trim_start_matches('/');

        let (bucket, key, region) = match url.scheme() {
            "s3" => (host, path.to_string(), None),
            "https" | "http" => {
                let Some(prefix) = host.strip_suffix(".amazonaws.com") else {
                    return Err(StorageError::invalid_location(format!(
                        "{}: not an S3 host",
                        raw
                    )));
                };
                if let Some(region) = path_style_region(prefix) {
                    let (bucket, key) = path.split_once('/').ok_or_else(|| {
                        StorageError::invalid_location(format!("{}: missing object key", raw))
                    })?;
                    (bucket.to_string(), key.to_string(), region)
                } else if let Some((bucket, rest)) = prefix.split_once(".s3") {
                    let region = rest
                        .trim_start_matches(['.', '-'])
                        .split('.')
                        .next()
                        .filter(|r| !r.is_empty())
                        .map(str::to_string);
                    (bucket.to_string(), path.to_string(), region)
                } else {
                    return Err(StorageError::invalid_location(format!(
                        "{}: not an S3 host",
                        raw
                    )));
                }
            }
            scheme => {
                return Err(StorageError::invalid_location(format!(
                    "{}: unsupported scheme '{}'",
                    raw, scheme
                )))
            }
        };

        if bucket.is_empty() || key.is_empty() {
            return Err(StorageError::invalid_location(format!(
                "{}: missing bucket or key",
                raw
            )));
        }

        let key = urlencoding::decode(&key)
            .map_err(|e| StorageError::invalid_location(format!("{}: {}", raw, e)))?
            .into_owned();

        Ok(Self {
            bucket,
            key,
            region,
        })
    }
}

/// `s3`, `s3.<region>` or `s3-<region>` host prefixes address path-style URLs.
fn path_style_region(prefix: &str) -> Option<Option<String>> {
    if prefix == "s3" {
        return Some(None);
    }
    prefix
        .strip_prefix("s3.")
        .or_else(|| prefix.strip_prefix("s3-"))
        .filter(|region| !region.contains('.') || region.starts_with("dualstack."))
        .map(|region| Some(region.trim_start_matches("dualstack.").to_string()))
}

impl FromStr for ArtifactLocation {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_style_url() {
        let loc = ArtifactLocation::parse(
            "https://s3.us-east-1.amazonaws.com/remotionlambda-abc/renders/xyz/out.mp4",
        )
        .unwrap();
        assert_eq!(loc.bucket, "remotionlambda-abc");
        assert_eq!(loc.key, "renders/xyz/out.mp4");
        assert_eq!(loc.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_virtual_hosted_url() {
        let loc =
            ArtifactLocation::parse("https://bucket.s3.eu-west-2.amazonaws.com/a/b%20c.mp4")
                .unwrap();
        assert_eq!(loc.bucket, "bucket");
        assert_eq!(loc.key, "a/b c.mp4");
        assert_eq!(loc.region.as_deref(), Some("eu-west-2"));
    }

    #[test]
    fn test_global_endpoint_and_s3_scheme() {
        let loc = ArtifactLocation::parse("https://s3.amazonaws.com/bucket/key.mp4").unwrap();
        assert_eq!(loc.region, None);
        assert_eq!(loc.key, "key.mp4");

        let loc: ArtifactLocation = "s3://bucket/dir/key.mp4".parse().unwrap();
        assert_eq!(loc.bucket, "bucket");
        assert_eq!(loc.to_string(), "s3://bucket/dir/key.mp4");
    }

    #[test]
    fn test_rejects_foreign_hosts() {
        assert!(ArtifactLocation::parse("https://example.com/bucket/key").is_err());
        assert!(ArtifactLocation::parse("ftp://s3.amazonaws.com/bucket/key").is_err());
        assert!(ArtifactLocation::parse("https://s3.us-east-1.amazonaws.com/bucket").is_err());
        assert!(ArtifactLocation::parse("not a url").is_err());
    }
}
