//! S3-compatible durable store.
//!
//! Works with AWS S3 and S3-compatible services (MinIO, Backblaze B2,
//! Tigris, ...). Credentials are passed explicitly through [`S3Config`].

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{retry::RetryConfig, BehaviorVersion, Credentials, Region},
    primitives::ByteStream,
    Client,
};

use super::{DurableStore, S3Config};
use crate::error::{ElevationError, Result};

const DEFAULT_REGION: &str = "us-east-1";

/// Durable store backed by an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::Config`] if no bucket is configured.
    pub fn new(config: S3Config) -> Result<Self> {
        let bucket = config
            .bucket
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ElevationError::Config("S3 bucket not configured".to_string()))?;

        let region = Region::new(
            config
                .region
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            // 1 initial attempt + 2 retries with exponential backoff
            .retry_config(RetryConfig::standard().with_max_attempts(3))
            .force_path_style(config.force_path_style);

        if let (Some(key_id), Some(secret)) = (config.access_key_id, config.secret_access_key) {
            builder =
                builder.credentials_provider(Credentials::new(key_id, secret, None, None, "skadi"));
        }
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket,
        })
    }

    /// The bucket tiles are stored in.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn s3_error(key: &str, e: impl std::fmt::Display) -> ElevationError {
    ElevationError::DurableTier {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl DurableStore for S3Store {
    fn name(&self) -> &str {
        "s3"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(s3_error(key, service_error))
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error(key, e.into_service_error()))?;

        let body = output.body.collect().await.map_err(|e| s3_error(key, e))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/gzip")
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| s3_error(key, e.into_service_error()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_bucket() {
        let result = S3Store::new(S3Config::default());
        assert!(matches!(result, Err(ElevationError::Config(_))));
    }

    #[test]
    fn test_new_with_full_config() {
        let store = S3Store::new(S3Config {
            endpoint: Some("http://localhost:9000".to_string()),
            region: Some("eu-west-1".to_string()),
            bucket: Some("tiles".to_string()),
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
            force_path_style: true,
        })
        .unwrap();
        assert_eq!(store.bucket(), "tiles");
        assert_eq!(store.name(), "s3");
    }
}
