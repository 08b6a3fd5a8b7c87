//! Origin archive fetching.
//!
//! The origin is the authoritative (and slowest) source of tiles: a read-only
//! HTTP archive laid out by tile key. The default is the public Skadi
//! terrain archive on AWS, where `N40/N40W074.hgt.gz` is served at
//! `https://s3.amazonaws.com/elevation-tiles-prod/skadi/N40/N40W074.hgt.gz`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{ElevationError, Result};
use crate::key::TileKey;
use crate::tile::TILE_BYTES;

/// Public Skadi archive base URL.
pub const DEFAULT_ORIGIN_URL: &str = "https://s3.amazonaws.com/elevation-tiles-prod/skadi";

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default number of retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default cap on a compressed payload: the size of a decompressed tile.
const DEFAULT_MAX_PAYLOAD_BYTES: u64 = TILE_BYTES as u64;

/// Source of authoritative compressed tile payloads.
#[async_trait]
pub trait TileOrigin: Send + Sync {
    /// Fetch the gzip-compressed payload for `key`.
    async fn fetch(&self, key: &TileKey) -> Result<Vec<u8>>;
}

/// Configuration for fetching tiles from the origin archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginConfig {
    /// Base URL; the encoded tile key is appended after a `/`.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Number of retry attempts on failure.
    pub max_retries: u32,
    /// Largest payload accepted from the archive, in bytes.
    pub max_payload_bytes: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ORIGIN_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl OriginConfig {
    /// Create a configuration for a custom archive base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the maximum number of retry attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the largest payload accepted from the archive.
    pub fn with_max_payload(mut self, bytes: u64) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    /// Full URL of a tile in the archive.
    ///
    /// ```
    /// use skadi::{OriginConfig, TileKey};
    ///
    /// let config = OriginConfig::with_base_url("https://example.com/skadi/");
    /// assert_eq!(
    ///     config.tile_url(&TileKey::new(40, -74)),
    ///     "https://example.com/skadi/N40/N40W074.hgt.gz"
    /// );
    /// ```
    pub fn tile_url(&self, key: &TileKey) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key.encode())
    }
}

/// Origin fetcher over HTTP.
pub struct HttpOrigin {
    client: Client,
    config: OriginConfig,
}

/// Outcome of a single attempt.
enum Attempt {
    Retryable(ElevationError),
    Fatal(ElevationError),
}

impl HttpOrigin {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: OriginConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(ElevationError::Config(
                "Origin base URL is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ElevationError::Config(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OriginConfig {
        &self.config
    }

    async fn attempt(&self, key: &TileKey, url: &str) -> std::result::Result<Vec<u8>, Attempt> {
        let origin_error = |reason: String| ElevationError::Origin {
            key: key.encode(),
            reason,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Attempt::Retryable(origin_error(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let err = origin_error(format!("HTTP {}", status));
            // Client errors (404 for ocean tiles, 403 for missing objects) won't change
            return Err(if status.is_server_error() {
                Attempt::Retryable(err)
            } else {
                Attempt::Fatal(err)
            });
        }

        let limit = self.config.max_payload_bytes;
        let too_large = |size: u64| {
            Attempt::Fatal(origin_error(format!(
                "payload of {} bytes exceeds the limit of {}",
                size, limit
            )))
        };
        if let Some(length) = response.content_length().filter(|&len| len > limit) {
            return Err(too_large(length));
        }

        // The declared length may be missing or wrong, so the body is capped as it arrives.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Attempt::Retryable(origin_error(e.to_string())))?
        {
            let size = (body.len() + chunk.len()) as u64;
            if size > limit {
                return Err(too_large(size));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl TileOrigin for HttpOrigin {
    async fn fetch(&self, key: &TileKey) -> Result<Vec<u8>> {
        let url = self.config.tile_url(key);

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Brief delay before retry
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
            }

            match self.attempt(key, &url).await {
                Ok(bytes) => {
                    tracing::debug!(key = %key, url = %url, bytes = bytes.len(), "origin fetch complete");
                    return Ok(bytes);
                }
                Err(Attempt::Fatal(e)) => {
                    tracing::debug!(key = %key, url = %url, error = %e, "origin fetch rejected");
                    return Err(e);
                }
                Err(Attempt::Retryable(e)) => {
                    tracing::warn!(key = %key, url = %url, attempt, error = %e, "origin fetch failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ElevationError::Origin {
            key: key.encode(),
            reason: "Unknown error".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{extract::Path, http::StatusCode, routing::get, Router};

    async fn spawn_archive(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/skadi", addr)
    }

    #[test]
    fn test_tile_url() {
        let config = OriginConfig::default();
        assert_eq!(
            config.tile_url(&TileKey::new(42, 0)),
            "https://s3.amazonaws.com/elevation-tiles-prod/skadi/N42/N42E000.hgt.gz"
        );

        let config = OriginConfig::with_base_url("http://localhost:8000/tiles///");
        assert_eq!(
            config.tile_url(&TileKey::new(-5, -100)),
            "http://localhost:8000/tiles/S05/S05W100.hgt.gz"
        );
    }

    #[test]
    fn test_config_builder() {
        let config = OriginConfig::with_base_url("https://example.com")
            .with_timeout(5)
            .with_max_retries(0);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.max_retries, 0);

        let config = OriginConfig::default();
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.max_payload_bytes, TILE_BYTES as u64);
    }

    #[test]
    fn test_empty_base_url() {
        let result = HttpOrigin::new(OriginConfig::with_base_url(""));
        assert!(matches!(result, Err(ElevationError::Config(_))));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let app = Router::new().route(
            "/skadi/:dir/:file",
            get(|Path((dir, file)): Path<(String, String)>| async move {
                format!("{}/{}", dir, file).into_bytes()
            }),
        );
        let base = spawn_archive(app).await;

        let origin = HttpOrigin::new(OriginConfig::with_base_url(base)).unwrap();
        let bytes = origin.fetch(&TileKey::new(40, -74)).await.unwrap();
        assert_eq!(bytes, b"N40/N40W074.hgt.gz");
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::NOT_FOUND
            }
        });
        let base = spawn_archive(app).await;

        let origin =
            HttpOrigin::new(OriginConfig::with_base_url(base).with_max_retries(3)).unwrap();
        let result = origin.fetch(&TileKey::new(0, -150)).await;

        match result {
            Err(ElevationError::Origin { reason, .. }) => assert!(reason.contains("404")),
            other => panic!("Expected Origin error, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::SERVICE_UNAVAILABLE, Vec::new())
                } else {
                    (StatusCode::OK, b"ok".to_vec())
                }
            }
        });
        let base = spawn_archive(app).await;

        let origin =
            HttpOrigin::new(OriginConfig::with_base_url(base).with_max_retries(1)).unwrap();
        let bytes = origin.fetch(&TileKey::new(1, 1)).await.unwrap();

        assert_eq!(bytes, b"ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_oversized_payload_is_rejected() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                vec![0u8; 2048]
            }
        });
        let base = spawn_archive(app).await;

        let config = OriginConfig::with_base_url(base)
            .with_max_retries(2)
            .with_max_payload(1024);
        let origin = HttpOrigin::new(config).unwrap();

        match origin.fetch(&TileKey::new(1, 1)).await {
            Err(ElevationError::Origin { reason, .. }) => {
                assert!(reason.contains("exceeds the limit of 1024"), "{reason}")
            }
            other => panic!("Expected Origin error, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_dropped_connection_is_retried() {
        // Accepts each connection and closes it without a response
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });

        let config = OriginConfig::with_base_url(format!("http://{}/skadi", addr))
            .with_max_retries(2);
        let origin = HttpOrigin::new(config).unwrap();
        let result = origin.fetch(&TileKey::new(1, 1)).await;

        assert!(matches!(result, Err(ElevationError::Origin { .. })));
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_retried() {
        // Reserve a port, then close it
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = OriginConfig::with_base_url(format!("http://{}/skadi", addr))
            .with_max_retries(1);
        let origin = HttpOrigin::new(config).unwrap();

        let start = std::time::Instant::now();
        let result = origin.fetch(&TileKey::new(1, 1)).await;

        match result {
            Err(ElevationError::Origin { key, .. }) => assert_eq!(key, "N01/N01E001.hgt.gz"),
            other => panic!("Expected Origin error, got {:?}", other),
        }
        // The single retry waits out its back-off first
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
