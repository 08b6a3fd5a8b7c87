//! Durable tier clients.
//!
//! The durable tier is an optional object store sitting between the memory
//! tier and the origin archive. It stores the gzip-compressed tile payload
//! verbatim, keyed by the canonical tile key (`N40/N40W074.hgt.gz`), so its
//! `get` returns exactly what the origin served and decodes the same way.
//!
//! Implementations:
//!
//! - [`S3Store`]: S3-compatible object storage (requires the `s3` feature)
//! - [`LocalStore`]: a directory on local disk
//! - [`MemoryStore`]: an in-process map, for tests and embedding

mod local;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalStore;
pub use self::memory::MemoryStore;
#[cfg(feature = "s3")]
pub use self::s3::S3Store;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Shared handle to a durable store.
pub type DurableHandle = Arc<dyn DurableStore>;

/// Credentialed object storage for compressed tile payloads.
///
/// All operations take the encoded tile key. Implementations must be safe to
/// call concurrently from many resolutions.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Name of the store, used for logging only.
    fn name(&self) -> &str;

    /// Check whether a payload exists for `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Fetch the compressed payload stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store a compressed payload under `key`, replacing any previous one.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;
}

/// Connection settings for an S3-compatible durable tier.
///
/// Every field is optional; the tier is only enabled when a bucket is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Config {
    /// Custom endpoint URL for S3-compatible services (MinIO, Backblaze, ...).
    pub endpoint: Option<String>,
    /// Region name. Defaults to `us-east-1` when unset.
    pub region: Option<String>,
    /// Bucket holding the tiles.
    pub bucket: Option<String>,
    /// Access key ID.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
    /// Use path-style addressing (`endpoint/bucket/key`).
    pub force_path_style: bool,
}

impl S3Config {
    /// Whether enough is configured to enable the tier.
    pub fn is_enabled(&self) -> bool {
        self.bucket.as_deref().is_some_and(|b| !b.is_empty())
    }
}

/// Which durable tier to build, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DurableConfig {
    /// No durable tier; misses go straight to the origin.
    #[default]
    Disabled,
    /// Tiles stored under a local directory.
    Local(PathBuf),
    /// Tiles stored in an S3-compatible bucket.
    S3(S3Config),
}

impl DurableConfig {
    /// Build the configured store, or `None` when disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::Config`](crate::ElevationError::Config) when
    /// S3 is requested without the `s3` feature, or without a bucket.
    pub fn build(self) -> Result<Option<DurableHandle>> {
        match self {
            DurableConfig::Disabled => Ok(None),
            DurableConfig::Local(root) => Ok(Some(Arc::new(LocalStore::new(root)))),
            DurableConfig::S3(config) => build_s3(config),
        }
    }
}

#[cfg(feature = "s3")]
fn build_s3(config: S3Config) -> Result<Option<DurableHandle>> {
    Ok(Some(Arc::new(S3Store::new(config)?)))
}

#[cfg(not(feature = "s3"))]
fn build_s3(_config: S3Config) -> Result<Option<DurableHandle>> {
    Err(crate::error::ElevationError::Config(
        "S3 durable tier requested but skadi was built without the `s3` feature".to_string(),
    ))
}
