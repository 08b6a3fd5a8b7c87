//! Service construction and environment configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{TileCache, DEFAULT_MAX_TILES, DEFAULT_TTL};
use crate::durable::{DurableConfig, DurableHandle, S3Config};
use crate::error::{ElevationError, Result};
use crate::origin::{HttpOrigin, OriginConfig, TileOrigin};
use crate::resolver::TileResolver;
use crate::service::{ElevationService, DEFAULT_CONCURRENCY};

/// Builder for creating an [`ElevationService`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use skadi::{ElevationServiceBuilder, OriginConfig};
///
/// let service = ElevationServiceBuilder::new()
///     .ttl(Duration::from_secs(600))
///     .max_tiles(64)
///     .origin_config(OriginConfig::with_base_url("http://localhost:9000/skadi"))
///     .build()
///     .unwrap();
/// assert_eq!(service.resolver().cache().ttl(), Duration::from_secs(600));
/// ```
pub struct ElevationServiceBuilder {
    ttl: Duration,
    max_tiles: u64,
    concurrency: usize,
    origin_config: OriginConfig,
    origin: Option<Arc<dyn TileOrigin>>,
    durable_config: DurableConfig,
    durable: Option<DurableHandle>,
}

impl Default for ElevationServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ElevationServiceBuilder {
    /// Create a builder with the defaults: one-hour sliding TTL, at most
    /// [`DEFAULT_MAX_TILES`] resident tiles, public origin archive, no
    /// durable tier.
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_tiles: DEFAULT_MAX_TILES,
            concurrency: DEFAULT_CONCURRENCY,
            origin_config: OriginConfig::default(),
            origin: None,
            durable_config: DurableConfig::Disabled,
            durable: None,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `SKADI_CACHE_TTL` | Sliding TTL in seconds | 3600 |
    /// | `SKADI_CACHE_MAX_TILES` | Maximum resident tiles | 100 |
    /// | `SKADI_CONCURRENCY` | Tiles resolved concurrently per batch | 8 |
    /// | `SKADI_ORIGIN_URL` | Origin archive base URL | public Skadi archive |
    /// | `SKADI_ORIGIN_TIMEOUT` | Origin request timeout in seconds | 60 |
    /// | `SKADI_ORIGIN_RETRIES` | Origin retry attempts | 3 |
    /// | `SKADI_DATA_DIR` | Local durable tier directory | None |
    /// | `SKADI_S3_BUCKET` | S3 durable tier bucket* | None |
    /// | `SKADI_S3_ENDPOINT` | Custom S3 endpoint* | None |
    /// | `SKADI_S3_REGION` | S3 region* | us-east-1 |
    /// | `SKADI_S3_ACCESS_KEY_ID` | S3 access key* | None |
    /// | `SKADI_S3_SECRET_ACCESS_KEY` | S3 secret key* | None |
    /// | `SKADI_S3_FORCE_PATH_STYLE` | Path-style addressing* | false |
    ///
    /// *Requires the `s3` feature at build time.
    ///
    /// When both `SKADI_S3_BUCKET` and `SKADI_DATA_DIR` are set, S3 wins.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::Config`] if a numeric variable doesn't parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut builder = Self::new();

        if let Some(secs) = parse_var::<u64>(&var, "SKADI_CACHE_TTL")? {
            builder.ttl = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var(&var, "SKADI_CACHE_MAX_TILES")? {
            builder.max_tiles = max;
        }
        if let Some(concurrency) = parse_var(&var, "SKADI_CONCURRENCY")? {
            builder.concurrency = concurrency;
        }

        if let Some(url) = var("SKADI_ORIGIN_URL") {
            builder.origin_config.base_url = url;
        }
        if let Some(timeout) = parse_var(&var, "SKADI_ORIGIN_TIMEOUT")? {
            builder.origin_config.timeout_secs = timeout;
        }
        if let Some(retries) = parse_var(&var, "SKADI_ORIGIN_RETRIES")? {
            builder.origin_config.max_retries = retries;
        }

        let s3 = S3Config {
            endpoint: var("SKADI_S3_ENDPOINT"),
            region: var("SKADI_S3_REGION"),
            bucket: var("SKADI_S3_BUCKET"),
            access_key_id: var("SKADI_S3_ACCESS_KEY_ID"),
            secret_access_key: var("SKADI_S3_SECRET_ACCESS_KEY"),
            force_path_style: var("SKADI_S3_FORCE_PATH_STYLE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
        };
        builder.durable_config = if s3.is_enabled() {
            DurableConfig::S3(s3)
        } else if let Some(dir) = var("SKADI_DATA_DIR") {
            DurableConfig::Local(PathBuf::from(dir))
        } else {
            DurableConfig::Disabled
        };

        Ok(builder)
    }

    /// Set the sliding TTL of the memory tier.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Bound the memory tier to `max` tiles.
    pub fn max_tiles(mut self, max: u64) -> Self {
        self.max_tiles = max;
        self
    }

    /// Set how many tiles a batch resolves concurrently.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Configure the HTTP origin.
    pub fn origin_config(mut self, config: OriginConfig) -> Self {
        self.origin_config = config;
        self
    }

    /// Point the HTTP origin at another archive, keeping its timeout and retries.
    pub fn origin_url(mut self, base_url: impl Into<String>) -> Self {
        self.origin_config.base_url = base_url.into();
        self
    }

    /// Use a custom origin instead of [`HttpOrigin`].
    pub fn origin(mut self, origin: Arc<dyn TileOrigin>) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Configure the durable tier.
    pub fn durable_config(mut self, config: DurableConfig) -> Self {
        self.durable_config = config;
        self
    }

    /// Use a custom durable store. Takes precedence over [`durable_config`](Self::durable_config).
    pub fn durable(mut self, store: DurableHandle) -> Self {
        self.durable = Some(store);
        self
    }

    /// The durable tier configuration as currently set.
    pub fn durable_settings(&self) -> &DurableConfig {
        &self.durable_config
    }

    /// Build the [`ElevationService`].
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::Config`] for a zero TTL, tile bound or
    /// concurrency, an empty origin URL, or an unbuildable durable tier.
    pub fn build(self) -> Result<ElevationService> {
        if self.ttl.is_zero() {
            return Err(ElevationError::Config("Cache TTL must be positive".to_string()));
        }
        if self.max_tiles == 0 {
            return Err(ElevationError::Config(
                "Cache must hold at least 1 tile".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ElevationError::Config(
                "Concurrency must be at least 1".to_string(),
            ));
        }

        let origin: Arc<dyn TileOrigin> = match self.origin {
            Some(origin) => origin,
            None => Arc::new(HttpOrigin::new(self.origin_config)?),
        };
        let durable = match self.durable {
            Some(store) => Some(store),
            None => self.durable_config.build()?,
        };

        let cache = TileCache::with_capacity(self.ttl, Some(self.max_tiles));
        tracing::debug!(
            ttl_secs = self.ttl.as_secs(),
            max_tiles = self.max_tiles,
            concurrency = self.concurrency,
            durable = durable.as_ref().map(|d| d.name()),
            "elevation service configured"
        );

        let resolver = TileResolver::new(cache, origin, durable);
        Ok(ElevationService::new(resolver, self.concurrency))
    }
}

fn parse_var<T: FromStr>(var: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    var(name)
        .map(|raw| {
            raw.trim().parse().map_err(|_| {
                ElevationError::Config(format!(
                    "{} must be a non-negative integer, got {:?}",
                    name, raw
                ))
            })
        })
        .transpose()
}
