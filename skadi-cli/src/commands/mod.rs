pub mod batch;
pub mod key;
pub mod query;

use anyhow::{Context, Result};
use skadi::{DurableConfig, ElevationService, ElevationServiceBuilder};

use crate::TierArgs;

/// Build the service from `SKADI_*` variables, then apply command-line overrides.
pub fn build_service(tiers: &TierArgs) -> Result<ElevationService> {
    let mut builder =
        ElevationServiceBuilder::from_env().context("Invalid SKADI_* environment variable")?;

    if let Some(url) = &tiers.origin_url {
        builder = builder.origin_url(url.clone());
    }
    if let Some(dir) = &tiers.data_dir {
        // An S3 tier configured in the environment takes precedence
        if !matches!(builder.durable_settings(), DurableConfig::S3(_)) {
            builder = builder.durable_config(DurableConfig::Local(dir.clone()));
        }
    }
    if let Some(concurrency) = tiers.concurrency {
        builder = builder.concurrency(concurrency);
    }

    builder.build().context("Failed to create elevation service")
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}
