//! # Skadi - Tiered Elevation Tile Cache
//!
//! Elevation lookups for arbitrary coordinates, backed by 1° × 1° Skadi
//! terrain tiles fetched on demand and cached in tiers.
//!
//! ## Features
//!
//! - **Tiered**: memory (sliding TTL) → optional durable store (S3, local
//!   disk) → origin archive over HTTP
//! - **Single-flight**: concurrent lookups in the same cold tile share one fetch
//! - **Total batches**: a batch always returns one result per point; a point
//!   whose tile can't be produced gets `None` instead of failing the batch
//! - **Bilinear**: sub-sample interpolation between the four surrounding samples
//!
//! ## Quick Start
//!
//! ```no_run
//! use skadi::{ElevationServiceBuilder, LocationData};
//!
//! # #[tokio::main]
//! # async fn main() -> skadi::Result<()> {
//! let service = ElevationServiceBuilder::from_env()?.build()?;
//!
//! let elevation = service
//!     .fetch_elevation(LocationData::new(35.3606, 138.7274))
//!     .await;
//! println!("Mount Fuji: {:?}m", elevation);
//! # Ok(())
//! # }
//! ```
//!
//! ## Tile Format
//!
//! Each tile is a gzip-compressed grid of 3601 × 3601 samples (1 arc-second),
//! stored row-major from the northern edge. Each sample is a 16-bit big-endian
//! signed integer elevation in meters; -32768 marks a void.
//!
//! ## Data Source
//!
//! The default origin is the public terrain archive at
//! <https://s3.amazonaws.com/elevation-tiles-prod/skadi>.

pub mod cache;
pub mod config;
pub mod durable;
pub mod error;
pub mod interpolate;
pub mod key;
pub mod origin;
pub mod resolver;
pub mod service;
pub mod tile;

// Re-export main types at crate root for convenience
pub use cache::{CacheStats, TileCache};
pub use config::ElevationServiceBuilder;
pub use durable::{DurableConfig, DurableStore, S3Config};
pub use error::{ElevationError, Result};
pub use key::TileKey;
pub use origin::{HttpOrigin, OriginConfig, TileOrigin};
pub use resolver::TileResolver;
pub use service::{BoundingBox, ElevationResult, ElevationService, LocationData, PreloadStats};
pub use tile::{Tile, TILE_SIZE, VOID_VALUE};
