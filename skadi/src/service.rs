//! Batch elevation lookups over the tile resolver.
//!
//! [`ElevationService`] is the public surface of the library: it turns a batch
//! of points into a batch of elevations of the same length and order. Lookups
//! are total; a point whose tile cannot be produced gets the sentinel `None`
//! and the rest of the batch carries on.
//!
//! # Example
//!
//! ```no_run
//! use skadi::{ElevationServiceBuilder, LocationData};
//!
//! # #[tokio::main]
//! # async fn main() -> skadi::Result<()> {
//! let service = ElevationServiceBuilder::new().build()?;
//!
//! let points = [
//!     LocationData::new(35.3606, 138.7274), // Mount Fuji
//!     LocationData::new(27.9881, 86.9250),  // Everest
//! ];
//! for (point, elevation) in points.iter().zip(service.fetch_elevations(&points).await) {
//!     match elevation {
//!         Some(m) => println!("{}, {}: {:.1}m", point.lat, point.lon, m),
//!         None => println!("{}, {}: unavailable", point.lat, point.lon),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use futures::stream::{self, StreamExt};

use crate::cache::CacheStats;
use crate::config::ElevationServiceBuilder;
use crate::interpolate;
use crate::key::TileKey;
use crate::resolver::TileResolver;
use crate::tile::Tile;

/// Default number of tiles resolved concurrently per batch.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Elevation in meters, or `None` when it is unavailable.
///
/// `None` covers every failure for a point: non-finite coordinates, a tile
/// no tier could produce, a corrupt tile, or void samples around the point.
pub type ElevationResult = Option<f64>;

/// A query point in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationData {
    /// Latitude, -90 to 90.
    pub lat: f64,
    /// Longitude, -180 to 180.
    pub lon: f64,
}

impl LocationData {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether both coordinates are finite and within the valid ranges.
    ///
    /// The service itself only requires finite coordinates; range checks are
    /// left to callers.
    pub fn is_valid(&self) -> bool {
        self.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Whether both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Key of the tile containing this point.
    pub fn tile_key(&self) -> TileKey {
        TileKey::from_coords(self.lat, self.lon)
    }
}

impl From<(f64, f64)> for LocationData {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self::new(lat, lon)
    }
}

/// A geographic bounding box for selecting tiles to preload.
///
/// Coordinates are in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum latitude (southern boundary).
    pub min_lat: f64,
    /// Minimum longitude (western boundary).
    pub min_lon: f64,
    /// Maximum latitude (northern boundary).
    pub max_lat: f64,
    /// Maximum longitude (eastern boundary).
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Parse `min_lat,min_lon,max_lat,max_lon`.
    ///
    /// ```
    /// use skadi::BoundingBox;
    ///
    /// let conus = BoundingBox::parse("24,-125,50,-66").unwrap();
    /// assert_eq!(conus.min_lon, -125.0);
    /// assert!(BoundingBox::parse("1,2,3").is_none());
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<_>>()?;
        match parts[..] {
            [min_lat, min_lon, max_lat, max_lon] => {
                let bounds = Self::new(min_lat, min_lon, max_lat, max_lon);
                bounds.is_valid().then_some(bounds)
            }
            _ => None,
        }
    }

    /// Whether the box is finite and its minimums do not exceed its maximums.
    pub fn is_valid(&self) -> bool {
        [self.min_lat, self.min_lon, self.max_lat, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
    }

    /// Check if this bounding box overlaps a tile.
    ///
    /// A tile covers `[lat_band, lat_band+1) × [lon_band, lon_band+1)`.
    pub fn overlaps_tile(&self, key: &TileKey) -> bool {
        let (tile_lat, tile_lon) = (key.lat_band as f64, key.lon_band as f64);

        self.min_lat < tile_lat + 1.0
            && self.max_lat > tile_lat
            && self.min_lon < tile_lon + 1.0
            && self.max_lon > tile_lon
    }

    /// Keys of every tile overlapping the box, south-west first.
    pub fn tiles(&self) -> impl Iterator<Item = TileKey> + '_ {
        let lat_bands = band_range(self.min_lat, self.max_lat, -90, 89);
        let lon_bands = band_range(self.min_lon, self.max_lon, -180, 179);

        lat_bands
            .flat_map(move |lat| lon_bands.clone().map(move |lon| TileKey::new(lat, lon)))
            .filter(|key| self.overlaps_tile(key))
    }
}

fn band_range(min: f64, max: f64, lowest: i32, highest: i32) -> std::ops::RangeInclusive<i32> {
    let (low, high) = if min.is_finite() && max.is_finite() && min <= max {
        (
            (min.floor() as i32).clamp(lowest, highest),
            (max.floor() as i32).clamp(lowest, highest),
        )
    } else {
        // Empty
        (highest, lowest)
    };
    low..=high
}

/// Statistics from a preload operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadStats {
    /// Number of tiles overlapping at least one bounding box.
    pub tiles_matched: u64,
    /// Number of tiles resolved into the memory tier.
    pub tiles_loaded: u64,
    /// Number of tiles that were already resident.
    pub tiles_already_cached: u64,
    /// Number of tiles no tier could produce.
    pub tiles_failed: u64,
    /// Total elapsed time in milliseconds.
    pub elapsed_ms: u64,
}

/// Elevation lookups backed by the tiered tile resolver.
///
/// Cloning is cheap and clones share the same tiers.
#[derive(Clone)]
pub struct ElevationService {
    resolver: TileResolver,
    concurrency: usize,
}

impl ElevationService {
    /// Create a service over an existing resolver.
    ///
    /// A `concurrency` of zero is treated as one.
    pub fn new(resolver: TileResolver, concurrency: usize) -> Self {
        Self {
            resolver,
            concurrency: concurrency.max(1),
        }
    }

    /// Create a builder with default settings.
    pub fn builder() -> ElevationServiceBuilder {
        ElevationServiceBuilder::new()
    }

    /// Elevations for a batch of points, in input order.
    ///
    /// Points are grouped by tile so each tile is resolved once per batch, and
    /// up to the configured concurrency of tiles are resolved at a time. A
    /// failure for one tile only affects the points inside it. Points with a
    /// non-finite coordinate get `None` without touching any tier.
    pub async fn fetch_elevations(&self, points: &[LocationData]) -> Vec<ElevationResult> {
        let mut results = vec![None; points.len()];
        let resolver = &self.resolver;

        // A group's tile is released as soon as its points are answered.
        let answered: Vec<_> = stream::iter(group_by_tile(points))
            .map(|(key, indices)| async move {
                match resolver.resolve(key).await {
                    Ok(tile) => answer_group(&tile, points, indices),
                    Err(e) => {
                        tracing::warn!(key = %key, points = indices.len(), error = %e, "tile unavailable");
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (i, elevation) in answered.into_iter().flatten() {
            results[i] = elevation;
        }

        results
    }

    /// Elevation for a single point.
    pub async fn fetch_elevation(&self, point: LocationData) -> ElevationResult {
        self.fetch_elevations(&[point]).await.pop().flatten()
    }

    /// Elevations for a batch of points, substituting `default` for unavailable ones.
    pub async fn fetch_elevations_or(&self, points: &[LocationData], default: f64) -> Vec<f64> {
        self.fetch_elevations(points)
            .await
            .into_iter()
            .map(|e| e.unwrap_or(default))
            .collect()
    }

    /// Elevations from the memory tier only. Never waits on I/O.
    ///
    /// Points whose tile is not resident get `None`, and a background
    /// resolution is started for that tile (when called inside a tokio
    /// runtime) so that a later call can answer them. Nothing reports when
    /// that resolution completes.
    pub fn fetch_elevations_cached(&self, points: &[LocationData]) -> Vec<ElevationResult> {
        let mut results = vec![None; points.len()];

        for (key, indices) in group_by_tile(points) {
            match self.resolver.resolve_cached(&key) {
                Some(tile) => {
                    for (i, elevation) in answer_group(&tile, points, indices) {
                        results[i] = elevation;
                    }
                }
                None => {
                    self.resolver.prefetch(key);
                }
            }
        }

        results
    }

    /// Resolve every tile overlapping the given boxes into the memory tier.
    pub async fn preload(&self, bounds: &[BoundingBox]) -> PreloadStats {
        let start = Instant::now();
        let mut stats = PreloadStats::default();

        let keys: BTreeSet<TileKey> = bounds.iter().flat_map(|b| b.tiles()).collect();
        stats.tiles_matched = keys.len() as u64;

        let (cached, pending): (Vec<_>, Vec<_>) = keys
            .into_iter()
            .partition(|key| self.resolver.cache().contains(key));
        stats.tiles_already_cached = cached.len() as u64;

        let resolver = &self.resolver;
        let outcomes: Vec<_> = stream::iter(pending)
            .map(|key| async move { (key, resolver.resolve(key).await.map(|_| ())) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (key, outcome) in outcomes {
            match outcome {
                Ok(()) => stats.tiles_loaded += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "preload failed");
                    stats.tiles_failed += 1;
                }
            }
        }

        stats.elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            matched = stats.tiles_matched,
            loaded = stats.tiles_loaded,
            cached = stats.tiles_already_cached,
            failed = stats.tiles_failed,
            elapsed_ms = stats.elapsed_ms,
            "preload complete"
        );
        stats
    }

    /// Memory tier statistics.
    pub fn stats(&self) -> CacheStats {
        self.resolver.stats()
    }

    /// Drop every tile from the memory tier. The durable tier is untouched.
    pub fn clear(&self) {
        self.resolver.cache().clear();
    }

    /// The underlying resolver.
    pub fn resolver(&self) -> &TileResolver {
        &self.resolver
    }

    /// Maximum number of tiles resolved concurrently per batch.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

/// Group point indices by tile key. Non-finite points are left out, since
/// they have no tile.
fn group_by_tile(points: &[LocationData]) -> BTreeMap<TileKey, Vec<usize>> {
    let mut groups: BTreeMap<TileKey, Vec<usize>> = BTreeMap::new();
    for (i, point) in points.iter().enumerate() {
        if point.is_finite() {
            groups.entry(point.tile_key()).or_default().push(i);
        }
    }
    groups
}

fn answer_group(
    tile: &Tile,
    points: &[LocationData],
    indices: Vec<usize>,
) -> Vec<(usize, ElevationResult)> {
    indices
        .into_iter()
        .map(|i| (i, interpolate::bilinear(tile, points[i].lat, points[i].lon)))
        .collect()
}
