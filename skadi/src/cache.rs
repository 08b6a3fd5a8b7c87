//! In-memory tile cache with sliding expiration.
//!
//! [`TileCache`] is the fast tier of the resolution chain. Every entry expires
//! after the configured TTL **without access**: each `get` hit and each `put`
//! restarts that entry's countdown. Expiry is checked lazily on access and
//! expired entries are swept by moka's housekeeping, so no per-entry timer
//! callback outlives its entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::key::TileKey;
use crate::tile::Tile;

/// Default sliding TTL: one hour.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default bound on resident tiles. A decoded tile is about 26 MB.
pub const DEFAULT_MAX_TILES: u64 = 100;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of tiles currently resident in memory.
    pub resident: u64,
    /// Number of tiles currently being resolved from a slower tier.
    pub in_flight: u64,
    /// Number of cache hits (requests served from memory).
    pub hit_count: u64,
    /// Number of cache misses.
    pub miss_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// Memory tier mapping tile keys to decoded tiles.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use skadi::{Tile, TileCache, TileKey};
///
/// let cache = TileCache::new(Duration::from_secs(60));
/// let key = TileKey::new(35, 138);
///
/// cache.put(key, Arc::new(Tile::filled(key, 0)));
/// assert!(cache.get(&key).is_some());
///
/// cache.evict(&key);
/// assert!(cache.get(&key).is_none());
/// ```
pub struct TileCache {
    tiles: Cache<TileKey, Arc<Tile>>,
    ttl: Duration,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl TileCache {
    /// Create an unbounded cache with the given sliding TTL.
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, None)
    }

    /// Create a cache with the given sliding TTL and an optional maximum
    /// number of resident tiles.
    pub fn with_capacity(ttl: Duration, max_tiles: Option<u64>) -> Self {
        let mut builder = Cache::builder().time_to_idle(ttl);
        if let Some(max) = max_tiles {
            builder = builder.max_capacity(max);
        }

        Self {
            tiles: builder.build(),
            ttl,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// Look up a tile, refreshing its expiration on a hit.
    pub fn get(&self, key: &TileKey) -> Option<Arc<Tile>> {
        match self.tiles.get(key) {
            Some(tile) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %key, "memory tier hit");
                Some(tile)
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %key, "memory tier miss");
                None
            }
        }
    }

    /// Look up a tile without touching the hit/miss counters.
    pub fn peek(&self, key: &TileKey) -> Option<Arc<Tile>> {
        self.tiles.get(key)
    }

    /// Whether a tile is resident, without touching its expiration or counters.
    pub fn contains(&self, key: &TileKey) -> bool {
        self.tiles.contains_key(key)
    }

    /// Insert (or replace) a tile and start its countdown.
    pub fn put(&self, key: TileKey, tile: Arc<Tile>) {
        self.tiles.insert(key, tile);
    }

    /// Remove a tile.
    pub fn evict(&self, key: &TileKey) {
        self.tiles.invalidate(key);
    }

    /// Remove every tile.
    pub fn clear(&self) {
        self.tiles.invalidate_all();
        self.tiles.run_pending_tasks();
    }

    /// Number of resident tiles, after sweeping expired entries.
    pub fn resident(&self) -> u64 {
        self.tiles.run_pending_tasks();
        self.tiles.entry_count()
    }

    /// The sliding TTL applied to every entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The configured maximum number of tiles, if bounded.
    pub fn capacity(&self) -> Option<u64> {
        self.tiles.policy().max_capacity()
    }

    /// Snapshot of the cache counters. `in_flight` is filled in by the resolver.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resident: self.resident(),
            in_flight: 0,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TTL, Some(DEFAULT_MAX_TILES))
    }
}
