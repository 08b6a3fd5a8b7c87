//! Tile resolution through the tier chain.
//!
//! [`TileResolver`] produces a decoded tile for a key by trying, in order:
//!
//! 1. the memory tier ([`TileCache`]),
//! 2. the durable tier, if configured,
//! 3. the origin archive.
//!
//! A miss in a faster tier is filled from the slower one: durable hits
//! populate memory, origin hits populate memory and are written through to
//! the durable tier on a best-effort basis.
//!
//! # Single-flight
//!
//! At most one tier chain runs per key. The first caller to miss spawns the
//! chain as a task and registers a shared handle to its outcome; every other
//! caller for the same key awaits that same handle, so all of them receive
//! the same tile (or the same error). The task removes its own registry
//! entry when it finishes, whether it succeeds, fails or is torn down.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::cache::{CacheStats, TileCache};
use crate::durable::DurableHandle;
use crate::error::{ElevationError, Result};
use crate::key::TileKey;
use crate::origin::TileOrigin;
use crate::tile::Tile;

type Resolution = Shared<BoxFuture<'static, Result<Arc<Tile>>>>;

/// Resolves tile keys to decoded tiles across the memory, durable and origin tiers.
///
/// Cloning is cheap; clones share the same cache and in-flight registry.
#[derive(Clone)]
pub struct TileResolver {
    inner: Arc<Inner>,
}

struct Inner {
    cache: TileCache,
    durable: Option<DurableHandle>,
    origin: Arc<dyn TileOrigin>,
    in_flight: Mutex<HashMap<TileKey, Resolution>>,
}

/// Removes a key from the in-flight registry when the owning task ends.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: TileKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.key);
    }
}

impl TileResolver {
    /// Create a resolver over the given tiers.
    pub fn new(
        cache: TileCache,
        origin: Arc<dyn TileOrigin>,
        durable: Option<DurableHandle>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                durable,
                origin,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Resolve a tile, waiting for the slower tiers if needed.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ElevationError::TileUnavailable`] if neither the durable tier nor
    ///   the origin could produce the tile.
    /// - [`ElevationError::CorruptTile`] if the origin served an undecodable payload.
    pub async fn resolve(&self, key: TileKey) -> Result<Arc<Tile>> {
        if let Some(tile) = self.inner.cache.get(&key) {
            return Ok(tile);
        }
        self.join_or_start(key).await
    }

    /// Return the tile only if it is already resident in memory.
    pub fn resolve_cached(&self, key: &TileKey) -> Option<Arc<Tile>> {
        self.inner.cache.get(key)
    }

    /// Start resolving a tile in the background unless it is resident or
    /// already in flight.
    ///
    /// Returns `false` without doing anything when called outside a tokio
    /// runtime, since there is nowhere to run the fetch.
    pub fn prefetch(&self, key: TileKey) -> bool {
        if self.inner.cache.contains(&key) {
            return true;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::debug!(key = %key, "no runtime, skipping background fetch");
            return false;
        }
        // The chain runs in its own task; dropping the handle doesn't cancel it.
        drop(self.join_or_start(key));
        true
    }

    /// Number of resolutions currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Memory tier statistics, including the in-flight count.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            in_flight: self.in_flight() as u64,
            ..self.inner.cache.stats()
        }
    }

    /// The memory tier.
    pub fn cache(&self) -> &TileCache {
        &self.inner.cache
    }

    /// Whether a durable tier is configured.
    pub fn has_durable(&self) -> bool {
        self.inner.durable.is_some()
    }

    fn join_or_start(&self, key: TileKey) -> Resolution {
        let mut in_flight = self.inner.in_flight.lock();

        if let Some(pending) = in_flight.get(&key) {
            tracing::debug!(key = %key, "joining in-flight resolution");
            return pending.clone();
        }

        // A chain may have finished between the caller's miss and taking the lock;
        // its tile is cached before its registry entry goes away.
        if let Some(tile) = self.inner.cache.peek(&key) {
            return futures::future::ready(Ok(tile)).boxed().shared();
        }

        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            key,
        };
        let handle = tokio::spawn(async move {
            let result = guard.inner.fetch_chain(key).await;
            drop(guard);
            result
        });

        let resolution = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(ElevationError::TileUnavailable {
                    key: key.encode(),
                    reason: format!("resolution task failed: {}", e),
                }),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key, resolution.clone());
        resolution
    }
}

impl Inner {
    async fn fetch_chain(&self, key: TileKey) -> Result<Arc<Tile>> {
        let encoded = key.encode();

        if let Some(store) = &self.durable {
            match self.from_durable(store, key, &encoded).await {
                Ok(Some(tile)) => {
                    tracing::debug!(key = %key, tier = store.name(), "durable tier hit");
                    self.cache.put(key, Arc::clone(&tile));
                    return Ok(tile);
                }
                Ok(None) => {
                    tracing::debug!(key = %key, tier = store.name(), "durable tier miss");
                }
                Err(e) => {
                    tracing::warn!(key = %key, tier = store.name(), error = %e, "durable tier read failed, falling back to origin");
                }
            }
        }

        let compressed = self.origin.fetch(&key).await.map_err(|e| {
            tracing::warn!(key = %key, error = %e, "origin fetch failed");
            ElevationError::TileUnavailable {
                key: encoded.clone(),
                reason: e.to_string(),
            }
        })?;

        let (tile, compressed) = decode_blocking(key, compressed).await?;
        self.cache.put(key, Arc::clone(&tile));
        tracing::debug!(key = %key, "origin tile cached");

        if let Some(store) = &self.durable {
            if let Err(e) = store.put(&encoded, &compressed).await {
                tracing::warn!(key = %key, tier = store.name(), error = %e, "durable tier write-through failed");
            }
        }

        Ok(tile)
    }

    async fn from_durable(
        &self,
        store: &DurableHandle,
        key: TileKey,
        encoded: &str,
    ) -> Result<Option<Arc<Tile>>> {
        if !store.exists(encoded).await? {
            return Ok(None);
        }
        let compressed = store.get(encoded).await?;
        let (tile, _) = decode_blocking(key, compressed).await?;
        Ok(Some(tile))
    }
}

/// Decode on the blocking pool, handing the compressed bytes back for reuse.
async fn decode_blocking(key: TileKey, compressed: Vec<u8>) -> Result<(Arc<Tile>, Vec<u8>)> {
    tokio::task::spawn_blocking(move || {
        Tile::decode(key, &compressed).map(|tile| (Arc::new(tile), compressed))
    })
    .await
    .map_err(|e| ElevationError::CorruptTile {
        key: key.encode(),
        reason: format!("decode task failed: {}", e),
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::durable::{DurableStore, MemoryStore};

    /// Origin serving synthetic tiles, counting fetches per call.
    struct CountingOrigin {
        fetches: AtomicUsize,
        delay: Duration,
        payload: Option<Vec<u8>>,
    }

    impl CountingOrigin {
        fn serving(tile: &Tile, delay: Duration) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                delay,
                payload: Some(tile.encode_gz().unwrap()),
            }
        }

        fn failing() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                delay: Duration::ZERO,
                payload: None,
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TileOrigin for CountingOrigin {
        async fn fetch(&self, key: &TileKey) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.payload.clone().ok_or_else(|| ElevationError::Origin {
                key: key.encode(),
                reason: "HTTP 404 Not Found".to_string(),
            })
        }
    }

    fn key() -> TileKey {
        TileKey::new(40, -75)
    }

    #[tokio::test]
    async fn test_origin_miss_populates_memory() {
        let tile = Tile::filled(key(), 42);
        let origin = Arc::new(CountingOrigin::serving(&tile, Duration::ZERO));
        let resolver = TileResolver::new(TileCache::default(), origin.clone(), None);

        let first = resolver.resolve(key()).await.unwrap();
        assert_eq!(first.sample(0, 0), 42);
        assert!(resolver.cache().contains(&key()));

        let second = resolver.resolve(key()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(origin.fetches(), 1);
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_fetch_once() {
        let tile = Tile::filled(key(), 7);
        let origin = Arc::new(CountingOrigin::serving(&tile, Duration::from_millis(200)));
        let resolver = TileResolver::new(TileCache::default(), origin.clone(), None);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve(key()).await })
            })
            .collect();

        let mut tiles = Vec::new();
        for task in tasks {
            tiles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(origin.fetches(), 1);
        assert!(tiles.iter().all(|t| Arc::ptr_eq(t, &tiles[0])));
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_is_registered_while_fetching() {
        let tile = Tile::filled(key(), 1);
        let origin = Arc::new(CountingOrigin::serving(&tile, Duration::from_millis(200)));
        let resolver = TileResolver::new(TileCache::default(), origin.clone(), None);

        assert!(resolver.prefetch(key()));
        assert_eq!(resolver.in_flight(), 1);
        assert_eq!(resolver.stats().in_flight, 1);

        // Joins the prefetch instead of starting a second chain
        let tile = resolver.resolve(key()).await.unwrap();
        assert_eq!(tile.sample(5, 5), 1);
        assert_eq!(origin.fetches(), 1);
        assert_eq!(resolver.in_flight(), 0);
    }

    #[test]
    fn test_prefetch_outside_runtime_is_skipped() {
        let tile = Tile::filled(key(), 1);
        let origin = Arc::new(CountingOrigin::serving(&tile, Duration::ZERO));
        let resolver = TileResolver::new(TileCache::default(), origin.clone(), None);

        assert!(!resolver.prefetch(key()));
        assert_eq!(resolver.in_flight(), 0);
        assert_eq!(origin.fetches(), 0);
    }

    #[tokio::test]
    async fn test_origin_failure_is_unavailable_and_deregistered() {
        let origin = Arc::new(CountingOrigin::failing());
        let resolver = TileResolver::new(TileCache::default(), origin.clone(), None);

        let result = resolver.resolve(key()).await;
        match result {
            Err(ElevationError::TileUnavailable { key: k, reason }) => {
                assert_eq!(k, "N40/N40W075.hgt.gz");
                assert!(reason.contains("404"));
            }
            other => panic!("Expected TileUnavailable, got {:?}", other),
        }
        assert_eq!(resolver.in_flight(), 0);
        assert!(!resolver.cache().contains(&key()));

        // A later call retries rather than reusing the failure
        let _ = resolver.resolve(key()).await;
        assert_eq!(origin.fetches(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_origin_payload() {
        let origin = Arc::new(CountingOrigin {
            fetches: AtomicUsize::new(0),
            delay: Duration::ZERO,
            payload: Some(b"not a tile".to_vec()),
        });
        let resolver = TileResolver::new(TileCache::default(), origin, None);

        let result = resolver.resolve(key()).await;
        assert!(matches!(result, Err(ElevationError::CorruptTile { .. })));
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_durable_hit_skips_origin() {
        let tile = Tile::filled(key(), 300);
        let store = Arc::new(MemoryStore::with_objects([(
            key().encode(),
            tile.encode_gz().unwrap(),
        )]));
        let origin = Arc::new(CountingOrigin::failing());
        let resolver = TileResolver::new(
            TileCache::default(),
            origin.clone(),
            Some(store.clone() as DurableHandle),
        );

        let resolved = resolver.resolve(key()).await.unwrap();
        assert_eq!(resolved.sample(100, 100), 300);
        assert_eq!(origin.fetches(), 0);
        assert_eq!(store.reads(), 1);
        assert!(resolver.cache().contains(&key()));
        assert!(resolver.has_durable());
    }

    #[tokio::test]
    async fn test_origin_writes_through_to_durable() {
        let tile = Tile::from_fn(key(), |row, col| (row % 100 + col % 7) as i16);
        let origin = Arc::new(CountingOrigin::serving(&tile, Duration::ZERO));
        let store = Arc::new(MemoryStore::default());
        let resolver = TileResolver::new(
            TileCache::default(),
            origin.clone(),
            Some(store.clone() as DurableHandle),
        );

        let from_origin = resolver.resolve(key()).await.unwrap();
        assert_eq!(store.writes(), 1);

        // The stored blob decodes to the same grid
        let blob = store.get(&key().encode()).await.unwrap();
        let from_durable = Tile::decode(key(), &blob).unwrap();
        assert!(*from_origin == from_durable);

        // After the memory tier is cleared, the durable tier serves it
        resolver.cache().clear();
        let again = resolver.resolve(key()).await.unwrap();
        assert!(*again == from_durable);
        assert_eq!(origin.fetches(), 1);
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn test_write_through_failure_is_swallowed() {
        let tile = Tile::filled(key(), 9);
        let origin = Arc::new(CountingOrigin::serving(&tile, Duration::ZERO));
        let store: DurableHandle = Arc::new(MemoryStore::failing_writes());
        let resolver = TileResolver::new(TileCache::default(), origin, Some(store));

        let resolved = resolver.resolve(key()).await.unwrap();
        assert_eq!(resolved.sample(0, 0), 9);
    }

    #[tokio::test]
    async fn test_corrupt_durable_blob_falls_back_to_origin() {
        let tile = Tile::filled(key(), 55);
        let store = Arc::new(MemoryStore::with_objects([(key().encode(), b"junk".to_vec())]));
        let origin = Arc::new(CountingOrigin::serving(&tile, Duration::ZERO));
        let resolver = TileResolver::new(
            TileCache::default(),
            origin.clone(),
            Some(store.clone() as DurableHandle),
        );

        let resolved = resolver.resolve(key()).await.unwrap();
        assert_eq!(resolved.sample(0, 0), 55);
        assert_eq!(origin.fetches(), 1);

        // The bad blob was replaced by the origin payload
        let blob = store.get(&key().encode()).await.unwrap();
        assert!(Tile::decode(key(), &blob).is_ok());
    }
}
