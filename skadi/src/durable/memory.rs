//! In-memory durable store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::DurableStore;
use crate::error::{ElevationError, Result};

/// Durable store backed by a `HashMap`.
///
/// Useful in tests and for embedding without external storage. Reads and
/// writes are counted so callers can assert which tier served a tile.
/// A store built with [`MemoryStore::failing_writes`] rejects every `put`.
///
/// # Example
///
/// ```
/// use skadi::durable::{DurableStore, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> skadi::Result<()> {
/// let store = MemoryStore::default();
/// store.put("N35/N35E138.hgt.gz", b"payload").await?;
/// assert!(store.exists("N35/N35E138.hgt.gz").await?);
/// assert_eq!(store.get("N35/N35E138.hgt.gz").await?, b"payload");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    fail_writes: bool,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create a store pre-populated with objects.
    pub fn with_objects(
        objects: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>,
    ) -> Self {
        let objects = objects
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            objects: RwLock::new(objects),
            ..Default::default()
        }
    }

    /// Create an empty store whose writes always fail.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    /// Number of successful `get` calls.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of successful `put` calls.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let data = self
            .objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ElevationError::DurableTier {
                key: key.to_string(),
                reason: "object not found".to_string(),
            })?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(data)
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(ElevationError::DurableTier {
                key: key.to_string(),
                reason: "writes disabled".to_string(),
            });
        }
        self.objects.write().insert(key.to_string(), data.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
