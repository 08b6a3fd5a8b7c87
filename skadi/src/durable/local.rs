//! Local directory durable store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::DurableStore;
use crate::error::{ElevationError, Result};

/// Durable store that keeps tiles under a local directory.
///
/// Keys map directly to relative paths, so `N40/N40W074.hgt.gz` is stored at
/// `<root>/N40/N40W074.hgt.gz`. Writes go to a temporary sibling file that is
/// renamed into place, so a partially written tile is never visible.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path below the root, rejecting traversal.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !valid {
            return Err(ElevationError::DurableTier {
                key: key.to_string(),
                reason: "invalid key path".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(key: &str, e: std::io::Error) -> ElevationError {
    ElevationError::DurableTier {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl DurableStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        fs::try_exists(&path).await.map_err(|e| io_error(key, e))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|e| io_error(key, e))
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, e))?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", std::process::id()));
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, data).await.map_err(|e| io_error(key, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(key, e));
        }
        Ok(())
    }
}
