//! Run-state persistence — an opaque key-value contract.
//!
//! The gateway persists serialized run state keyed by conversation id
//! whenever a run pauses on tool approvals, and reads it back when a
//! decision request resumes the conversation. The store imposes no
//! schema on values beyond "an opaque string". Writes for the same key
//! are last-writer-wins; there is no optimistic-concurrency check.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ConvoyError, Result};

/// Opaque `get`/`set` interface for serialized run state.
#[async_trait]
pub trait RunStateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
}

/// In-process store, suitable for tests and single-node deployments.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// File-backed store: one file per key under a base directory.
///
/// Writes are atomic (temp file + rename). Keys are restricted to the
/// `conv_<hex>` alphabet so they map directly to file names.
pub struct FileStateStore {
    base: PathBuf,
}

impl FileStateStore {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConvoyError::Store(format!("invalid state key: {key:?}")));
        }
        Ok(self.base.join(format!("{key}.json")))
    }
}

#[async_trait]
impl RunStateStore for FileStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path).await?;
        debug!(key, bytes = data.len(), "Loaded run state");
        Ok(Some(data))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        tokio::fs::create_dir_all(&self.base).await?;
        let path = self.path_for(key)?;
        // Atomic write: write to temp then rename
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, "Saved run state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let store = MemoryStateStore::new();
        assert!(store.get("conv_a").await.unwrap().is_none());
        store.set("conv_a", "state-1".into()).await.unwrap();
        assert_eq!(store.get("conv_a").await.unwrap().as_deref(), Some("state-1"));
        // Last writer wins
        store.set("conv_a", "state-2".into()).await.unwrap();
        assert_eq!(store.get("conv_a").await.unwrap().as_deref(), Some("state-2"));
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf());

        assert!(store.get("conv_abc123").await.unwrap().is_none());
        store.set("conv_abc123", "{\"x\":1}".into()).await.unwrap();
        assert_eq!(
            store.get("conv_abc123").await.unwrap().as_deref(),
            Some("{\"x\":1}")
        );
    }

    #[tokio::test]
    async fn test_file_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf());
        assert!(store.get("../etc/passwd").await.is_err());
        assert!(store.set("a/b", "x".into()).await.is_err());
    }
}
