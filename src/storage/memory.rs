//! In-memory `PersistentStore` backed by a DashMap.
//!
//! Used by the demo binary and the test suite. State does not survive a
//! process restart; production deployments plug in a durable store.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use super::PersistentStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            entries: DashMap::new(),
        }
    }

    /// Number of stored keys (test helper)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
