//! In-memory persistence provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::Result;
use serde_json::Value;
use tokio::sync::RwLock;

use super::traits::KeyValueStore;

/// Stores values in a `HashMap`. Fast but non-persistent; clones share data.
#[derive(Clone, Default)]
pub struct MemoryStore {
  entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of keys currently stored.
  pub async fn len(&self) -> usize {
    self.entries.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.entries.read().await.is_empty()
  }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
  async fn get(&self, key: &str) -> Result<Option<Value>> {
    Ok(self.entries.read().await.get(key).cloned())
  }

  async fn set(&self, key: &str, value: Value) -> Result<()> {
    self.entries.write().await.insert(key.to_string(), value);
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<()> {
    self.entries.write().await.remove(key);
    Ok(())
  }

  fn name(&self) -> &'static str {
    "memory"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn test_set_get_remove() {
    let store = MemoryStore::new();
    assert_eq!(store.get("k").await.unwrap(), None);

    store.set("k", json!({ "a": 1 })).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(json!({ "a": 1 })));
    assert_eq!(store.len().await, 1);

    store.remove("k").await.unwrap();
    store.remove("k").await.unwrap();
    assert!(store.is_empty().await);
  }

  #[tokio::test]
  async fn test_clones_share_entries() {
    let store = MemoryStore::new();
    store.clone().set("k", json!(1)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(json!(1)));
  }
}
