//! Core traits for local persistence.

use async_trait::async_trait;
use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Trait for entities held in the local store.
///
/// Implementors provide a stable identifier and a partial-update type that
/// can be merged into an existing value.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Partial update applied by `mutate_record`.
  type Patch: Clone + Send + Sync + Serialize + DeserializeOwned;

  /// Stable identifier.
  fn record_id(&self) -> &str;

  /// Replace the identifier, e.g. once the server assigns a permanent one.
  fn set_record_id(&mut self, id: &str);

  /// Copy of `self` with `patch` merged in.
  fn apply(&self, patch: &Self::Patch) -> Self;

  /// Collection name used to namespace storage keys (e.g. "pins").
  fn collection() -> &'static str;
}

/// Persistence provider: async get/set/remove of JSON values by key.
///
/// Each call touches a single key; there are no cross-key transactions.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
  /// Value under `key`, or `None` if never written (or removed).
  async fn get(&self, key: &str) -> Result<Option<Value>>;

  /// Replace the value under `key`.
  async fn set(&self, key: &str, value: Value) -> Result<()>;

  /// Delete `key`; deleting a missing key is not an error.
  async fn remove(&self, key: &str) -> Result<()>;

  /// Backend name for diagnostics.
  fn name(&self) -> &'static str;
}
