//! Typed local store for one record collection.
//!
//! Holds three keys per collection: the last known snapshot, the pending
//! mutation queue and the last successful sync time. Every read-modify-write
//! on a key runs under that key's async mutex, so concurrent writers queue up
//! instead of overwriting each other. There are no cross-key transactions:
//! callers that touch both snapshot and queue write the snapshot first.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::traits::{KeyValueStore, Record};
use crate::error::AppResult;
use crate::sync::PendingMutation;

/// Storage key names for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
  pub snapshot: String,
  pub queue: String,
  pub last_sync: String,
}

impl StoreKeys {
  pub fn new(namespace: &str, collection: &str) -> Self {
    let prefix = format!("{}:{}", namespace, collection);
    Self {
      snapshot: format!("{}:snapshot", prefix),
      queue: format!("{}:queue", prefix),
      last_sync: format!("{}:last_sync", prefix),
    }
  }
}

/// Summary of local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
  pub last_sync: Option<DateTime<Utc>>,
  pub pending_count: usize,
  pub record_count: usize,
}

pub struct LocalStore<R> {
  kv: Arc<dyn KeyValueStore>,
  keys: StoreKeys,
  snapshot_lock: Mutex<()>,
  queue_lock: Mutex<()>,
  last_sync_lock: Mutex<()>,
  _record: PhantomData<fn() -> R>,
}

impl<R: Record> LocalStore<R> {
  pub fn new(kv: Arc<dyn KeyValueStore>, namespace: &str) -> Self {
    Self {
      kv,
      keys: StoreKeys::new(namespace, R::collection()),
      snapshot_lock: Mutex::new(()),
      queue_lock: Mutex::new(()),
      last_sync_lock: Mutex::new(()),
      _record: PhantomData,
    }
  }

  pub fn keys(&self) -> &StoreKeys {
    &self.keys
  }

  async fn read<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
    match self.kv.get(key).await? {
      Some(value) => Ok(Some(serde_json::from_value(value)?)),
      None => Ok(None),
    }
  }

  async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
    self.kv.set(key, serde_json::to_value(value)?).await?;
    Ok(())
  }

  // ---- snapshot ----

  /// Saved snapshot, or `None` if no snapshot has ever been written.
  pub async fn load_snapshot(&self) -> AppResult<Option<Vec<R>>> {
    self.read(&self.keys.snapshot).await
  }

  /// Saved snapshot, empty when nothing was saved.
  pub async fn get_snapshot(&self) -> AppResult<Vec<R>> {
    Ok(self.load_snapshot().await?.unwrap_or_default())
  }

  /// Replace the whole snapshot.
  pub async fn save_snapshot(&self, records: &[R]) -> AppResult<()> {
    let _guard = self.snapshot_lock.lock().await;
    self.write(&self.keys.snapshot, records).await?;
    debug!(key = %self.keys.snapshot, count = records.len(), "Saved snapshot");
    Ok(())
  }

  /// Insert `record`, replacing any entry with the same id in place.
  pub async fn append_record(&self, record: R) -> AppResult<()> {
    self
      .update_snapshot(move |records| {
        match records.iter().position(|r| r.record_id() == record.record_id()) {
          Some(index) => records[index] = record,
          None => records.push(record),
        }
      })
      .await
  }

  /// Merge `patch` into the record with `id`. Returns the merged record, or
  /// `None` (and writes nothing) when the id is absent.
  pub async fn mutate_record(&self, id: &str, patch: &R::Patch) -> AppResult<Option<R>> {
    let _guard = self.snapshot_lock.lock().await;
    let mut records: Vec<R> = self.read(&self.keys.snapshot).await?.unwrap_or_default();

    let Some(existing) = records.iter_mut().find(|r| r.record_id() == id) else {
      return Ok(None);
    };
    let merged = existing.apply(patch);
    *existing = merged.clone();

    self.write(&self.keys.snapshot, &records).await?;
    Ok(Some(merged))
  }

  /// Remove the record with `id`. Returns whether anything was removed.
  pub async fn remove_record(&self, id: &str) -> AppResult<bool> {
    let _guard = self.snapshot_lock.lock().await;
    let mut records: Vec<R> = self.read(&self.keys.snapshot).await?.unwrap_or_default();

    let before = records.len();
    records.retain(|r| r.record_id() != id);
    if records.len() == before {
      return Ok(false);
    }

    self.write(&self.keys.snapshot, &records).await?;
    Ok(true)
  }

  /// Atomic read-modify-write of the snapshot.
  pub async fn update_snapshot<F, T>(&self, f: F) -> AppResult<T>
  where
    F: FnOnce(&mut Vec<R>) -> T + Send,
  {
    let _guard = self.snapshot_lock.lock().await;
    let mut records: Vec<R> = self.read(&self.keys.snapshot).await?.unwrap_or_default();
    let out = f(&mut records);
    self.write(&self.keys.snapshot, &records).await?;
    Ok(out)
  }

  pub async fn clear_snapshot(&self) -> AppResult<()> {
    let _guard = self.snapshot_lock.lock().await;
    self.kv.remove(&self.keys.snapshot).await?;
    Ok(())
  }

  // ---- queue ----

  pub async fn get_queue(&self) -> AppResult<Vec<PendingMutation<R>>> {
    Ok(self.read(&self.keys.queue).await?.unwrap_or_default())
  }

  pub async fn save_queue(&self, queue: &[PendingMutation<R>]) -> AppResult<()> {
    let _guard = self.queue_lock.lock().await;
    self.write(&self.keys.queue, queue).await
  }

  /// Atomic read-modify-write of the queue.
  pub async fn update_queue<F, T>(&self, f: F) -> AppResult<T>
  where
    F: FnOnce(&mut Vec<PendingMutation<R>>) -> T + Send,
  {
    let _guard = self.queue_lock.lock().await;
    let mut queue: Vec<PendingMutation<R>> =
      self.read(&self.keys.queue).await?.unwrap_or_default();
    let out = f(&mut queue);
    self.write(&self.keys.queue, &queue).await?;
    Ok(out)
  }

  pub async fn clear_queue(&self) -> AppResult<()> {
    let _guard = self.queue_lock.lock().await;
    self.kv.remove(&self.keys.queue).await?;
    Ok(())
  }

  // ---- sync metadata ----

  pub async fn get_last_sync(&self) -> AppResult<Option<DateTime<Utc>>> {
    self.read(&self.keys.last_sync).await
  }

  pub async fn set_last_sync(&self, at: DateTime<Utc>) -> AppResult<()> {
    let _guard = self.last_sync_lock.lock().await;
    self.write(&self.keys.last_sync, &at).await
  }

  pub async fn stats(&self) -> AppResult<StoreStats> {
    Ok(StoreStats {
      last_sync: self.get_last_sync().await?,
      pending_count: self.get_queue().await?.len(),
      record_count: self.get_snapshot().await?.len(),
    })
  }
}

impl<R> std::fmt::Debug for LocalStore<R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LocalStore")
      .field("backend", &self.kv.name())
      .field("keys", &self.keys)
      .finish()
  }
}
