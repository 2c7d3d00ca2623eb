//! Pin repository: the facade the application calls.
//!
//! Every operation consults the connectivity predicate first. Online calls
//! go to the remote and write through to the local snapshot; failed or
//! offline writes land in the snapshot and the sync queue so the view stays
//! consistent until `flush` delivers them. Local writes are serialized:
//! each writes the snapshot, then the queue, before the next one starts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::connectivity::Connectivity;
use super::remote::PinRemote;
use super::types::{Pin, PinPatch, LOCAL_ID_PREFIX};
use crate::config::Config;
use crate::error::{AppError, AppResult, ErrorCode, ErrorReporter};
use crate::store::{KeyValueStore, LocalStore, Record, StoreStats};
use crate::sync::{
  Delivered, DrainReport, MutationAction, MutationSender, PendingMutation, SyncQueue,
};

pub struct PinRepository {
  remote: Arc<dyn PinRemote>,
  store: Arc<LocalStore<Pin>>,
  queue: SyncQueue<Pin>,
  connectivity: Arc<dyn Connectivity>,
  reporter: ErrorReporter,
  offline_enabled: bool,
  local_writes: Mutex<()>,
  flush_lock: Mutex<()>,
}

impl PinRepository {
  pub fn new(
    remote: Arc<dyn PinRemote>,
    store: Arc<LocalStore<Pin>>,
    connectivity: Arc<dyn Connectivity>,
  ) -> Self {
    Self {
      remote,
      queue: SyncQueue::new(store.clone()),
      store,
      connectivity,
      reporter: ErrorReporter::new(),
      offline_enabled: true,
      local_writes: Mutex::new(()),
      flush_lock: Mutex::new(()),
    }
  }

  /// Build a repository using the `offline` section of `config`.
  pub fn from_config(
    config: &Config,
    remote: Arc<dyn PinRemote>,
    kv: Arc<dyn KeyValueStore>,
    connectivity: Arc<dyn Connectivity>,
  ) -> Self {
    let store = Arc::new(LocalStore::new(kv, &config.offline.namespace));
    Self::new(remote, store, connectivity)
      .with_offline_enabled(config.offline.enabled)
      .with_max_retries(config.offline.max_retries)
  }

  pub fn with_offline_enabled(mut self, enabled: bool) -> Self {
    self.offline_enabled = enabled;
    self
  }

  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.queue = SyncQueue::new(self.store.clone()).with_max_retries(max_retries);
    self
  }

  pub fn with_reporter(mut self, reporter: ErrorReporter) -> Self {
    self.reporter = reporter;
    self
  }

  pub fn reporter(&self) -> &ErrorReporter {
    &self.reporter
  }

  pub fn queue(&self) -> &SyncQueue<Pin> {
    &self.queue
  }

  pub fn store(&self) -> &LocalStore<Pin> {
    &self.store
  }

  fn is_online(&self) -> bool {
    self.connectivity.is_online()
  }

  fn report(&self, err: AppError, operation: &str) -> AppError {
    self
      .reporter
      .handle(err, &format!("PinRepository.{}", operation))
  }

  /// Run a local store step, reporting its failure under `operation`.
  async fn local<T>(
    &self,
    operation: &str,
    step: impl std::future::Future<Output = AppResult<T>>,
  ) -> AppResult<T> {
    step.await.map_err(|err| self.report(err, operation))
  }

  /// Snapshot first, queue second.
  async fn write_and_enqueue(
    &self,
    operation: &str,
    pin: Pin,
    action: MutationAction,
  ) -> AppResult<()> {
    let _writes = self.local_writes.lock().await;
    match action {
      MutationAction::Create | MutationAction::Update => {
        self.local(operation, self.store.append_record(pin.clone())).await?
      }
      MutationAction::Delete => {
        self.local(operation, self.store.remove_record(&pin.id)).await?;
      }
    }
    self.local(operation, self.queue.enqueue(pin, action)).await?;
    Ok(())
  }

  /// Merge `patch` into the stored pin and queue the merged value.
  ///
  /// The merge reads the snapshot under its lock, so overlapping updates
  /// build on each other.
  async fn patch_and_enqueue(&self, operation: &str, id: &str, patch: &PinPatch) -> AppResult<Pin> {
    let _writes = self.local_writes.lock().await;
    let now = Utc::now();
    let merged = self
      .local(
        operation,
        self.store.update_snapshot(|pins| {
          pins.iter_mut().find(|p| p.id == id).map(|pin| {
            *pin = pin.apply(patch);
            pin.updated_at = Some(now);
            pin.clone()
          })
        }),
      )
      .await?
      .ok_or_else(|| self.not_found(id, operation))?;

    self
      .local(operation, self.queue.enqueue(merged.clone(), MutationAction::Update))
      .await?;
    Ok(merged)
  }

  fn not_found(&self, id: &str, operation: &str) -> AppError {
    self.report(AppError::not_found(format!("Pin with id {} not found", id)), operation)
  }

  /// Whether a write of `action` should go to the network now.
  ///
  /// Writes the remote cannot handle stay local while offline mode is on;
  /// with it off there is nowhere else to go, so the remote's error surfaces.
  fn use_network(&self, action: MutationAction) -> bool {
    self.is_online() && (self.remote.supports(action) || !self.offline_enabled)
  }

  fn offline_refusal(&self, message: &str, operation: &str) -> AppError {
    self.report(
      AppError::operational(ErrorCode::OfflineModeDisabled, message),
      operation,
    )
  }

  /// All pins. Online results replace the snapshot; on failure the snapshot
  /// is returned when one exists.
  pub async fn list(&self) -> AppResult<Vec<Pin>> {
    const OP: &str = "list";

    if !self.is_online() {
      if self.offline_enabled {
        return self.local(OP, self.store.get_snapshot()).await;
      }
      return Err(self.report(
        AppError::operational(
          ErrorCode::NoOfflineData,
          "No internet connection and offline mode disabled",
        ),
        OP,
      ));
    }

    match self.remote.list().await {
      Ok(pins) => {
        if self.offline_enabled {
          self.local(OP, self.store.save_snapshot(&pins)).await?;
        }
        Ok(pins)
      }
      Err(err) => {
        let err = self.report(err, OP);
        if self.offline_enabled {
          if let Some(snapshot) = self.local(OP, self.store.load_snapshot()).await? {
            debug!(count = snapshot.len(), "Serving pins from local snapshot");
            return Ok(snapshot);
          }
        }
        Err(err)
      }
    }
  }

  /// Pin with `id` from the current `list()` result.
  pub async fn get_by_id(&self, id: &str) -> AppResult<Option<Pin>> {
    Ok(self.list().await?.into_iter().find(|p| p.id == id))
  }

  /// Create `pin`. A pin without an id gets a local one.
  pub async fn create(&self, pin: Pin) -> AppResult<Pin> {
    const OP: &str = "create";

    let mut pin = pin;
    if pin.id.is_empty() {
      pin.id = format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4().simple());
    }
    let now = Utc::now();
    pin.created_at.get_or_insert(now);
    pin.updated_at.get_or_insert(now);

    if self.use_network(MutationAction::Create) {
      return match self.remote.create(&pin).await {
        Ok(created) => {
          if self.offline_enabled {
            self.local(OP, self.store.append_record(created.clone())).await?;
          }
          Ok(created)
        }
        Err(err) => {
          let err = self.report(err, OP);
          if self.offline_enabled {
            self.write_and_enqueue(OP, pin, MutationAction::Create).await?;
          }
          Err(err)
        }
      };
    }

    if !self.offline_enabled {
      return Err(self.offline_refusal("Cannot create pin offline", OP));
    }

    self
      .write_and_enqueue(OP, pin.clone(), MutationAction::Create)
      .await?;
    Ok(pin)
  }

  /// Merge `patch` into the pin with `id` and return the result.
  pub async fn update(&self, id: &str, patch: PinPatch) -> AppResult<Pin> {
    const OP: &str = "update";

    let current = self
      .get_by_id(id)
      .await?
      .ok_or_else(|| self.not_found(id, OP))?;

    if self.use_network(MutationAction::Update) {
      let mut merged = current.apply(&patch);
      merged.updated_at = Some(Utc::now());

      return match self.remote.update(&merged).await {
        Ok(saved) => {
          if self.offline_enabled {
            self.local(OP, self.store.append_record(saved.clone())).await?;
          }
          Ok(saved)
        }
        Err(err) => {
          let err = self.report(err, OP);
          if self.offline_enabled {
            self.patch_and_enqueue(OP, id, &patch).await?;
          }
          Err(err)
        }
      };
    }

    if !self.offline_enabled {
      return Err(self.offline_refusal("Cannot update pin offline", OP));
    }

    self.patch_and_enqueue(OP, id, &patch).await
  }

  /// Delete the pin with `id`.
  pub async fn remove(&self, id: &str) -> AppResult<()> {
    const OP: &str = "remove";

    let pin = self
      .get_by_id(id)
      .await?
      .ok_or_else(|| self.not_found(id, OP))?;

    if self.use_network(MutationAction::Delete) {
      return match self.remote.delete(id).await {
        Ok(()) => {
          if self.offline_enabled {
            self.local(OP, self.store.remove_record(id)).await?;
          }
          Ok(())
        }
        Err(err) => {
          let err = self.report(err, OP);
          if self.offline_enabled {
            self.write_and_enqueue(OP, pin, MutationAction::Delete).await?;
          }
          Err(err)
        }
      };
    }

    if !self.offline_enabled {
      return Err(self.offline_refusal("Cannot delete pin offline", OP));
    }

    self.write_and_enqueue(OP, pin, MutationAction::Delete).await
  }

  /// Send queued mutations once.
  ///
  /// Only one flush runs at a time; a concurrent call fails with
  /// `SYNC_IN_PROGRESS` and leaves the queue alone.
  pub async fn flush(&self) -> AppResult<DrainReport> {
    const OP: &str = "flush";

    let Ok(_guard) = self.flush_lock.try_lock() else {
      return Err(self.report(
        AppError::operational(ErrorCode::SyncInProgress, "A sync is already in progress"),
        OP,
      ));
    };

    if !self.offline_enabled {
      return Ok(DrainReport::empty());
    }

    if !self.is_online() {
      return Err(self.report(
        AppError::operational(ErrorCode::CannotSyncOffline, "Cannot sync while offline"),
        OP,
      ));
    }

    let sender = RemoteSender {
      remote: self.remote.clone(),
      store: self.store.clone(),
      reporter: self.reporter.clone(),
    };
    let report = self.local(OP, self.queue.drain(&sender)).await?;

    info!(
      succeeded = report.succeeded.len(),
      failed = report.failed.len(),
      dead = report.skipped.len(),
      "Pin sync finished"
    );
    Ok(report)
  }

  pub async fn sync_stats(&self) -> AppResult<StoreStats> {
    self.local("sync_stats", self.store.stats()).await
  }

  /// Whether any mutation is still queued.
  pub async fn needs_sync(&self) -> AppResult<bool> {
    Ok(!self.local("needs_sync", self.queue.is_empty()).await?)
  }
}

impl std::fmt::Debug for PinRepository {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PinRepository")
      .field("store", &self.store)
      .field("offline_enabled", &self.offline_enabled)
      .finish()
  }
}

/// Replays queued mutations against the remote.
struct RemoteSender {
  remote: Arc<dyn PinRemote>,
  store: Arc<LocalStore<Pin>>,
  reporter: ErrorReporter,
}

impl RemoteSender {
  async fn deliver(&self, mutation: &PendingMutation<Pin>) -> AppResult<Delivered> {
    match mutation.action {
      MutationAction::Create => {
        let created = self.remote.create(&mutation.record).await?;
        let local_id = mutation.record_id().to_string();
        if created.id == local_id {
          return Ok(Delivered::Done);
        }

        // queued edits still hold the newest local values
        let edited_later = self
          .store
          .get_queue()
          .await?
          .iter()
          .any(|m| m.id != mutation.id && m.record_id() == local_id);
        let server_id = created.id.clone();
        self
          .store
          .update_snapshot(move |pins| {
            if let Some(pin) = pins.iter_mut().find(|p| p.id == local_id) {
              if edited_later {
                pin.id = created.id;
              } else {
                *pin = created;
              }
            }
          })
          .await?;
        Ok(Delivered::Reassigned(server_id))
      }
      MutationAction::Update => {
        self.remote.update(&mutation.record).await?;
        Ok(Delivered::Done)
      }
      MutationAction::Delete => {
        self.remote.delete(mutation.record_id()).await?;
        Ok(Delivered::Done)
      }
    }
  }
}

#[async_trait]
impl MutationSender<Pin> for RemoteSender {
  async fn send(&self, mutation: &PendingMutation<Pin>) -> AppResult<Delivered> {
    self.deliver(mutation).await.map_err(|err| {
      self
        .reporter
        .handle(err, &format!("PinRepository.flush.{}", mutation.action))
    })
  }
}
