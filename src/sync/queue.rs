//! Sync queue manager.
//!
//! Owns the pending-mutation list held in the local store. Drain walks a
//! snapshot of the queue once: successes are dequeued, failures get their
//! retry count bumped, and entries past the ceiling are left in place but
//! never sent again. When the server assigns a new id to a created record,
//! the entries queued behind it for the old id follow the new one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::types::{Delivered, DrainReport, MutationAction, MutationSender, PendingMutation};
use crate::error::AppResult;
use crate::store::{LocalStore, Record};

/// Attempts allowed before an entry is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub struct SyncQueue<R> {
  store: Arc<LocalStore<R>>,
  max_retries: u32,
}

impl<R: Record> SyncQueue<R> {
  pub fn new(store: Arc<LocalStore<R>>) -> Self {
    Self {
      store,
      max_retries: DEFAULT_MAX_RETRIES,
    }
  }

  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries;
    self
  }

  pub fn max_retries(&self) -> u32 {
    self.max_retries
  }

  /// Append a mutation for `record` to the back of the queue.
  pub async fn enqueue(&self, record: R, action: MutationAction) -> AppResult<PendingMutation<R>> {
    let pending = PendingMutation::new(record, action);
    let entry = pending.clone();
    let len = self
      .store
      .update_queue(move |queue| {
        queue.push(entry);
        queue.len()
      })
      .await?;

    debug!(id = %pending.id, %action, queue_len = len, "Enqueued mutation");
    Ok(pending)
  }

  /// Remove the entry with `id`. Returns whether it was present.
  pub async fn dequeue(&self, id: &str) -> AppResult<bool> {
    self
      .store
      .update_queue(|queue| {
        let before = queue.len();
        queue.retain(|m| m.id != id);
        queue.len() != before
      })
      .await
  }

  /// Bump the retry count of `id`. Returns the new count, or `None` if absent.
  pub async fn increment_retry(&self, id: &str) -> AppResult<Option<u32>> {
    self
      .store
      .update_queue(|queue| {
        queue.iter_mut().find(|m| m.id == id).map(|m| {
          m.retry_count += 1;
          m.retry_count
        })
      })
      .await
  }

  /// All queued entries in order, dead letters included.
  pub async fn pending(&self) -> AppResult<Vec<PendingMutation<R>>> {
    self.store.get_queue().await
  }

  pub async fn len(&self) -> AppResult<usize> {
    Ok(self.pending().await?.len())
  }

  pub async fn is_empty(&self) -> AppResult<bool> {
    Ok(self.len().await? == 0)
  }

  /// Entries whose retry count has reached the ceiling.
  pub async fn dead_letters(&self) -> AppResult<Vec<PendingMutation<R>>> {
    let max = self.max_retries;
    Ok(
      self
        .pending()
        .await?
        .into_iter()
        .filter(|m| m.is_dead_letter(max))
        .collect(),
    )
  }

  pub async fn clear(&self) -> AppResult<()> {
    self.store.clear_queue().await
  }

  /// Dequeue `id` and point every other entry for record `from` at `to`, in
  /// one queue write. Returns how many entries were rewritten.
  async fn settle_reassigned(&self, id: &str, from: &str, to: &str) -> AppResult<usize> {
    self
      .store
      .update_queue(|queue| {
        queue.retain(|m| m.id != id);
        let mut moved = 0;
        for m in queue.iter_mut().filter(|m| m.record_id() == from) {
          m.record.set_record_id(to);
          moved += 1;
        }
        moved
      })
      .await
  }

  /// Send every live entry once.
  ///
  /// A failed send never aborts the pass. Store failures do, since the
  /// queue state can no longer be trusted. The last-sync time is updated
  /// after every completed pass.
  pub async fn drain<S>(&self, sender: &S) -> AppResult<DrainReport>
  where
    S: MutationSender<R> + ?Sized,
  {
    let snapshot = self.store.get_queue().await?;
    let mut report = DrainReport::empty();
    let mut reassigned: HashMap<String, String> = HashMap::new();

    for mut entry in snapshot {
      if let Some(to) = reassigned.get(entry.record_id()) {
        entry.record.set_record_id(to);
      }

      if entry.is_dead_letter(self.max_retries) {
        error!(
          id = %entry.id,
          action = %entry.action,
          retries = entry.retry_count,
          "Skipping dead-lettered mutation"
        );
        report.skipped.push(entry.id);
        continue;
      }

      match sender.send(&entry).await {
        Ok(Delivered::Done) => {
          self.dequeue(&entry.id).await?;
          debug!(id = %entry.id, "Synced mutation");
          report.succeeded.push(entry.id);
        }
        Ok(Delivered::Reassigned(to)) => {
          let from = entry.record_id().to_string();
          let moved = self.settle_reassigned(&entry.id, &from, &to).await?;
          debug!(id = %entry.id, %from, %to, moved, "Synced mutation under server id");
          reassigned.insert(from, to);
          report.succeeded.push(entry.id);
        }
        Err(err) => {
          let retries = self.increment_retry(&entry.id).await?;
          warn!(id = %entry.id, retries = ?retries, error = %err, "Mutation sync failed");
          report.failed.push((entry.id, err));
        }
      }
    }

    report.finished_at = Utc::now();
    self.store.set_last_sync(report.finished_at).await?;

    info!(
      succeeded = report.succeeded.len(),
      failed = report.failed.len(),
      skipped = report.skipped.len(),
      "Drained sync queue"
    );

    Ok(report)
  }
}

impl<R> std::fmt::Debug for SyncQueue<R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SyncQueue")
      .field("store", &self.store)
      .field("max_retries", &self.max_retries)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{AppError, ErrorCode};
  use crate::store::MemoryStore;
  use crate::test_support::{note, FailingStore, Note};
  use async_trait::async_trait;
  use std::collections::HashSet;
  use std::sync::Mutex;

  /// Records every send; fails for record ids in `fail_for`.
  #[derive(Default)]
  struct SpySender {
    sent: Mutex<Vec<String>>,
    fail_for: HashSet<String>,
  }

  impl SpySender {
    fn failing(ids: &[&str]) -> Self {
      Self {
        sent: Mutex::default(),
        fail_for: ids.iter().map(|s| s.to_string()).collect(),
      }
    }

    fn sent(&self) -> Vec<String> {
      self.sent.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl MutationSender<Note> for SpySender {
    async fn send(&self, mutation: &PendingMutation<Note>) -> AppResult<Delivered> {
      self.sent.lock().unwrap().push(mutation.record_id().to_string());
      if self.fail_for.contains(mutation.record_id()) {
        return Err(AppError::network("offline"));
      }
      Ok(Delivered::Done)
    }
  }

  fn queue() -> (Arc<LocalStore<Note>>, SyncQueue<Note>) {
    let store = Arc::new(LocalStore::new(Arc::new(MemoryStore::new()), "@test"));
    (store.clone(), SyncQueue::new(store))
  }

  #[tokio::test]
  async fn test_drain_empty_queue_sets_last_sync() {
    let (store, queue) = queue();
    assert!(store.get_last_sync().await.unwrap().is_none());

    let report = queue.drain(&SpySender::default()).await.unwrap();

    assert_eq!(report.attempted(), 0);
    assert!(report.is_clean());
    assert_eq!(store.get_last_sync().await.unwrap(), Some(report.finished_at));
  }

  #[tokio::test]
  async fn test_enqueue_dequeue_increment() {
    let (_, queue) = queue();
    let a = queue.enqueue(note("1", "a"), MutationAction::Create).await.unwrap();
    let b = queue.enqueue(note("2", "b"), MutationAction::Update).await.unwrap();

    let ids: Vec<String> = queue.pending().await.unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![a.id.clone(), b.id.clone()]);

    assert_eq!(queue.increment_retry(&b.id).await.unwrap(), Some(1));
    assert_eq!(queue.increment_retry("nope").await.unwrap(), None);

    assert!(queue.dequeue(&a.id).await.unwrap());
    assert!(!queue.dequeue(&a.id).await.unwrap());
    assert_eq!(queue.len().await.unwrap(), 1);
    assert_eq!(queue.pending().await.unwrap()[0].retry_count, 1);

    queue.clear().await.unwrap();
    assert!(queue.is_empty().await.unwrap());
  }

  #[tokio::test]
  async fn test_single_failure_does_not_abort_batch() {
    let (_, queue) = queue();
    queue.enqueue(note("1", "a"), MutationAction::Create).await.unwrap();
    let second = queue.enqueue(note("2", "b"), MutationAction::Create).await.unwrap();
    queue.enqueue(note("3", "c"), MutationAction::Create).await.unwrap();

    let sender = SpySender::failing(&["2"]);
    let report = queue.drain(&sender).await.unwrap();

    assert_eq!(sender.sent(), vec!["1", "2", "3"]);
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, second.id);
    assert_eq!(report.failed[0].1.code, ErrorCode::NetworkError);

    let left = queue.pending().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, second.id);
    assert_eq!(left[0].retry_count, 1);
  }

  #[tokio::test]
  async fn test_retry_ceiling_stops_attempts() {
    let (_, queue) = queue();
    let pending = queue.enqueue(note("1", "a"), MutationAction::Update).await.unwrap();
    let sender = SpySender::failing(&["1"]);

    for _ in 0..3 {
      queue.drain(&sender).await.unwrap();
    }
    assert_eq!(sender.sent().len(), 3);

    let report = queue.drain(&sender).await.unwrap();
    let report_again = queue.drain(&sender).await.unwrap();

    assert_eq!(sender.sent().len(), 3);
    assert_eq!(report.skipped, vec![pending.id.clone()]);
    assert_eq!(report_again.skipped, vec![pending.id.clone()]);

    let dead = queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, pending.id);
    assert_eq!(dead[0].enqueued_at, pending.enqueued_at);
    assert_eq!(dead[0].retry_count, 3);
  }

  #[tokio::test]
  async fn test_custom_ceiling() {
    let (store, _) = queue();
    let queue = SyncQueue::new(store).with_max_retries(1);
    queue.enqueue(note("1", "a"), MutationAction::Delete).await.unwrap();
    let sender = SpySender::failing(&["1"]);

    queue.drain(&sender).await.unwrap();
    let report = queue.drain(&sender).await.unwrap();

    assert_eq!(sender.sent().len(), 1);
    assert_eq!(report.skipped.len(), 1);
  }

  /// Creates come back as "srv"; everything else fails.
  #[derive(Default)]
  struct ReassigningSender {
    sent: Mutex<Vec<(MutationAction, String)>>,
  }

  #[async_trait]
  impl MutationSender<Note> for ReassigningSender {
    async fn send(&self, mutation: &PendingMutation<Note>) -> AppResult<Delivered> {
      self
        .sent
        .lock()
        .unwrap()
        .push((mutation.action, mutation.record_id().to_string()));
      match mutation.action {
        MutationAction::Create => Ok(Delivered::Reassigned("srv".into())),
        _ => Err(AppError::network("offline")),
      }
    }
  }

  #[tokio::test]
  async fn test_later_entries_follow_server_id() {
    let (_, queue) = queue();
    queue.enqueue(note("tmp", "a"), MutationAction::Create).await.unwrap();
    queue.enqueue(note("tmp", "b"), MutationAction::Update).await.unwrap();
    queue.enqueue(note("other", "c"), MutationAction::Update).await.unwrap();
    queue.enqueue(note("tmp", "b"), MutationAction::Delete).await.unwrap();

    let sender = ReassigningSender::default();
    let report = queue.drain(&sender).await.unwrap();

    assert_eq!(
      *sender.sent.lock().unwrap(),
      vec![
        (MutationAction::Create, "tmp".to_string()),
        (MutationAction::Update, "srv".to_string()),
        (MutationAction::Update, "other".to_string()),
        (MutationAction::Delete, "srv".to_string()),
      ]
    );
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed.len(), 3);

    let left: Vec<String> = queue
      .pending()
      .await
      .unwrap()
      .iter()
      .map(|m| m.record_id().to_string())
      .collect();
    assert_eq!(left, vec!["srv", "other", "srv"]);
  }

  struct EnqueueingSender {
    queue: Arc<SyncQueue<Note>>,
    calls: Mutex<usize>,
  }

  #[async_trait]
  impl MutationSender<Note> for EnqueueingSender {
    async fn send(&self, _mutation: &PendingMutation<Note>) -> AppResult<Delivered> {
      *self.calls.lock().unwrap() += 1;
      self.queue.enqueue(note("late", "x"), MutationAction::Create).await?;
      Ok(Delivered::Done)
    }
  }

  #[tokio::test]
  async fn test_drain_works_on_snapshot() {
    let (_, queue) = queue();
    let queue = Arc::new(queue);
    queue.enqueue(note("1", "a"), MutationAction::Create).await.unwrap();

    let sender = EnqueueingSender {
      queue: queue.clone(),
      calls: Mutex::new(0),
    };
    let report = queue.drain(&sender).await.unwrap();

    assert_eq!(*sender.calls.lock().unwrap(), 1);
    assert_eq!(report.succeeded.len(), 1);

    let left = queue.pending().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].record_id(), "late");
  }

  #[tokio::test]
  async fn test_store_failure_is_fatal_to_drain() {
    let kv = FailingStore::new();
    let store = Arc::new(LocalStore::new(Arc::new(kv.clone()), "@test"));
    let queue = SyncQueue::new(store.clone());
    queue.enqueue(note("1", "a"), MutationAction::Create).await.unwrap();

    kv.fail_writes(true);
    let err = queue.drain(&SpySender::default()).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::Unknown);
    kv.fail_writes(false);
    assert_eq!(queue.len().await.unwrap(), 1);
    assert!(store.get_last_sync().await.unwrap().is_none());
  }
}
