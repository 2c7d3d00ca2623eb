//! Pending mutation types and the drain callback.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
  Create,
  Update,
  Delete,
}

impl fmt::Display for MutationAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MutationAction::Create => write!(f, "create"),
      MutationAction::Update => write!(f, "update"),
      MutationAction::Delete => write!(f, "delete"),
    }
  }
}

/// A queued write that has not been confirmed by the server.
///
/// Only `retry_count` changes after creation, plus the record id when an
/// earlier create comes back under a server id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation<R> {
  pub id: String,
  #[serde(rename = "recordSnapshot")]
  pub record: R,
  pub action: MutationAction,
  pub enqueued_at: DateTime<Utc>,
  #[serde(default)]
  pub retry_count: u32,
}

impl<R: Record> PendingMutation<R> {
  pub fn new(record: R, action: MutationAction) -> Self {
    let id = format!(
      "{}_{}_{}",
      action,
      record.record_id(),
      Uuid::new_v4().simple()
    );

    Self {
      id,
      record,
      action,
      enqueued_at: Utc::now(),
      retry_count: 0,
    }
  }

  pub fn record_id(&self) -> &str {
    self.record.record_id()
  }

  /// Whether this entry has used up its attempts.
  pub fn is_dead_letter(&self, max_retries: u32) -> bool {
    self.retry_count >= max_retries
  }
}

/// Outcome of one pass over the queue.
#[derive(Debug, Clone)]
pub struct DrainReport {
  /// Ids sent and removed from the queue.
  pub succeeded: Vec<String>,
  /// Ids whose send failed, with the error; their retry count was bumped.
  pub failed: Vec<(String, AppError)>,
  /// Dead-lettered ids that were not attempted.
  pub skipped: Vec<String>,
  pub finished_at: DateTime<Utc>,
}

impl DrainReport {
  pub fn empty() -> Self {
    Self {
      succeeded: Vec::new(),
      failed: Vec::new(),
      skipped: Vec::new(),
      finished_at: Utc::now(),
    }
  }

  /// Number of entries a send was attempted for.
  pub fn attempted(&self) -> usize {
    self.succeeded.len() + self.failed.len()
  }

  pub fn is_clean(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
  Done,
  /// The server stored the record under this id. Later entries for the
  /// old id are rewritten to it.
  Reassigned(String),
}

/// Delivers one queued mutation to the server.
#[async_trait]
pub trait MutationSender<R: Record>: Send + Sync {
  async fn send(&self, mutation: &PendingMutation<R>) -> AppResult<Delivered>;
}
