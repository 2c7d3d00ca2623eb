//! Durable queue of mutations waiting to reach the server.

mod queue;
mod types;

pub use queue::{SyncQueue, DEFAULT_MAX_RETRIES};
pub use types::{Delivered, DrainReport, MutationAction, MutationSender, PendingMutation};
