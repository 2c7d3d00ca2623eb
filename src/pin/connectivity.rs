//! Connectivity predicate consulted before every network attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait Connectivity: Send + Sync {
  fn is_online(&self) -> bool;
}

/// Settable flag; clones share state. Starts online.
#[derive(Debug, Clone)]
pub struct ConnectivityFlag {
  online: Arc<AtomicBool>,
}

impl ConnectivityFlag {
  pub fn new(online: bool) -> Self {
    Self {
      online: Arc::new(AtomicBool::new(online)),
    }
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }
}

impl Default for ConnectivityFlag {
  fn default() -> Self {
    Self::new(true)
  }
}

impl Connectivity for ConnectivityFlag {
  fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_clones_share_state() {
    let flag = ConnectivityFlag::default();
    let other = flag.clone();
    assert!(flag.is_online());

    other.set_online(false);
    assert!(!flag.is_online());
  }
}
