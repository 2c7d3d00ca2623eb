//! Error reporting: logging, listener fan-out and user-facing messages.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use super::{normalize, AppError, ErrorCode, RawFailure};

/// Callback invoked for every handled error (analytics, UI notification...).
pub type ErrorListener = Box<dyn Fn(&AppError) + Send + Sync>;

const FALLBACK_MESSAGE: &str = "An unexpected error occurred";

/// Normalizes, logs and fans out errors to registered listeners.
///
/// Cloning shares the listener list.
#[derive(Clone, Default)]
pub struct ErrorReporter {
  listeners: Arc<RwLock<Vec<ErrorListener>>>,
}

impl ErrorReporter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a listener for all handled errors.
  pub fn on_error<F>(&self, listener: F)
  where
    F: Fn(&AppError) + Send + Sync + 'static,
  {
    self
      .listeners
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .push(Box::new(listener));
  }

  /// Normalize `raw`, log it with `context` and notify listeners.
  pub fn handle(&self, raw: impl Into<RawFailure>, context: &str) -> AppError {
    let err = normalize(raw.into(), Some(context));

    if err.is_operational {
      tracing::warn!(context, code = %err.code, "{}", err.message);
    } else {
      tracing::error!(context, code = %err.code, details = ?err.details, "{}", err.message);
    }

    let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
    for listener in listeners.iter() {
      // one listener panicking leaves the rest notified
      if catch_unwind(AssertUnwindSafe(|| listener(&err))).is_err() {
        tracing::error!(context, "Error listener panicked");
      }
    }

    err
  }
}

impl std::fmt::Debug for ErrorReporter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let count = self.listeners.read().map(|l| l.len()).unwrap_or_default();
    f.debug_struct("ErrorReporter")
      .field("listeners", &count)
      .finish()
  }
}

impl AppError {
  /// Short human-readable text for display.
  ///
  /// Non-operational errors never leak their raw message.
  pub fn user_message(&self) -> String {
    if !self.is_operational {
      return FALLBACK_MESSAGE.to_string();
    }

    let friendly = match self.code {
      ErrorCode::NetworkTimeout => {
        Some("The request took too long. Please check your connection and try again.")
      }
      ErrorCode::NetworkError => {
        Some("Unable to connect to the server. Please check your internet connection.")
      }
      ErrorCode::Http(401) => Some("Your session has expired. Please log in again."),
      ErrorCode::Http(403) => Some("You don't have permission to perform this action."),
      ErrorCode::Http(404) => Some("The requested resource was not found."),
      ErrorCode::Http(429) => Some("Too many requests. Please wait a moment and try again."),
      ErrorCode::Http(500) => Some("Server error. Please try again later."),
      ErrorCode::Validation => Some("Please check your input and try again."),
      ErrorCode::NoOfflineData => {
        Some("No saved data is available offline. Connect to the internet and try again.")
      }
      ErrorCode::CannotSyncOffline => Some("Changes can't be synced while offline."),
      _ => None,
    };

    match friendly {
      Some(text) => text.to_string(),
      None if !self.message.is_empty() => self.message.clone(),
      None => FALLBACK_MESSAGE.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[test]
  fn test_handle_notifies_listeners() {
    let reporter = ErrorReporter::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();
    reporter.on_error(move |err| {
      assert_eq!(err.code, ErrorCode::NetworkTimeout);
      seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    let err = reporter.handle(RawFailure::Cancelled, "PinRepository.list");

    assert_eq!(err.code, ErrorCode::NetworkTimeout);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_clones_share_listeners() {
    let reporter = ErrorReporter::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();
    reporter.clone().on_error(move |_| {
      seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    reporter.handle("oops", "test");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_panicking_listener_is_isolated() {
    let reporter = ErrorReporter::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();
    reporter.on_error(|_| panic!("listener bug"));
    reporter.on_error(move |_| {
      seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    let err = reporter.handle(RawFailure::Cancelled, "PinRepository.list");
    reporter.handle("again", "test");

    assert_eq!(err.code, ErrorCode::NetworkTimeout);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_user_message_for_session_expiry() {
    let err = AppError::operational(ErrorCode::Http(401), "Unauthorized");
    assert_eq!(
      err.user_message(),
      "Your session has expired. Please log in again."
    );
  }

  #[test]
  fn test_user_message_falls_back_to_own_message() {
    let err = AppError::operational(ErrorCode::Http(409), "Pin already exists");
    assert_eq!(err.user_message(), "Pin already exists");
  }

  #[test]
  fn test_user_message_hides_faults() {
    let err = AppError::fault(ErrorCode::Unknown, "index out of bounds at queue.rs:42");
    assert_eq!(err.user_message(), FALLBACK_MESSAGE);
  }
}
