//! Application error type shared by every layer of the crate.
//!
//! All failures that reach the presentation layer are [`AppError`] values:
//! a tag ([`ErrorCode`]), a message, optional structured details and the
//! HTTP status when one exists. Raw failures are turned into `AppError`s by
//! [`normalize`].

mod normalize;
mod reporter;

use std::fmt;

use serde_json::Value;

pub use normalize::{normalize, FieldErrors, RawFailure};
pub use reporter::{ErrorListener, ErrorReporter};

/// Result alias used by the repository, queue and transport layers.
pub type AppResult<T> = Result<T, AppError>;

/// Error tag. Renders to the string tags consumers match on
/// (`NETWORK_TIMEOUT`, `HTTP_404`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
  NetworkTimeout,
  NetworkError,
  Http(u16),
  Validation,
  Unknown,
  Unauthorized,
  Forbidden,
  NotFound,
  NoOfflineData,
  CannotSyncOffline,
  OfflineModeDisabled,
  SyncInProgress,
  SyncHandlerMissing,
}

impl ErrorCode {
  /// HTTP status carried by the tag, if any.
  pub fn status(self) -> Option<u16> {
    match self {
      ErrorCode::Http(status) => Some(status),
      _ => None,
    }
  }
}

impl fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let tag = match self {
      ErrorCode::NetworkTimeout => "NETWORK_TIMEOUT",
      ErrorCode::NetworkError => "NETWORK_ERROR",
      ErrorCode::Http(status) => return write!(f, "HTTP_{}", status),
      ErrorCode::Validation => "VALIDATION_ERROR",
      ErrorCode::Unknown => "UNKNOWN_ERROR",
      ErrorCode::Unauthorized => "UNAUTHORIZED",
      ErrorCode::Forbidden => "FORBIDDEN",
      ErrorCode::NotFound => "NOT_FOUND",
      ErrorCode::NoOfflineData => "NO_OFFLINE_DATA",
      ErrorCode::CannotSyncOffline => "CANNOT_SYNC_OFFLINE",
      ErrorCode::OfflineModeDisabled => "OFFLINE_MODE_DISABLED",
      ErrorCode::SyncInProgress => "SYNC_IN_PROGRESS",
      ErrorCode::SyncHandlerMissing => "SYNC_HANDLER_MISSING",
    };
    f.write_str(tag)
  }
}

/// Normalized error consumed uniformly by every layer above the transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
  pub code: ErrorCode,
  pub message: String,
  pub details: Option<Value>,
  pub status_code: Option<u16>,
  /// Expected, user-facing condition (network, HTTP, validation) as opposed
  /// to a programmer-level fault.
  pub is_operational: bool,
}

impl AppError {
  /// An expected, user-facing error.
  pub fn operational(code: ErrorCode, message: impl Into<String>) -> Self {
    Self {
      code,
      message: message.into(),
      details: None,
      status_code: code.status(),
      is_operational: true,
    }
  }

  /// An unexpected fault that should be logged rather than shown.
  pub fn fault(code: ErrorCode, message: impl Into<String>) -> Self {
    Self {
      is_operational: false,
      ..Self::operational(code, message)
    }
  }

  pub fn with_details(mut self, details: Value) -> Self {
    self.details = Some(details);
    self
  }

  pub fn validation(message: impl Into<String>, details: Value) -> Self {
    Self::operational(ErrorCode::Validation, message).with_details(details)
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::operational(ErrorCode::NotFound, message)
  }

  pub fn unauthorized() -> Self {
    Self::operational(ErrorCode::Unauthorized, "Unauthorized access")
  }

  pub fn forbidden() -> Self {
    Self::operational(ErrorCode::Forbidden, "Access forbidden")
  }

  pub fn network(message: impl Into<String>) -> Self {
    Self::operational(ErrorCode::NetworkError, message)
  }

  pub fn timeout() -> Self {
    Self::operational(ErrorCode::NetworkTimeout, "Request timeout")
  }

  /// True when no response reached us (timeout or connectivity failure).
  pub fn is_network(&self) -> bool {
    matches!(
      self.code,
      ErrorCode::NetworkTimeout | ErrorCode::NetworkError
    )
  }
}

impl From<color_eyre::Report> for AppError {
  fn from(report: color_eyre::Report) -> Self {
    normalize(RawFailure::from_report(&report), None)
  }
}

impl From<serde_json::Error> for AppError {
  fn from(err: serde_json::Error) -> Self {
    normalize(RawFailure::from_error(&err), None)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_code_tags() {
    assert_eq!(ErrorCode::NetworkTimeout.to_string(), "NETWORK_TIMEOUT");
    assert_eq!(ErrorCode::Http(422).to_string(), "HTTP_422");
    assert_eq!(ErrorCode::Unknown.to_string(), "UNKNOWN_ERROR");
    assert_eq!(ErrorCode::CannotSyncOffline.to_string(), "CANNOT_SYNC_OFFLINE");
  }

  #[test]
  fn test_display_includes_tag_and_message() {
    let err = AppError::not_found("Pin with id 7 not found");
    assert_eq!(err.to_string(), "NOT_FOUND: Pin with id 7 not found");
    assert!(err.is_operational);
  }

  #[test]
  fn test_fault_is_not_operational() {
    let err = AppError::fault(ErrorCode::SyncHandlerMissing, "no update handler");
    assert!(!err.is_operational);
    assert_eq!(err.status_code, None);
  }

  #[test]
  fn test_report_becomes_unknown_fault() {
    let err: AppError = color_eyre::eyre::eyre!("disk full").into();
    assert_eq!(err.code, ErrorCode::Unknown);
    assert_eq!(err.message, "disk full");
    assert!(!err.is_operational);
  }
}
