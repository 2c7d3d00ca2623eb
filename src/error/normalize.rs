//! Conversion of arbitrary failures into [`AppError`].

use std::collections::BTreeMap;

use serde_json::Value;

use super::{AppError, ErrorCode};

/// Field name to list of validation messages, as sent in `{ errors }` bodies.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// A failure as it was raised, before classification.
#[derive(Debug, Clone)]
pub enum RawFailure {
  /// Already normalized; passes through untouched.
  App(AppError),
  /// The attempt was aborted, normally by the timeout guard.
  Cancelled,
  /// No response reached us (DNS, refused connection, reset, ...).
  Connectivity(String),
  /// The server answered with a failure status.
  Http {
    status: u16,
    message: Option<String>,
    errors: Option<FieldErrors>,
    body: Option<Value>,
  },
  /// Field-level validation messages without a status code.
  Validation(FieldErrors),
  /// Any other error object.
  Fault {
    message: String,
    trace: Option<String>,
  },
  /// A bare message.
  Message(String),
  /// Anything else; attached verbatim as details.
  Other(Value),
}

impl RawFailure {
  /// Capture a std error together with its source chain.
  pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
    let mut chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
      chain.push(cause.to_string());
      source = cause.source();
    }

    RawFailure::Fault {
      message: err.to_string(),
      trace: if chain.is_empty() {
        None
      } else {
        Some(chain.join("\ncaused by: "))
      },
    }
  }

  pub fn from_report(report: &color_eyre::Report) -> Self {
    RawFailure::Fault {
      message: report.to_string(),
      trace: Some(format!("{:?}", report)),
    }
  }
}

impl From<AppError> for RawFailure {
  fn from(err: AppError) -> Self {
    RawFailure::App(err)
  }
}

impl From<&str> for RawFailure {
  fn from(message: &str) -> Self {
    RawFailure::Message(message.to_string())
  }
}

impl From<String> for RawFailure {
  fn from(message: String) -> Self {
    RawFailure::Message(message)
  }
}

impl From<color_eyre::Report> for RawFailure {
  fn from(report: color_eyre::Report) -> Self {
    RawFailure::from_report(&report)
  }
}

/// Classify a raw failure. The first matching rule wins:
/// already normalized, cancellation, connectivity, status code,
/// validation map, error object, string, anything else.
pub fn normalize(raw: RawFailure, context: Option<&str>) -> AppError {
  let err = match raw {
    RawFailure::App(err) => err,
    RawFailure::Cancelled => AppError::timeout(),
    RawFailure::Connectivity(cause) => {
      AppError::network("Network connection failed").with_details(Value::String(cause))
    }
    RawFailure::Http {
      status,
      message,
      errors,
      body,
    } => {
      let message = message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("Request failed with status {}", status));
      let details = match errors {
        Some(errors) => serde_json::to_value(errors).ok(),
        None => body,
      };
      AppError {
        details,
        ..AppError::operational(ErrorCode::Http(status), message)
      }
    }
    RawFailure::Validation(errors) => AppError::validation(
      "Validation failed",
      serde_json::to_value(errors).unwrap_or(Value::Null),
    ),
    RawFailure::Fault { message, trace } => AppError {
      details: trace.map(Value::String),
      ..AppError::fault(ErrorCode::Unknown, message)
    },
    RawFailure::Message(message) => AppError::fault(ErrorCode::Unknown, message),
    RawFailure::Other(value) => {
      AppError::fault(ErrorCode::Unknown, "An unexpected error occurred").with_details(value)
    }
  };

  if let Some(context) = context {
    tracing::trace!(context, code = %err.code, "normalized failure");
  }

  err
}
