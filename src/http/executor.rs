//! Network executor boundary.
//!
//! The transport never talks to an HTTP library directly; it hands a
//! resolved [`HttpRequest`] and a cancellation token to a
//! [`NetworkExecutor`]. Production code uses [`ReqwestExecutor`], tests use
//! an in-memory mock.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::types::{HttpHeaders, HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::error::RawFailure;

/// Failure before any response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
  /// The cancellation token fired.
  #[error("request cancelled")]
  Cancelled,

  /// No connection could be made.
  #[error("connection failed: {0}")]
  Connect(String),

  /// The connection broke while sending or receiving.
  #[error("i/o error: {0}")]
  Io(String),
}

impl From<TransportFailure> for RawFailure {
  fn from(failure: TransportFailure) -> Self {
    match failure {
      TransportFailure::Cancelled => RawFailure::Cancelled,
      TransportFailure::Connect(cause) | TransportFailure::Io(cause) => {
        RawFailure::Connectivity(cause)
      }
    }
  }
}

/// Performs a single HTTP exchange.
///
/// Implementations must stop work and release resources once `cancel`
/// fires.
#[async_trait]
pub trait NetworkExecutor: Send + Sync {
  async fn execute(
    &self,
    request: HttpRequest,
    cancel: CancellationToken,
  ) -> Result<HttpResponse, TransportFailure>;
}

/// Executor backed by a shared `reqwest::Client`.
#[derive(Clone, Default)]
pub struct ReqwestExecutor {
  client: reqwest::Client,
}

impl ReqwestExecutor {
  pub fn new(client: reqwest::Client) -> Self {
    Self { client }
  }

  fn build(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, TransportFailure> {
    let method = match request.method {
      HttpMethod::Get => reqwest::Method::GET,
      HttpMethod::Post => reqwest::Method::POST,
      HttpMethod::Put => reqwest::Method::PUT,
      HttpMethod::Patch => reqwest::Method::PATCH,
      HttpMethod::Delete => reqwest::Method::DELETE,
    };

    let mut builder = self.client.request(method, &request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    builder = match request.body {
      RequestBody::Empty => builder,
      RequestBody::Json(bytes) => builder.body(bytes),
      RequestBody::Multipart(parts) => {
        let mut form = reqwest::multipart::Form::new();
        for part in parts {
          let mut field = reqwest::multipart::Part::bytes(part.data);
          if let Some(content_type) = &part.content_type {
            field = field
              .mime_str(content_type)
              .map_err(|e| TransportFailure::Io(format!("invalid part content type: {}", e)))?;
          }
          if let Some(file_name) = part.file_name {
            field = field.file_name(file_name);
          }
          form = form.part(part.name, field);
        }
        builder.multipart(form)
      }
    };

    Ok(builder)
  }

  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
    let response = self
      .build(request)?
      .send()
      .await
      .map_err(|e| {
        if e.is_connect() {
          TransportFailure::Connect(e.to_string())
        } else {
          TransportFailure::Io(e.to_string())
        }
      })?;

    let status = response.status().as_u16();
    let headers: HttpHeaders = response
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.as_str().to_string(),
          value.to_str().unwrap_or_default().to_string(),
        )
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| TransportFailure::Io(e.to_string()))?
      .to_vec();

    Ok(HttpResponse {
      status,
      headers,
      body,
    })
  }
}

#[async_trait]
impl NetworkExecutor for ReqwestExecutor {
  async fn execute(
    &self,
    request: HttpRequest,
    cancel: CancellationToken,
  ) -> Result<HttpResponse, TransportFailure> {
    // Dropping the in-flight future aborts the connection.
    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(TransportFailure::Cancelled),
      result = self.send(request) => result,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_failures_map_to_raw() {
    assert!(matches!(
      RawFailure::from(TransportFailure::Cancelled),
      RawFailure::Cancelled
    ));
    assert!(matches!(
      RawFailure::from(TransportFailure::Connect("refused".into())),
      RawFailure::Connectivity(cause) if cause == "refused"
    ));
  }

  #[tokio::test]
  async fn test_reqwest_executor_honours_cancellation() {
    let executor = ReqwestExecutor::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = executor
      .execute(
        HttpRequest {
          method: HttpMethod::Get,
          url: "http://10.255.255.1/never".to_string(),
          headers: Vec::new(),
          body: RequestBody::Empty,
        },
        cancel,
      )
      .await;

    assert_eq!(result, Err(TransportFailure::Cancelled));
  }
}
