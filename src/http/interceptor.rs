//! Interceptor extension points and the built-in interceptors.
//!
//! Three ordered chains run around every attempt:
//! - request interceptors rewrite the outgoing [`RequestSpec`]
//! - response interceptors see the raw [`HttpResponse`] before parsing
//! - error interceptors see (and may replace) the normalized failure

use std::sync::Arc;

use async_trait::async_trait;

use super::auth::CredentialProvider;
use super::types::{header_get, header_set_default, HttpResponse, RequestBody, RequestSpec};
use crate::error::{AppError, AppResult, ErrorCode};

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
  /// Returning an error aborts the attempt with that failure.
  async fn on_request(&self, spec: RequestSpec) -> AppResult<RequestSpec>;
}

#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
  async fn on_response(&self, response: HttpResponse) -> AppResult<HttpResponse>;
}

#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
  /// Observe a failure; the returned error replaces it.
  async fn on_error(&self, error: AppError) -> AppError;
}

/// Attaches `Authorization: Bearer <token>` when the call requires auth.
pub struct BearerAuth {
  credentials: Arc<dyn CredentialProvider>,
}

impl BearerAuth {
  pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
    Self { credentials }
  }
}

#[async_trait]
impl RequestInterceptor for BearerAuth {
  async fn on_request(&self, mut spec: RequestSpec) -> AppResult<RequestSpec> {
    if spec.requires_auth {
      if let Some(token) = self.credentials.token().await {
        spec
          .headers
          .push(("Authorization".to_string(), format!("Bearer {}", token)));
      }
    }
    Ok(spec)
  }
}

/// Adds JSON `Content-Type` and `Accept` defaults; headers set by the caller
/// win.
pub struct DefaultHeaders;

#[async_trait]
impl RequestInterceptor for DefaultHeaders {
  async fn on_request(&self, mut spec: RequestSpec) -> AppResult<RequestSpec> {
    let is_multipart = matches!(spec.body, RequestBody::Multipart(_));
    if !spec.skip_default_content_type && !is_multipart {
      header_set_default(&mut spec.headers, "Content-Type", "application/json");
    }
    header_set_default(&mut spec.headers, "Accept", "application/json");
    Ok(spec)
  }
}

/// Logs outgoing requests at debug level.
pub struct RequestLogger;

#[async_trait]
impl RequestInterceptor for RequestLogger {
  async fn on_request(&self, spec: RequestSpec) -> AppResult<RequestSpec> {
    tracing::debug!(
      method = spec.method.as_str(),
      path = %spec.path,
      authenticated = header_get(&spec.headers, "authorization").is_some(),
      "API request"
    );
    Ok(spec)
  }
}

/// Logs responses at debug level.
pub struct ResponseLogger;

#[async_trait]
impl ResponseInterceptor for ResponseLogger {
  async fn on_response(&self, response: HttpResponse) -> AppResult<HttpResponse> {
    tracing::debug!(
      status = response.status,
      bytes = response.body.len(),
      "API response"
    );
    Ok(response)
  }
}

/// Clears credentials when the server rejects them.
pub struct SessionGuard {
  credentials: Arc<dyn CredentialProvider>,
}

impl SessionGuard {
  pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
    Self { credentials }
  }
}

#[async_trait]
impl ErrorInterceptor for SessionGuard {
  async fn on_error(&self, error: AppError) -> AppError {
    match error.code {
      ErrorCode::Http(401) => {
        self.credentials.clear().await;
        tracing::warn!("Session expired, credentials cleared");
      }
      ErrorCode::Http(403) => tracing::warn!("Access forbidden"),
      ErrorCode::Http(status) if status >= 500 => {
        tracing::warn!(status, "Server error occurred")
      }
      _ => {}
    }
    error
  }
}
