//! Request pipeline: interceptors, timeout guard, parsing and retry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::auth::CredentialProvider;
use super::executor::NetworkExecutor;
use super::interceptor::{
  BearerAuth, DefaultHeaders, ErrorInterceptor, RequestInterceptor, RequestLogger,
  ResponseInterceptor, ResponseLogger, SessionGuard,
};
use super::retry::RetryPolicy;
use super::types::{
  ApiResponse, FormPart, HttpMethod, HttpRequest, HttpResponse, RequestSpec, DEFAULT_TIMEOUT,
};
use crate::config::ApiConfig;
use crate::error::{normalize, AppError, AppResult, ErrorCode, FieldErrors, RawFailure};

/// HTTP client with interceptor chains and bounded retry.
///
/// The client holds no per-call state; interceptors may have side effects.
#[derive(Clone)]
pub struct HttpClient {
  base_url: String,
  executor: Arc<dyn NetworkExecutor>,
  request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
  response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
  error_interceptors: Vec<Arc<dyn ErrorInterceptor>>,
  retry_policy: RetryPolicy,
  default_timeout: Duration,
  default_retry_limit: usize,
}

impl HttpClient {
  /// Create a client with no interceptors.
  pub fn new(base_url: impl Into<String>, executor: Arc<dyn NetworkExecutor>) -> Self {
    Self {
      base_url: base_url.into(),
      executor,
      request_interceptors: Vec::new(),
      response_interceptors: Vec::new(),
      error_interceptors: Vec::new(),
      retry_policy: RetryPolicy::default(),
      default_timeout: DEFAULT_TIMEOUT,
      default_retry_limit: 0,
    }
  }

  /// Create a client from configuration with the default interceptors.
  pub fn from_config(
    config: &ApiConfig,
    executor: Arc<dyn NetworkExecutor>,
    credentials: Arc<dyn CredentialProvider>,
  ) -> Self {
    let mut client = Self::new(config.base_url.clone(), executor)
      .with_default_interceptors(credentials);
    client.default_timeout = Duration::from_millis(config.timeout_ms);
    client.default_retry_limit = config.retry_limit;
    client
  }

  /// Install bearer auth, default headers, logging and session handling.
  pub fn with_default_interceptors(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
    self.add_request_interceptor(BearerAuth::new(credentials.clone()));
    self.add_request_interceptor(DefaultHeaders);
    self.add_request_interceptor(RequestLogger);
    self.add_response_interceptor(ResponseLogger);
    self.add_error_interceptor(SessionGuard::new(credentials));
    self
  }

  pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
    self.retry_policy = policy;
    self
  }

  pub fn add_request_interceptor(&mut self, interceptor: impl RequestInterceptor + 'static) {
    self.request_interceptors.push(Arc::new(interceptor));
  }

  pub fn add_response_interceptor(&mut self, interceptor: impl ResponseInterceptor + 'static) {
    self.response_interceptors.push(Arc::new(interceptor));
  }

  pub fn add_error_interceptor(&mut self, interceptor: impl ErrorInterceptor + 'static) {
    self.error_interceptors.push(Arc::new(interceptor));
  }

  /// A request spec carrying this client's default timeout and retry limit.
  pub fn spec(&self, method: HttpMethod, path: impl Into<String>) -> RequestSpec {
    RequestSpec::new(method, path)
      .timeout(self.default_timeout)
      .retry(self.default_retry_limit)
  }

  pub async fn get<T: DeserializeOwned>(&self, path: &str) -> AppResult<ApiResponse<T>> {
    self.execute(self.spec(HttpMethod::Get, path)).await
  }

  pub async fn post<T, B>(&self, path: &str, body: &B) -> AppResult<ApiResponse<T>>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    self
      .execute(self.spec(HttpMethod::Post, path).json(body)?)
      .await
  }

  pub async fn put<T, B>(&self, path: &str, body: &B) -> AppResult<ApiResponse<T>>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    self
      .execute(self.spec(HttpMethod::Put, path).json(body)?)
      .await
  }

  pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> AppResult<ApiResponse<T>> {
    self.execute(self.spec(HttpMethod::Delete, path)).await
  }

  /// POST a multipart form.
  pub async fn upload<T: DeserializeOwned>(
    &self,
    path: &str,
    parts: Vec<FormPart>,
  ) -> AppResult<ApiResponse<T>> {
    self
      .execute(self.spec(HttpMethod::Post, path).multipart(parts))
      .await
  }

  /// Execute `spec` and decode the response data into `T`.
  pub async fn execute<T: DeserializeOwned>(&self, spec: RequestSpec) -> AppResult<ApiResponse<T>> {
    let response = self.execute_value(spec).await?;
    let data = serde_json::from_value(response.data).map_err(|e| {
      AppError::fault(
        ErrorCode::Unknown,
        format!("Failed to decode response: {}", e),
      )
    })?;

    Ok(ApiResponse {
      data,
      message: response.message,
      status: response.status,
    })
  }

  /// Execute `spec`, retrying transient failures, and return raw JSON data.
  pub async fn execute_value(&self, spec: RequestSpec) -> AppResult<ApiResponse<Value>> {
    let retry_limit = spec.retry_limit;
    let method = spec.method.as_str();
    let path = spec.path.clone();
    let attempts = AtomicUsize::new(0);
    let attempts = &attempts;
    let spec = &spec;

    let run = move || async move {
      attempts.fetch_add(1, Ordering::SeqCst);
      self.attempt(spec.clone()).await
    };

    run
      .retry(self.retry_policy.backoff(retry_limit))
      .sleep(tokio::time::sleep)
      .when(RetryPolicy::is_retryable)
      .notify(|err: &AppError, delay: Duration| {
        tracing::warn!(
          method,
          path = %path,
          code = %err.code,
          "Retrying request in {:?} ({}/{})",
          delay,
          attempts.load(Ordering::SeqCst),
          retry_limit
        );
      })
      .await
  }

  /// One attempt; failures have already passed the error interceptors.
  async fn attempt(&self, spec: RequestSpec) -> AppResult<ApiResponse<Value>> {
    match self.send_once(spec).await {
      Ok(response) => Ok(response),
      Err(err) => {
        let mut err = err;
        for interceptor in &self.error_interceptors {
          err = interceptor.on_error(err).await;
        }
        Err(err)
      }
    }
  }

  async fn send_once(&self, spec: RequestSpec) -> AppResult<ApiResponse<Value>> {
    let mut spec = spec;
    for interceptor in &self.request_interceptors {
      spec = interceptor.on_request(spec).await?;
    }

    let url = self.build_url(&spec.path, &spec.query)?;
    let timeout = spec.timeout;
    let request = HttpRequest {
      method: spec.method,
      url,
      headers: spec.headers,
      body: spec.body,
    };

    let cancel = CancellationToken::new();
    let _abort_on_exit = cancel.clone().drop_guard();

    let mut response =
      match tokio::time::timeout(timeout, self.executor.execute(request, cancel.clone())).await {
        Ok(result) => result.map_err(|failure| normalize(failure.into(), None))?,
        Err(_) => {
          cancel.cancel();
          return Err(normalize(RawFailure::Cancelled, None));
        }
      };

    for interceptor in &self.response_interceptors {
      response = interceptor.on_response(response).await?;
    }

    let body = parse_body(&response);
    if !response.is_success() {
      return Err(failure_from(response.status, body));
    }

    Ok(unwrap_envelope(response.status, body))
  }

  /// Join base URL and path, then append URL-encoded query parameters,
  /// skipping `None` values.
  fn build_url(&self, path: &str, query: &[(String, Option<String>)]) -> AppResult<String> {
    let full = if path.starts_with("http://") || path.starts_with("https://") {
      path.to_string()
    } else {
      format!(
        "{}/{}",
        self.base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
      )
    };

    let mut url = Url::parse(&full).map_err(|e| {
      AppError::fault(
        ErrorCode::Unknown,
        format!("Invalid request URL {}: {}", full, e),
      )
    })?;

    let params: Vec<(&String, &String)> = query
      .iter()
      .filter_map(|(key, value)| value.as_ref().map(|v| (key, v)))
      .collect();
    if !params.is_empty() {
      let mut pairs = url.query_pairs_mut();
      for (key, value) in params {
        pairs.append_pair(key, value);
      }
    }

    Ok(url.into())
  }
}

/// JSON when the content type says so, text otherwise.
fn parse_body(response: &HttpResponse) -> Value {
  if response.body.is_empty() {
    return Value::Null;
  }

  let text = || Value::String(String::from_utf8_lossy(&response.body).into_owned());
  if response.is_json() {
    serde_json::from_slice(&response.body).unwrap_or_else(|_| text())
  } else {
    text()
  }
}

/// Build the failure for a non-2xx response from its `{ message, errors }` body.
fn failure_from(status: u16, body: Value) -> AppError {
  let message = body
    .get("message")
    .and_then(Value::as_str)
    .map(String::from)
    .or_else(|| {
      reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(String::from)
    });
  let errors = body
    .get("errors")
    .and_then(|errors| serde_json::from_value::<FieldErrors>(errors.clone()).ok());

  normalize(
    RawFailure::Http {
      status,
      message,
      errors,
      body: if body.is_null() { None } else { Some(body) },
    },
    None,
  )
}

/// Unwrap a `{ data, message }` envelope; bodies without `data` are the data.
fn unwrap_envelope(status: u16, body: Value) -> ApiResponse<Value> {
  let message = body
    .get("message")
    .and_then(Value::as_str)
    .map(String::from);
  let data = match body.get("data") {
    Some(data) if !data.is_null() => data.clone(),
    _ => body,
  };

  ApiResponse {
    data,
    message,
    status,
  }
}
