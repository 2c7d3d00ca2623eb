//! Request and response shapes that flow through the transport.

use std::time::Duration;

use serde::Serialize;

use crate::error::AppResult;

/// Default per-attempt deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// HTTP verbs used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl HttpMethod {
  pub fn as_str(self) -> &'static str {
    match self {
      HttpMethod::Get => "GET",
      HttpMethod::Post => "POST",
      HttpMethod::Put => "PUT",
      HttpMethod::Patch => "PATCH",
      HttpMethod::Delete => "DELETE",
    }
  }
}

/// Header list; names compare case-insensitively through [`header_get`].
pub type HttpHeaders = Vec<(String, String)>;

/// First header value matching `name` (case-insensitive).
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
  headers
    .iter()
    .find(|(k, _)| k.eq_ignore_ascii_case(name))
    .map(|(_, v)| v.as_str())
}

/// Insert `name: value` unless a header with that name is already present.
pub fn header_set_default(headers: &mut HttpHeaders, name: &str, value: &str) {
  if header_get(headers, name).is_none() {
    headers.push((name.to_string(), value.to_string()));
  }
}

/// One part of a multipart form body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
  pub name: String,
  pub content_type: Option<String>,
  pub file_name: Option<String>,
  pub data: Vec<u8>,
}

impl FormPart {
  /// A part holding a JSON document.
  pub fn json<T: Serialize>(name: &str, value: &T) -> AppResult<Self> {
    Ok(Self {
      name: name.to_string(),
      content_type: Some("application/json".to_string()),
      file_name: None,
      data: serde_json::to_vec(value)?,
    })
  }
}

/// Outgoing body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
  #[default]
  Empty,
  /// Serialized JSON document.
  Json(Vec<u8>),
  /// Multipart form; the executor chooses the boundary and content type.
  Multipart(Vec<FormPart>),
}

/// Description of one logical call, before interceptors run.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
  pub method: HttpMethod,
  /// Path relative to the base URL, or an absolute `http(s)://` URL.
  pub path: String,
  /// Query parameters; `None` values are omitted from the URL.
  pub query: Vec<(String, Option<String>)>,
  pub headers: HttpHeaders,
  pub body: RequestBody,
  /// Retries after the first attempt.
  pub retry_limit: usize,
  /// Deadline for each attempt.
  pub timeout: Duration,
  /// Whether the credential interceptor should attach a bearer token.
  pub requires_auth: bool,
  /// Suppress the default `Content-Type` (binary and multipart bodies).
  pub skip_default_content_type: bool,
}

impl RequestSpec {
  pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      query: Vec::new(),
      headers: Vec::new(),
      body: RequestBody::Empty,
      retry_limit: 0,
      timeout: DEFAULT_TIMEOUT,
      requires_auth: true,
      skip_default_content_type: false,
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(HttpMethod::Get, path)
  }

  pub fn post(path: impl Into<String>) -> Self {
    Self::new(HttpMethod::Post, path)
  }

  pub fn put(path: impl Into<String>) -> Self {
    Self::new(HttpMethod::Put, path)
  }

  pub fn patch(path: impl Into<String>) -> Self {
    Self::new(HttpMethod::Patch, path)
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self::new(HttpMethod::Delete, path)
  }

  pub fn query(mut self, key: &str, value: impl ToString) -> Self {
    self.query.push((key.to_string(), Some(value.to_string())));
    self
  }

  pub fn query_opt<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
    self
      .query
      .push((key.to_string(), value.map(|v| v.to_string())));
    self
  }

  pub fn header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> AppResult<Self> {
    self.body = RequestBody::Json(serde_json::to_vec(body)?);
    Ok(self)
  }

  /// Multipart bodies must not be tagged as JSON.
  pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
    self.body = RequestBody::Multipart(parts);
    self.skip_default_content_type = true;
    self
  }

  pub fn retry(mut self, retry_limit: usize) -> Self {
    self.retry_limit = retry_limit;
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn without_auth(mut self) -> Self {
    self.requires_auth = false;
    self
  }
}

/// Fully resolved request handed to the network executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
  pub method: HttpMethod,
  pub url: String,
  pub headers: HttpHeaders,
  pub body: RequestBody,
}

/// Raw response returned by the network executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub headers: HttpHeaders,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn header(&self, name: &str) -> Option<&str> {
    header_get(&self.headers, name)
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_json(&self) -> bool {
    self
      .header("content-type")
      .map(|ct| ct.contains("application/json"))
      .unwrap_or(false)
  }
}

/// Successful, parsed response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
  pub data: T,
  pub message: Option<String>,
  pub status: u16,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let headers = vec![("Content-Type".to_string(), "text/plain".to_string())];
    assert_eq!(header_get(&headers, "content-type"), Some("text/plain"));
    assert_eq!(header_get(&headers, "accept"), None);
  }

  #[test]
  fn test_set_default_keeps_existing() {
    let mut headers = vec![("accept".to_string(), "text/html".to_string())];
    header_set_default(&mut headers, "Accept", "application/json");
    header_set_default(&mut headers, "Content-Type", "application/json");
    assert_eq!(header_get(&headers, "Accept"), Some("text/html"));
    assert_eq!(header_get(&headers, "content-type"), Some("application/json"));
  }

  #[test]
  fn test_multipart_suppresses_content_type() {
    let spec = RequestSpec::post("/upload").multipart(vec![]);
    assert!(spec.skip_default_content_type);
    assert_eq!(spec.timeout, DEFAULT_TIMEOUT);
  }
}
