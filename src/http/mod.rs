//! Transport core: builds and executes outbound requests.
//!
//! Knows nothing about pins. A call goes through:
//! - request interceptors (credentials, default headers, logging)
//! - URL building with encoded query parameters
//! - the network executor under a per-attempt timeout
//! - response interceptors, body parsing and status checks
//! - error interceptors and bounded exponential-backoff retry

pub mod auth;
mod client;
mod executor;
pub mod interceptor;
mod retry;
mod types;

pub use auth::{CredentialProvider, MemoryCredentials, StoredCredentials};
pub use client::HttpClient;
pub use executor::{NetworkExecutor, ReqwestExecutor, TransportFailure};
pub use interceptor::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor};
pub use retry::{RetryPolicy, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS};
pub use types::{
  header_get, ApiResponse, FormPart, HttpHeaders, HttpMethod, HttpRequest, HttpResponse,
  RequestBody, RequestSpec, DEFAULT_TIMEOUT,
};
