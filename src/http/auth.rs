//! Credential providers used by the bearer-token interceptor.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::KeyValueStore;

/// Key holding the bearer token in a [`KeyValueStore`].
pub const AUTH_TOKEN_KEY: &str = "auth_token";
/// Key holding the cached user profile, dropped alongside the token.
pub const USER_DATA_KEY: &str = "user_data";

/// Source of the bearer credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
  /// Current token, if signed in.
  async fn token(&self) -> Option<String>;

  /// Forget stored credentials (e.g. after an authorization failure).
  async fn clear(&self);
}

/// In-memory credentials.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
  token: RwLock<Option<String>>,
}

impl MemoryCredentials {
  pub fn new(token: Option<String>) -> Self {
    Self {
      token: RwLock::new(token),
    }
  }

  /// Read the token from `PINSYNC_API_TOKEN` / `PIN_API_TOKEN`, if set.
  pub fn from_env() -> Self {
    Self::new(crate::config::Config::api_token().ok())
  }

  pub async fn set(&self, token: impl Into<String>) {
    *self.token.write().await = Some(token.into());
  }
}

#[async_trait]
impl CredentialProvider for MemoryCredentials {
  async fn token(&self) -> Option<String> {
    self.token.read().await.clone()
  }

  async fn clear(&self) {
    *self.token.write().await = None;
  }
}

/// Credentials persisted in the application's key/value store.
#[derive(Clone)]
pub struct StoredCredentials {
  store: Arc<dyn KeyValueStore>,
}

impl StoredCredentials {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store }
  }
}

#[async_trait]
impl CredentialProvider for StoredCredentials {
  async fn token(&self) -> Option<String> {
    match self.store.get(AUTH_TOKEN_KEY).await {
      Ok(Some(serde_json::Value::String(token))) if !token.is_empty() => Some(token),
      Ok(_) => None,
      Err(e) => {
        tracing::warn!("Failed to read stored credentials: {}", e);
        None
      }
    }
  }

  async fn clear(&self) {
    for key in [AUTH_TOKEN_KEY, USER_DATA_KEY] {
      if let Err(e) = self.store.remove(key).await {
        tracing::warn!("Failed to clear {}: {}", key, e);
      }
    }
  }
}
