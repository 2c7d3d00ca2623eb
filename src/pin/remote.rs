//! Network side of the pin repository.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::api_types::{ApiPin, PinCreateRequest};
use super::types::Pin;
use crate::config::PinEndpoints;
use crate::error::{AppError, AppResult, ErrorCode};
use crate::http::{FormPart, HttpClient, HttpMethod};
use crate::sync::MutationAction;

/// Server operations on pins.
#[async_trait]
pub trait PinRemote: Send + Sync {
  async fn list(&self) -> AppResult<Vec<Pin>>;

  /// Returns the pin as stored by the server (with its server id).
  async fn create(&self, pin: &Pin) -> AppResult<Pin>;

  async fn update(&self, pin: &Pin) -> AppResult<Pin>;

  async fn delete(&self, id: &str) -> AppResult<()>;

  /// Whether the server side for `action` exists. The repository keeps
  /// unsupported writes local and queued instead of calling through.
  fn supports(&self, _action: MutationAction) -> bool {
    true
  }
}

/// `PinRemote` over the HTTP client and the configured endpoints.
#[derive(Clone)]
pub struct HttpPinRemote {
  client: HttpClient,
  endpoints: PinEndpoints,
}

impl HttpPinRemote {
  pub fn new(client: HttpClient, endpoints: PinEndpoints) -> Self {
    Self { client, endpoints }
  }

  /// Endpoint for `id` from an optional `{id}` template.
  fn item_path(template: Option<&str>, action: MutationAction, id: &str) -> AppResult<String> {
    template.map(|t| t.replace("{id}", id)).ok_or_else(|| {
      AppError::fault(
        ErrorCode::SyncHandlerMissing,
        format!("No {} endpoint configured for pins", action),
      )
    })
  }
}

fn pins_from(data: Value) -> AppResult<Vec<Pin>> {
  let data = match data {
    Value::Null => return Ok(Vec::new()),
    // an envelope with null data is passed through whole
    Value::Object(ref map) if map.get("data").is_some_and(Value::is_null) => {
      return Ok(Vec::new())
    }
    other => other,
  };

  let pins: Vec<ApiPin> = serde_json::from_value(data)?;
  Ok(pins.into_iter().map(Pin::from).collect())
}

#[async_trait]
impl PinRemote for HttpPinRemote {
  async fn list(&self) -> AppResult<Vec<Pin>> {
    let spec = self.client.spec(HttpMethod::Get, self.endpoints.list.as_str());
    let response = self.client.execute_value(spec).await?;
    let pins = pins_from(response.data)?;
    debug!(count = pins.len(), "Fetched pins");
    Ok(pins)
  }

  async fn create(&self, pin: &Pin) -> AppResult<Pin> {
    let parts = vec![FormPart::json("data", &PinCreateRequest::from(pin))?];
    let response = self
      .client
      .upload::<ApiPin>(&self.endpoints.create, parts)
      .await?;
    Ok(response.data.into())
  }

  async fn update(&self, pin: &Pin) -> AppResult<Pin> {
    let path = Self::item_path(self.endpoints.update.as_deref(), MutationAction::Update, &pin.id)?;
    let spec = self
      .client
      .spec(HttpMethod::Put, path)
      .json(&PinCreateRequest::from(pin))?;
    let response = self.client.execute_value(spec).await?;

    // servers may answer with the stored pin or with nothing useful
    match serde_json::from_value::<ApiPin>(response.data) {
      Ok(saved) => Ok(saved.into()),
      Err(e) => {
        debug!(id = %pin.id, error = %e, "Update response is not a pin, keeping sent copy");
        Ok(pin.clone())
      }
    }
  }

  async fn delete(&self, id: &str) -> AppResult<()> {
    let path = Self::item_path(self.endpoints.delete.as_deref(), MutationAction::Delete, id)?;
    self
      .client
      .execute_value(self.client.spec(HttpMethod::Delete, path))
      .await?;
    Ok(())
  }

  fn supports(&self, action: MutationAction) -> bool {
    match action {
      MutationAction::Create => true,
      MutationAction::Update => self.endpoints.update.is_some(),
      MutationAction::Delete => self.endpoints.delete.is_some(),
    }
  }
}
