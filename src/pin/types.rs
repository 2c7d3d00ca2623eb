//! Domain types for pins.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::store::Record;

/// Prefix for ids assigned locally before the server has seen the pin.
pub const LOCAL_ID_PREFIX: &str = "local_";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
  #[serde(alias = "latitude")]
  pub lat: f64,
  #[serde(alias = "longitude")]
  pub lon: f64,
}

impl GeoPoint {
  pub fn new(lat: f64, lon: f64) -> Self {
    Self { lat, lon }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinStatus {
  Visited,
  #[default]
  #[serde(alias = "wantToGo")]
  WantToGo,
}

impl PinStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      PinStatus::Visited => "visited",
      PinStatus::WantToGo => "want_to_go",
    }
  }
}

/// A saved place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
  #[serde(default)]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub location: GeoPoint,
  #[serde(default)]
  pub status: PinStatus,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub photos: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub caption: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rating: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub visit_date: Option<NaiveDate>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(default)]
  pub is_favorite: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Pin {
  /// A new, not yet saved pin. The id is assigned on create.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      id: String::new(),
      name: name.into(),
      location: GeoPoint::default(),
      status: PinStatus::default(),
      photos: Vec::new(),
      caption: None,
      rating: None,
      visit_date: None,
      address: None,
      is_favorite: false,
      created_at: None,
      updated_at: None,
    }
  }

  pub fn at(mut self, lat: f64, lon: f64) -> Self {
    self.location = GeoPoint::new(lat, lon);
    self
  }

  pub fn with_status(mut self, status: PinStatus) -> Self {
    self.status = status;
    self
  }

  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.id = id.into();
    self
  }

  /// True when the id was assigned on this device.
  pub fn is_local(&self) -> bool {
    self.id.is_empty() || self.id.starts_with(LOCAL_ID_PREFIX)
  }
}

/// Partial update for a pin. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<GeoPoint>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<PinStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub photos: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub caption: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rating: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub visit_date: Option<NaiveDate>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_favorite: Option<bool>,
}

impl Record for Pin {
  type Patch = PinPatch;

  fn record_id(&self) -> &str {
    &self.id
  }

  fn set_record_id(&mut self, id: &str) {
    self.id = id.to_string();
  }

  fn apply(&self, patch: &PinPatch) -> Self {
    let mut pin = self.clone();
    if let Some(name) = &patch.name {
      pin.name = name.clone();
    }
    if let Some(location) = patch.location {
      pin.location = location;
    }
    if let Some(status) = patch.status {
      pin.status = status;
    }
    if let Some(photos) = &patch.photos {
      pin.photos = photos.clone();
    }
    if let Some(caption) = &patch.caption {
      pin.caption = Some(caption.clone());
    }
    if let Some(rating) = patch.rating {
      pin.rating = Some(rating);
    }
    if let Some(visit_date) = patch.visit_date {
      pin.visit_date = Some(visit_date);
    }
    if let Some(address) = &patch.address {
      pin.address = Some(address.clone());
    }
    if let Some(is_favorite) = patch.is_favorite {
      pin.is_favorite = is_favorite;
    }
    pin
  }

  fn collection() -> &'static str {
    "pins"
  }
}
