//! Serde types matching the pin API.
//!
//! The server's shape differs from the domain type (numeric ids, flattened
//! address fields, `images` that may be null), so responses are decoded
//! here and converted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{GeoPoint, Pin, PinStatus};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiId {
  Number(i64),
  Text(String),
}

impl ApiId {
  fn into_string(self) -> String {
    match self {
      ApiId::Number(n) => n.to_string(),
      ApiId::Text(s) => s,
    }
  }
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiLocation {
  #[serde(default, alias = "latitude")]
  pub lat: f64,
  #[serde(default, alias = "longitude")]
  pub lon: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPin {
  pub id: ApiId,
  #[serde(default, alias = "name")]
  pub place_name: String,
  #[serde(default)]
  pub location: ApiLocation,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default, alias = "photos")]
  pub images: Option<Vec<String>>,
  #[serde(default, alias = "caption")]
  pub notes: Option<String>,
  pub rating: Option<u8>,
  #[serde(default, alias = "visitDate")]
  pub visited_date: Option<String>,
  #[serde(default, alias = "address")]
  pub address_formatted: Option<String>,
  #[serde(default)]
  pub is_favorite: bool,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
}

fn parse_status(status: Option<&str>) -> PinStatus {
  match status {
    Some("visited") => PinStatus::Visited,
    _ => PinStatus::WantToGo,
  }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
fn parse_date(value: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(value, "%Y-%m-%d")
    .ok()
    .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|d| d.date_naive()))
}

impl From<ApiPin> for Pin {
  fn from(api: ApiPin) -> Self {
    Pin {
      id: api.id.into_string(),
      name: api.place_name,
      location: GeoPoint::new(api.location.lat, api.location.lon),
      status: parse_status(api.status.as_deref()),
      photos: api.images.unwrap_or_default(),
      caption: api.notes,
      rating: api.rating,
      visit_date: api.visited_date.as_deref().and_then(parse_date),
      address: api.address_formatted,
      is_favorite: api.is_favorite,
      created_at: api.created_at,
      updated_at: api.updated_at,
    }
  }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiLocationRequest {
  pub lat: f64,
  pub lon: f64,
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
}

/// Body of the create call, sent as the `data` part of a multipart form.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PinCreateRequest {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rating: Option<u8>,
  pub status: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub visit_date: Option<String>,
  pub location: ApiLocationRequest,
}

impl From<&Pin> for PinCreateRequest {
  fn from(pin: &Pin) -> Self {
    PinCreateRequest {
      name: pin.name.clone(),
      notes: pin.caption.clone(),
      rating: pin.rating,
      status: pin.status.as_str().to_string(),
      visit_date: pin.visit_date.map(|d| d.format("%Y-%m-%d").to_string()),
      location: ApiLocationRequest {
        lat: pin.location.lat,
        lon: pin.location.lon,
        name: pin.name.clone(),
        display_name: pin.address.clone(),
      },
    }
  }
}
