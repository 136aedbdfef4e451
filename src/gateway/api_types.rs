//! Serde types matching the Notion-proxy HTTP API.
//!
//! The proxy flattens Notion's property objects into plain JSON with
//! camelCase keys. These types stay separate from the domain types so wire
//! changes never leak into the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::itinerary::types::{Record, RecordFields, RecordId, TimePeriod};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRecord {
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub date: Option<NaiveDate>,
  #[serde(default)]
  pub time_periods: Vec<TimePeriod>,
  #[serde(default)]
  pub sort_order: Option<f64>,
  #[serde(default)]
  pub price: Option<f64>,
  #[serde(default)]
  pub currency: Option<String>,
  #[serde(default)]
  pub transport: Option<String>,
  #[serde(default)]
  pub important_info: Option<String>,
  #[serde(default)]
  pub reference: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub thumbnail_url: Option<String>,
  #[serde(default)]
  pub map_link: Option<String>,
}

impl ApiRecord {
  pub fn into_record(self) -> Record {
    Record {
      id: RecordId::Remote(self.id),
      title: self.title,
      date: self.date,
      time_periods: self.time_periods,
      sort_order: self.sort_order,
      price: self.price,
      currency: self.currency,
      transport: self.transport,
      important_info: self.important_info,
      reference: self.reference,
      description: self.description,
      thumbnail_url: self.thumbnail_url,
      map_link: self.map_link,
    }
  }
}

/// Outgoing field patch; only populated fields are sent.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFieldsPayload<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date: Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub time_periods: Option<&'a [TimePeriod]>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sort_order: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub price: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub currency: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub transport: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub important_info: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reference: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub thumbnail_url: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub map_link: Option<&'a str>,
}

impl<'a> From<&'a RecordFields> for ApiFieldsPayload<'a> {
  fn from(fields: &'a RecordFields) -> Self {
    Self {
      title: fields.title.as_deref(),
      date: fields.date,
      time_periods: fields.time_periods.as_deref(),
      sort_order: fields.sort_order,
      price: fields.price,
      currency: fields.currency.as_deref(),
      transport: fields.transport.as_deref(),
      important_info: fields.important_info.as_deref(),
      reference: fields.reference.as_deref(),
      description: fields.description.as_deref(),
      thumbnail_url: fields.thumbnail_url.as_deref(),
      map_link: fields.map_link.as_deref(),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiModifiedTimeResponse {
  pub last_edited_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiQueryResponse {
  #[serde(default)]
  pub items: Vec<ApiRecord>,
  #[serde(default)]
  pub collection_name: String,
  pub last_edited_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDeleteResponse {
  pub id: String,
  #[serde(default)]
  pub archived: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBulkError {
  pub id: String,
  #[serde(default)]
  pub error: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBulkResponse {
  pub total: usize,
  pub successful: usize,
  pub failed: usize,
  #[serde(default)]
  pub results: Vec<ApiRecord>,
  #[serde(default)]
  pub errors: Vec<ApiBulkError>,
}

/// Error body shape the proxy uses for non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
}

impl ApiErrorBody {
  pub fn into_message(self) -> Option<String> {
    self.error.or(self.message)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_parses_with_minimal_fields() {
    let json = r#"{"id": "abc123", "title": "Kinkaku-ji"}"#;
    let record = serde_json::from_str::<ApiRecord>(json).unwrap().into_record();

    assert_eq!(record.id, RecordId::Remote("abc123".into()));
    assert_eq!(record.title, "Kinkaku-ji");
    assert!(record.time_periods.is_empty());
    assert!(record.sort_order.is_none());
  }

  #[test]
  fn fields_payload_skips_unset_fields() {
    let fields = RecordFields {
      title: Some("Gion".into()),
      sort_order: Some(3.0),
      ..Default::default()
    };
    let json = serde_json::to_value(ApiFieldsPayload::from(&fields)).unwrap();

    assert_eq!(json["title"], "Gion");
    assert_eq!(json["sortOrder"], 3.0);
    assert!(json.get("price").is_none());
    assert!(json.get("timePeriods").is_none());
  }
}
