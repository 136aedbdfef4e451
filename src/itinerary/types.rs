//! Core itinerary domain types.
//!
//! These are separate from the gateway's wire types (`gateway::api_types`) so
//! the engine works with stable, typed data regardless of what the Notion
//! proxy returns.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Locally generated placeholder id for a record that has been created
/// optimistically but not yet confirmed by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempId(Uuid);

impl TempId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for TempId {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Display for TempId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "tmp-{}", self.0)
  }
}

/// Identity of a record. `Remote` ids are assigned by the gateway and stable
/// across updates; `Pending` ids exist only between an optimistic create and
/// its confirmation (or rollback) and are never sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordId {
  Remote(String),
  Pending(TempId),
}

impl RecordId {
  /// The gateway-assigned id, if this record has one yet.
  pub fn remote(&self) -> Option<&str> {
    match self {
      RecordId::Remote(id) => Some(id),
      RecordId::Pending(_) => None,
    }
  }

  pub fn is_pending(&self) -> bool {
    matches!(self, RecordId::Pending(_))
  }
}

impl std::fmt::Display for RecordId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RecordId::Remote(id) => write!(f, "{}", id),
      RecordId::Pending(tmp) => write!(f, "{}", tmp),
    }
  }
}

/// Time-of-day tag on an itinerary record. The declaration order is the
/// display rank used by the view builder (summary first, overnight last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimePeriod {
  Summary,
  Dawn,
  Breakfast,
  Morning,
  Lunch,
  Afternoon,
  Evening,
  Dinner,
  Night,
  LateNight,
  Overnight,
  /// Anything the gateway sends that we don't know. Ranks with "no period".
  #[serde(other)]
  Other,
}

impl TimePeriod {
  /// Fixed display rank. `None` means "after every ranked period".
  pub fn rank(&self) -> Option<u8> {
    match self {
      TimePeriod::Summary => Some(0),
      TimePeriod::Dawn => Some(1),
      TimePeriod::Breakfast => Some(2),
      TimePeriod::Morning => Some(3),
      TimePeriod::Lunch => Some(4),
      TimePeriod::Afternoon => Some(5),
      TimePeriod::Evening => Some(6),
      TimePeriod::Dinner => Some(7),
      TimePeriod::Night => Some(8),
      TimePeriod::LateNight => Some(9),
      TimePeriod::Overnight => Some(10),
      TimePeriod::Other => None,
    }
  }

  pub const ALL: [TimePeriod; 11] = [
    TimePeriod::Summary,
    TimePeriod::Dawn,
    TimePeriod::Breakfast,
    TimePeriod::Morning,
    TimePeriod::Lunch,
    TimePeriod::Afternoon,
    TimePeriod::Evening,
    TimePeriod::Dinner,
    TimePeriod::Night,
    TimePeriod::LateNight,
    TimePeriod::Overnight,
  ];

  pub fn label(&self) -> &'static str {
    match self {
      TimePeriod::Summary => "summary",
      TimePeriod::Dawn => "dawn",
      TimePeriod::Breakfast => "breakfast",
      TimePeriod::Morning => "morning",
      TimePeriod::Lunch => "lunch",
      TimePeriod::Afternoon => "afternoon",
      TimePeriod::Evening => "evening",
      TimePeriod::Dinner => "dinner",
      TimePeriod::Night => "night",
      TimePeriod::LateNight => "late-night",
      TimePeriod::Overnight => "overnight",
      TimePeriod::Other => "other",
    }
  }
}

impl std::str::FromStr for TimePeriod {
  type Err = String;

  /// Strict parse for user input (unlike deserialization, which tolerates
  /// unknown values from the gateway).
  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|p| p.label() == s)
      .ok_or_else(|| format!("unknown time period: {}", s))
  }
}

/// One itinerary entry (maps to a Notion page).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
  pub id: RecordId,
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

impl Record {
  /// Display rank of the record's first time period; records without one
  /// (or with only unknown periods) sort after every ranked record.
  pub fn period_rank(&self) -> Option<u8> {
    self.time_periods.first().and_then(TimePeriod::rank)
  }
}

/// Partial record used as a mutation payload: only `Some` fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
  pub title: Option<String>,
  pub date: Option<NaiveDate>,
  pub time_periods: Option<Vec<TimePeriod>>,
  pub sort_order: Option<f64>,
  pub price: Option<f64>,
  pub currency: Option<String>,
  pub transport: Option<String>,
  pub important_info: Option<String>,
  pub reference: Option<String>,
  pub description: Option<String>,
  pub thumbnail_url: Option<String>,
  pub map_link: Option<String>,
}

impl RecordFields {
  /// Overlay every populated field onto `record`.
  pub fn apply_to(&self, record: &mut Record) {
    if let Some(v) = &self.title {
      record.title = v.clone();
    }
    if let Some(v) = self.date {
      record.date = Some(v);
    }
    if let Some(v) = &self.time_periods {
      record.time_periods = v.clone();
    }
    if let Some(v) = self.sort_order {
      record.sort_order = Some(v);
    }
    if let Some(v) = self.price {
      record.price = Some(v);
    }
    if let Some(v) = &self.currency {
      record.currency = Some(v.clone());
    }
    if let Some(v) = &self.transport {
      record.transport = Some(v.clone());
    }
    if let Some(v) = &self.important_info {
      record.important_info = Some(v.clone());
    }
    if let Some(v) = &self.reference {
      record.reference = Some(v.clone());
    }
    if let Some(v) = &self.description {
      record.description = Some(v.clone());
    }
    if let Some(v) = &self.thumbnail_url {
      record.thumbnail_url = Some(v.clone());
    }
    if let Some(v) = &self.map_link {
      record.map_link = Some(v.clone());
    }
  }

  /// Build a brand-new record (for optimistic create) under a temporary id.
  pub fn to_record(&self, id: RecordId) -> Record {
    let mut record = Record {
      id,
      title: String::new(),
      date: None,
      time_periods: Vec::new(),
      sort_order: None,
      price: None,
      currency: None,
      transport: None,
      important_info: None,
      reference: None,
      description: None,
      thumbnail_url: None,
      map_link: None,
    };
    self.apply_to(&mut record);
    record
  }
}

/// Inclusive date-range filter narrowing which records a query covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

/// Complete point-in-time copy of a collection plus its freshness metadata.
///
/// Snapshots are immutable once built: every optimistic apply, commit,
/// rollback or refresh replaces the whole snapshot behind an `Arc`, never a
/// field in place, so concurrent readers always see a consistent view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
  pub items: Vec<Record>,
  pub collection_id: String,
  /// Display name reported by the gateway; may lag behind until a refresh.
  #[serde(default)]
  pub collection_name: String,
  /// Authoritative freshness marker (ISO-8601) from the gateway. ISO-8601
  /// in UTC compares correctly as a plain string.
  pub remote_modified_time: String,
  pub fetched_at: DateTime<Utc>,
  #[serde(default)]
  pub date_range: Option<DateRange>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn period_ranks_follow_the_day() {
    assert_eq!(TimePeriod::Summary.rank(), Some(0));
    assert_eq!(TimePeriod::Breakfast.rank(), Some(2));
    assert_eq!(TimePeriod::Dinner.rank(), Some(7));
    assert_eq!(TimePeriod::Overnight.rank(), Some(10));
    assert_eq!(TimePeriod::Other.rank(), None);
  }

  #[test]
  fn unknown_period_deserializes_to_other() {
    let period: TimePeriod = serde_json::from_str("\"brunch\"").unwrap();
    assert_eq!(period, TimePeriod::Other);

    let known: TimePeriod = serde_json::from_str("\"late-night\"").unwrap();
    assert_eq!(known, TimePeriod::LateNight);
  }

  #[test]
  fn fields_apply_only_populated_values() {
    let mut record = RecordFields {
      title: Some("Fushimi Inari".into()),
      price: Some(0.0),
      ..Default::default()
    }
    .to_record(RecordId::Remote("r1".into()));

    let patch = RecordFields {
      title: Some("Fushimi Inari Taisha".into()),
      transport: Some("JR Nara line".into()),
      ..Default::default()
    };
    patch.apply_to(&mut record);

    assert_eq!(record.title, "Fushimi Inari Taisha");
    assert_eq!(record.transport.as_deref(), Some("JR Nara line"));
    // Untouched by the patch.
    assert_eq!(record.price, Some(0.0));
  }

  #[test]
  fn snapshot_tolerates_missing_new_fields() {
    // Old cache entries may predate collection_name / date_range.
    let json = r#"{
      "items": [],
      "collection_id": "trip-42",
      "remote_modified_time": "2024-05-01T10:00:00Z",
      "fetched_at": "2024-05-01T10:00:05Z"
    }"#;
    let snapshot: CollectionSnapshot = serde_json::from_str(json).unwrap();
    assert_eq!(snapshot.collection_name, "");
    assert!(snapshot.date_range.is_none());
  }

  #[test]
  fn pending_ids_are_distinct() {
    assert_ne!(TempId::new(), TempId::new());
    let id = RecordId::Pending(TempId::new());
    assert!(id.is_pending());
    assert_eq!(id.remote(), None);
  }
}
