//! Cache keys for snapshot lookups.

use crate::itinerary::types::DateRange;

/// Identifies one cached snapshot: a collection plus the optional date-range
/// filter it was fetched with. Different ranges over the same collection are
/// independent entries and never merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub collection_id: String,
  pub range: Option<DateRange>,
}

impl CacheKey {
  pub fn new(collection_id: impl Into<String>, range: Option<DateRange>) -> Self {
    Self {
      collection_id: collection_id.into(),
      range,
    }
  }

  /// Stable string form used as the storage primary key:
  /// `collectionId` or `collectionId-startDate-endDate`.
  pub fn storage_key(&self) -> String {
    match &self.range {
      Some(range) => format!("{}-{}-{}", self.collection_id, range.start, range.end),
      None => self.collection_id.clone(),
    }
  }
}

impl std::fmt::Display for CacheKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.storage_key())
  }
}
