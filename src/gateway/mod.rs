//! Remote data gateway: the engine's only door to the Notion-backed source
//! of truth.
//!
//! The trait seam exists so the engine can be exercised against a scripted
//! gateway in tests; production uses [`NotionProxyClient`].

pub mod api_types;
mod client;

use async_trait::async_trait;

use crate::error::Result;
use crate::itinerary::types::{DateRange, Record, RecordFields};

pub use client::NotionProxyClient;

/// Result of a full collection fetch.
#[derive(Debug, Clone)]
pub struct FetchedCollection {
  pub items: Vec<Record>,
  pub collection_name: String,
  pub remote_modified_time: String,
}

/// One item of a bulk update batch.
#[derive(Debug, Clone)]
pub struct BulkUpdateRequest {
  pub id: String,
  pub fields: RecordFields,
}

/// Per-item failure inside an otherwise completed batch.
#[derive(Debug, Clone)]
pub struct BulkError {
  pub id: String,
  pub reason: String,
}

/// Aggregate outcome of a bulk update. Per-item rejections live in `errors`;
/// they are data, not an `Err`.
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
  pub total: usize,
  pub successful: usize,
  pub failed: usize,
  pub results: Vec<Record>,
  pub errors: Vec<BulkError>,
}

/// Abstract remote collection API (query/create/update/archive contract).
#[async_trait]
pub trait RemoteGateway: Send + Sync {
  /// Cheap metadata probe: the collection's last-edited timestamp.
  async fn remote_modified_time(&self, collection_id: &str) -> Result<String>;

  /// Full data pull, optionally narrowed to a date range.
  async fn fetch_collection(
    &self,
    collection_id: &str,
    range: Option<&DateRange>,
  ) -> Result<FetchedCollection>;

  /// Create one record; the gateway assigns and returns the real id.
  async fn create_record(&self, collection_id: &str, fields: &RecordFields) -> Result<Record>;

  /// Update one record by its remote id, returning the echoed new state.
  async fn update_record(&self, id: &str, fields: &RecordFields) -> Result<Record>;

  /// Archive one record (soft delete).
  async fn delete_record(&self, id: &str) -> Result<()>;

  /// Apply many independent updates, tolerating per-item failure.
  ///
  /// The default issues one `update_record` per item sequentially (Notion
  /// rate limits punish parallel writes) and keeps going past failures; no
  /// item is retried within the batch.
  async fn bulk_update(&self, updates: &[BulkUpdateRequest]) -> Result<BulkOutcome> {
    let mut outcome = BulkOutcome {
      total: updates.len(),
      ..Default::default()
    };

    for request in updates {
      match self.update_record(&request.id, &request.fields).await {
        Ok(record) => {
          outcome.successful += 1;
          outcome.results.push(record);
        }
        Err(e) => {
          outcome.failed += 1;
          outcome.errors.push(BulkError {
            id: request.id.clone(),
            reason: e.to_string(),
          });
        }
      }
    }

    Ok(outcome)
  }
}
