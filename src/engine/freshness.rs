//! Freshness reconciliation: decide cached-vs-fetch per read.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, SnapshotStore};
use crate::error::Result;
use crate::gateway::RemoteGateway;
use crate::itinerary::types::CollectionSnapshot;

/// Serves reads from the persistent cache as long as the remote collection
/// has not been modified since the snapshot was taken.
///
/// Each read costs one cheap metadata probe; the full fetch only happens when
/// the probe reports a newer remote timestamp (or nothing is cached). A
/// failed probe fails the read outright — serving possibly-stale data while
/// claiming it was checked would be worse than an error the caller can
/// retry.
pub struct FreshnessReconciler<G, S> {
  gateway: Arc<G>,
  store: Arc<S>,
}

impl<G: RemoteGateway, S: SnapshotStore> FreshnessReconciler<G, S> {
  pub fn new(gateway: Arc<G>, store: Arc<S>) -> Self {
    Self { gateway, store }
  }

  pub async fn load(&self, key: &CacheKey) -> Result<CollectionSnapshot> {
    // A broken cache read degrades to a miss; the warning keeps the
    // staleness risk visible.
    let cached = match self.store.get(key) {
      Ok(cached) => cached,
      Err(e) => {
        warn!(key = %key, error = %e, "cache read failed, treating as miss");
        None
      }
    };

    let remote_modified = self.gateway.remote_modified_time(&key.collection_id).await?;

    if let Some(snapshot) = cached {
      // ISO-8601 UTC timestamps compare correctly as strings. Equal means
      // no write happened, so equality counts as a hit.
      if snapshot.remote_modified_time.as_str() >= remote_modified.as_str() {
        debug!(
          key = %key,
          cached = %snapshot.remote_modified_time,
          remote = %remote_modified,
          "cache hit"
        );
        return Ok(snapshot);
      }
      info!(
        key = %key,
        cached = %snapshot.remote_modified_time,
        remote = %remote_modified,
        "cache stale, refetching"
      );
    } else {
      info!(key = %key, "cache miss, fetching");
    }

    let fetched = self
      .gateway
      .fetch_collection(&key.collection_id, key.range.as_ref())
      .await?;

    let snapshot = CollectionSnapshot {
      items: fetched.items,
      collection_id: key.collection_id.clone(),
      collection_name: fetched.collection_name,
      remote_modified_time: remote_modified,
      fetched_at: Utc::now(),
      date_range: key.range.clone(),
    };

    if let Err(e) = self.store.set(key, &snapshot) {
      // Durability is best-effort secondary to serving the fetched data.
      warn!(key = %key, error = %e, "failed to persist refreshed snapshot");
    }

    Ok(snapshot)
  }
}
