//! Collection handles: the UI-facing surface of the engine.
//!
//! A [`CollectionHandle`] owns the single piece of mutable shared state per
//! cache key — the current in-memory snapshot — and runs the optimistic
//! mutation state machine against it:
//!
//! ```text
//! IDLE -> APPLYING_OPTIMISTIC -> AWAITING_REMOTE -> {COMMITTED | ROLLED_BACK}
//! ```
//!
//! The optimistic apply is synchronous under the view lock (capture previous,
//! compute speculative, publish, release — no await point in between), so two
//! applies never interleave. Resolutions of overlapping mutations may land in
//! any order; the machine is last-resolution-wins, and rollback restores the
//! whole pre-mutation snapshot, discarding unrelated edits that committed in
//! the meantime. Both behaviors match the system this replaces.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::cache::{CacheKey, SnapshotStore};
use crate::error::{Error, Result};
use crate::gateway::{BulkOutcome, BulkUpdateRequest, RemoteGateway};
use crate::itinerary::types::{
  CollectionSnapshot, DateRange, Record, RecordFields, RecordId, TempId,
};
use crate::itinerary::view::{build_view, ItineraryView};

use super::freshness::FreshnessReconciler;
use super::mutation::{MutationIntent, PendingMutation};

/// Single per-process entry point to the engine; constructed once at startup
/// and handed around by reference instead of living in a global.
pub struct CollectionService<G, S> {
  gateway: Arc<G>,
  store: Arc<S>,
}

impl<G: RemoteGateway, S: SnapshotStore> CollectionService<G, S> {
  pub fn new(gateway: G, store: S) -> Self {
    Self {
      gateway: Arc::new(gateway),
      store: Arc::new(store),
    }
  }

  /// Handle for one (collection, date-range) cache key.
  pub fn collection(&self, collection_id: &str, range: Option<DateRange>) -> CollectionHandle<G, S> {
    CollectionHandle::new(
      CacheKey::new(collection_id, range),
      Arc::clone(&self.gateway),
      Arc::clone(&self.store),
    )
  }

  /// Drop every cached snapshot.
  pub fn clear_cache(&self) -> Result<()> {
    self.store.clear_all()
  }
}

/// Reads and mutates one collection under one cache key.
pub struct CollectionHandle<G, S> {
  key: CacheKey,
  gateway: Arc<G>,
  store: Arc<S>,
  reconciler: FreshnessReconciler<G, S>,
  /// Current in-memory view. Replaced wholesale on every load, optimistic
  /// apply, commit and rollback — never mutated in place — so any reader
  /// holding an `Arc` sees a complete, consistent snapshot.
  view: Mutex<Option<Arc<CollectionSnapshot>>>,
}

impl<G: RemoteGateway, S: SnapshotStore> CollectionHandle<G, S> {
  fn new(key: CacheKey, gateway: Arc<G>, store: Arc<S>) -> Self {
    let reconciler = FreshnessReconciler::new(Arc::clone(&gateway), Arc::clone(&store));
    Self {
      key,
      gateway,
      store,
      reconciler,
      view: Mutex::new(None),
    }
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  /// Load the collection, serving the cached snapshot when the remote has
  /// not changed, and publish it as the in-memory view.
  pub async fn load(&self) -> Result<Arc<CollectionSnapshot>> {
    let snapshot = Arc::new(self.reconciler.load(&self.key).await?);
    *self.lock_view()? = Some(Arc::clone(&snapshot));
    Ok(snapshot)
  }

  /// Retry affordance: same as [`load`](Self::load), re-running the
  /// freshness check.
  pub async fn reload(&self) -> Result<Arc<CollectionSnapshot>> {
    self.load().await
  }

  /// Drop the cached entry and fetch from scratch.
  pub async fn refresh(&self) -> Result<Arc<CollectionSnapshot>> {
    self.store.clear(&self.key)?;
    self.load().await
  }

  /// The current in-memory snapshot, if the collection has been loaded.
  pub fn snapshot(&self) -> Option<Arc<CollectionSnapshot>> {
    self.view.lock().ok().and_then(|guard| guard.clone())
  }

  /// Day-bucketed projection of the current snapshot.
  pub fn grouped(&self) -> Option<ItineraryView> {
    self.snapshot().map(|snapshot| build_view(&snapshot))
  }

  /// Create a record optimistically. The placeholder appears in the view
  /// under a temporary id immediately; on confirmation it is swapped for
  /// the gateway's record and the snapshot is persisted.
  pub async fn create(&self, fields: RecordFields) -> Result<Record> {
    let temp_id = TempId::new();
    let intent = MutationIntent::Create {
      fields: fields.clone(),
      temp_id,
    };
    let pending = self.apply_optimistic(intent, Some(temp_id))?;

    match self
      .gateway
      .create_record(&self.key.collection_id, &fields)
      .await
    {
      Ok(record) => {
        match pending.temp_id {
          Some(temp) => self.commit_create(temp, &record)?,
          None => self.commit_current()?,
        }
        debug!(key = %self.key, id = %record.id, "create committed");
        Ok(record)
      }
      Err(e) => {
        self.rollback(pending)?;
        warn!(key = %self.key, error = %e, "create rolled back");
        Err(e)
      }
    }
  }

  /// Update a record optimistically.
  pub async fn update(&self, id: &str, fields: RecordFields) -> Result<Record> {
    let intent = MutationIntent::Update {
      id: RecordId::Remote(id.to_string()),
      fields: fields.clone(),
    };
    let pending = self.apply_optimistic(intent, None)?;

    match self.gateway.update_record(id, &fields).await {
      Ok(record) => {
        self.commit_current()?;
        debug!(key = %self.key, id, "update committed");
        Ok(record)
      }
      Err(e) => {
        self.rollback(pending)?;
        warn!(key = %self.key, id, error = %e, "update rolled back");
        Err(e)
      }
    }
  }

  /// Archive a record optimistically.
  pub async fn delete(&self, id: &str) -> Result<()> {
    let intent = MutationIntent::Delete {
      id: RecordId::Remote(id.to_string()),
    };
    let pending = self.apply_optimistic(intent, None)?;

    match self.gateway.delete_record(id).await {
      Ok(()) => {
        self.commit_current()?;
        debug!(key = %self.key, id, "delete committed");
        Ok(())
      }
      Err(e) => {
        self.rollback(pending)?;
        warn!(key = %self.key, id, error = %e, "delete rolled back");
        Err(e)
      }
    }
  }

  /// Apply many independent updates through the gateway, then merge the
  /// confirmed per-item states into the view and persist.
  ///
  /// Bulk updates are not optimistic: the view changes only once per batch,
  /// after the gateway reports which items landed. Per-item rejections come
  /// back in `errors` and never fail the batch.
  pub async fn bulk_update(&self, updates: Vec<BulkUpdateRequest>) -> Result<BulkOutcome> {
    let outcome = self.gateway.bulk_update(&updates).await?;
    debug!(
      key = %self.key,
      total = outcome.total,
      successful = outcome.successful,
      failed = outcome.failed,
      "bulk update resolved"
    );

    if outcome.results.is_empty() {
      return Ok(outcome);
    }

    let merged = {
      let mut guard = self.lock_view()?;
      match guard.as_ref() {
        Some(current) => {
          let mut next = (**current).clone();
          for confirmed in &outcome.results {
            if let Some(slot) = next.items.iter_mut().find(|r| r.id == confirmed.id) {
              *slot = confirmed.clone();
            }
          }
          let next = Arc::new(next);
          *guard = Some(Arc::clone(&next));
          Some(next)
        }
        None => None,
      }
    };

    if let Some(snapshot) = merged {
      self.persist(&snapshot);
    }

    Ok(outcome)
  }

  /// APPLYING_OPTIMISTIC: capture previous, publish speculative. Runs
  /// synchronously under the view lock.
  fn apply_optimistic(
    &self,
    intent: MutationIntent,
    temp_id: Option<TempId>,
  ) -> Result<PendingMutation> {
    let mut guard = self.lock_view()?;
    let previous = guard
      .clone()
      .ok_or_else(|| Error::Internal(format!("collection {} is not loaded", self.key)))?;

    let speculative = Arc::new(intent.apply_to(&previous));
    *guard = Some(speculative);

    Ok(PendingMutation { previous, temp_id })
  }

  /// COMMITTED (update/delete): persist the current view — not the
  /// speculative snapshot captured at apply time, so mutations that resolved
  /// in the meantime are not clobbered.
  fn commit_current(&self) -> Result<()> {
    let current = self
      .lock_view()?
      .clone()
      .ok_or_else(|| Error::Internal("view vanished during mutation".into()))?;
    self.persist(&current);
    Ok(())
  }

  /// COMMITTED (create): swap the placeholder for the confirmed record,
  /// then persist. If the placeholder is gone (a refresh replaced the view),
  /// the confirmed record is appended instead.
  fn commit_create(&self, temp_id: TempId, confirmed: &Record) -> Result<()> {
    let next = {
      let mut guard = self.lock_view()?;
      let current = guard
        .as_ref()
        .ok_or_else(|| Error::Internal("view vanished during mutation".into()))?;

      let mut next = (**current).clone();
      let placeholder = RecordId::Pending(temp_id);
      match next.items.iter_mut().find(|r| r.id == placeholder) {
        Some(slot) => *slot = confirmed.clone(),
        None => next.items.push(confirmed.clone()),
      }

      let next = Arc::new(next);
      *guard = Some(Arc::clone(&next));
      next
    };

    self.persist(&next);
    Ok(())
  }

  /// ROLLED_BACK: restore the exact pre-mutation snapshot. The store was
  /// never written for this mutation, so it needs no repair.
  fn rollback(&self, pending: PendingMutation) -> Result<()> {
    *self.lock_view()? = Some(pending.previous);
    Ok(())
  }

  /// Persist a snapshot under this handle's key. A storage failure is loud
  /// but does not undo the in-memory state; durability is best-effort
  /// secondary to responsiveness.
  fn persist(&self, snapshot: &CollectionSnapshot) {
    if let Err(e) = self.store.set(&self.key, snapshot) {
      warn!(key = %self.key, error = %e, "failed to persist snapshot after commit");
    }
  }

  fn lock_view(&self) -> Result<MutexGuard<'_, Option<Arc<CollectionSnapshot>>>> {
    self
      .view
      .lock()
      .map_err(|e| Error::Internal(format!("view lock poisoned: {}", e)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::gateway::testing::{FailureKind, MockGateway};

  fn record(id: &str, title: &str) -> Record {
    RecordFields {
      title: Some(title.to_string()),
      ..Default::default()
    }
    .to_record(RecordId::Remote(id.to_string()))
  }

  fn service_with(
    modified: &str,
    items: Vec<Record>,
  ) -> CollectionService<MockGateway, MemoryStore> {
    CollectionService::new(MockGateway::new(modified, items), MemoryStore::new())
  }

  #[tokio::test]
  async fn load_then_cached_load_fetches_once() {
    let service = service_with("2024-05-01T10:00:00Z", vec![record("r1", "stop")]);
    let handle = service.collection("trip-42", None);

    handle.load().await.unwrap();
    handle.load().await.unwrap();

    assert_eq!(service.gateway.fetch_calls(), 1);
    assert_eq!(service.gateway.modified_calls(), 2);
  }

  #[tokio::test]
  async fn remote_write_invalidates_the_cache() {
    let service = service_with("2024-05-01T10:00:00Z", vec![record("r1", "stop")]);
    let handle = service.collection("trip-42", None);

    handle.load().await.unwrap();
    service.gateway.set_modified_time("2024-05-01T11:00:00Z");
    handle.reload().await.unwrap();

    assert_eq!(service.gateway.fetch_calls(), 2);
  }

  #[tokio::test]
  async fn rejected_update_rolls_back_view_and_store() {
    let service = service_with(
      "2024-05-01T10:00:00Z",
      vec![record("r1", "original name"), record("r2", "other")],
    );
    let handle = service.collection("trip-42", None);
    handle.load().await.unwrap();

    let before_view = handle.snapshot().unwrap();
    let before_store = service.store.get(handle.key()).unwrap().unwrap();

    service
      .gateway
      .fail_mutations(FailureKind::Rejected, "validation failed");

    let err = handle
      .update(
        "r1",
        RecordFields {
          title: Some("New Name".into()),
          ..Default::default()
        },
      )
      .await
      .unwrap_err();
    assert!(matches!(err, Error::RemoteRejected(_)));

    // The view is the exact pre-mutation snapshot again.
    let after_view = handle.snapshot().unwrap();
    assert!(Arc::ptr_eq(&before_view, &after_view));
    assert_eq!(after_view.items[0].title, "original name");

    // And the store never saw the speculative state.
    let after_store = service.store.get(handle.key()).unwrap().unwrap();
    assert_eq!(after_store, before_store);
  }

  #[tokio::test]
  async fn unreachable_gateway_also_rolls_back() {
    let service = service_with("2024-05-01T10:00:00Z", vec![record("r1", "stop")]);
    let handle = service.collection("trip-42", None);
    handle.load().await.unwrap();

    service
      .gateway
      .fail_mutations(FailureKind::Unreachable, "timed out");

    let err = handle.delete("r1").await.unwrap_err();
    assert!(matches!(err, Error::GatewayUnreachable(_)));
    assert_eq!(handle.snapshot().unwrap().items.len(), 1);
  }

  #[tokio::test]
  async fn successful_update_is_visible_and_persisted() {
    let service = service_with("2024-05-01T10:00:00Z", vec![record("r1", "old")]);
    let handle = service.collection("trip-42", None);
    handle.load().await.unwrap();

    handle
      .update(
        "r1",
        RecordFields {
          title: Some("new".into()),
          ..Default::default()
        },
      )
      .await
      .unwrap();

    assert_eq!(handle.snapshot().unwrap().items[0].title, "new");
    let persisted = service.store.get(handle.key()).unwrap().unwrap();
    assert_eq!(persisted.items[0].title, "new");
  }

  #[tokio::test]
  async fn create_swaps_temp_id_for_real_id_and_persists() {
    let service = service_with("2024-05-01T10:00:00Z", vec![record("r1", "existing")]);
    let handle = service.collection("trip-42", None);
    handle.load().await.unwrap();

    let created = handle
      .create(RecordFields {
        title: Some("new stop".into()),
        ..Default::default()
      })
      .await
      .unwrap();

    assert_eq!(created.id, RecordId::Remote("srv-1".into()));

    // No pending placeholder survives the commit.
    let view = handle.snapshot().unwrap();
    assert_eq!(view.items.len(), 2);
    assert!(view.items.iter().all(|r| !r.id.is_pending()));
    assert!(view.items.iter().any(|r| r.id == created.id));

    let persisted = service.store.get(handle.key()).unwrap().unwrap();
    assert!(persisted.items.iter().any(|r| r.id == created.id));
  }

  #[tokio::test]
  async fn failed_create_removes_the_placeholder() {
    let service = service_with("2024-05-01T10:00:00Z", vec![record("r1", "existing")]);
    let handle = service.collection("trip-42", None);
    handle.load().await.unwrap();

    service
      .gateway
      .fail_mutations(FailureKind::Rejected, "missing required field");

    let err = handle.create(RecordFields::default()).await.unwrap_err();
    assert!(matches!(err, Error::RemoteRejected(_)));
    assert_eq!(handle.snapshot().unwrap().items.len(), 1);
  }

  #[tokio::test]
  async fn delete_removes_record_and_persists() {
    let service = service_with(
      "2024-05-01T10:00:00Z",
      vec![record("r1", "stays"), record("r2", "goes")],
    );
    let handle = service.collection("trip-42", None);
    handle.load().await.unwrap();

    handle.delete("r2").await.unwrap();

    let view = handle.snapshot().unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].title, "stays");
    let persisted = service.store.get(handle.key()).unwrap().unwrap();
    assert_eq!(persisted.items.len(), 1);
  }

  #[tokio::test]
  async fn mutating_an_unloaded_collection_is_an_error() {
    let service = service_with("2024-05-01T10:00:00Z", vec![]);
    let handle = service.collection("trip-42", None);

    let err = handle
      .update("r1", RecordFields::default())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
  }

  #[tokio::test]
  async fn bulk_update_reports_partial_failure_and_merges_successes() {
    let items: Vec<Record> = (0..10)
      .map(|i| record(&format!("r{}", i), "stop"))
      .collect();
    let service = service_with("2024-05-01T10:00:00Z", items);
    let handle = service.collection("trip-42", None);
    handle.load().await.unwrap();

    service.gateway.fail_updates_for(&["r3", "r7"]);

    let updates: Vec<BulkUpdateRequest> = (0..10)
      .map(|i| BulkUpdateRequest {
        id: format!("r{}", i),
        fields: RecordFields {
          sort_order: Some(i as f64 * 10.0),
          ..Default::default()
        },
      })
      .collect();

    let outcome = handle.bulk_update(updates).await.unwrap();

    assert_eq!(outcome.total, 10);
    assert_eq!(outcome.successful, 8);
    assert_eq!(outcome.failed, 2);
    let failed_ids: Vec<&str> = outcome.errors.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(failed_ids, vec!["r3", "r7"]);

    // Successes landed in the view, failures kept their old state.
    let view = handle.snapshot().unwrap();
    let by_id = |id: &str| {
      view
        .items
        .iter()
        .find(|r| r.id == RecordId::Remote(id.into()))
        .unwrap()
    };
    assert_eq!(by_id("r0").sort_order, Some(0.0));
    assert_eq!(by_id("r9").sort_order, Some(90.0));
    assert_eq!(by_id("r3").sort_order, None);
    assert_eq!(by_id("r7").sort_order, None);

    // The merged snapshot was persisted.
    let persisted = service.store.get(handle.key()).unwrap().unwrap();
    assert_eq!(persisted, *view);
  }

  #[tokio::test]
  async fn refresh_discards_the_cached_entry() {
    let service = service_with("2024-05-01T10:00:00Z", vec![record("r1", "stop")]);
    let handle = service.collection("trip-42", None);

    handle.load().await.unwrap();
    assert_eq!(service.gateway.fetch_calls(), 1);

    // Timestamp unchanged, but refresh bypasses the hit path.
    handle.refresh().await.unwrap();
    assert_eq!(service.gateway.fetch_calls(), 2);
  }

  #[tokio::test]
  async fn grouped_view_follows_the_current_snapshot() {
    let mut dated = record("r1", "morning walk");
    dated.date = Some("2024-05-01".parse().unwrap());
    let service = service_with("2024-05-01T10:00:00Z", vec![dated]);
    let handle = service.collection("trip-42", None);

    assert!(handle.grouped().is_none());
    handle.load().await.unwrap();

    let grouped = handle.grouped().unwrap();
    assert_eq!(grouped.days.len(), 1);
    assert_eq!(grouped.days[0].records[0].title, "morning walk");
  }
}
