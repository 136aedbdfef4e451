//! Persistent snapshot store: durable key → snapshot mapping.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::itinerary::types::CollectionSnapshot;

use super::key::CacheKey;

/// Storage backend for collection snapshots.
///
/// Entries are whole units: `set` replaces the full snapshot for a key
/// atomically, and `get` either returns a complete snapshot or nothing. A
/// missing key is not an error.
pub trait SnapshotStore: Send + Sync {
  fn get(&self, key: &CacheKey) -> Result<Option<CollectionSnapshot>>;

  fn set(&self, key: &CacheKey, snapshot: &CollectionSnapshot) -> Result<()>;

  fn clear(&self, key: &CacheKey) -> Result<()>;

  fn clear_all(&self) -> Result<()>;
}

// Lets the binary pick a backend at runtime.
impl SnapshotStore for Box<dyn SnapshotStore> {
  fn get(&self, key: &CacheKey) -> Result<Option<CollectionSnapshot>> {
    (**self).get(key)
  }

  fn set(&self, key: &CacheKey, snapshot: &CollectionSnapshot) -> Result<()> {
    (**self).set(key, snapshot)
  }

  fn clear(&self, key: &CacheKey) -> Result<()> {
    (**self).clear(key)
  }

  fn clear_all(&self) -> Result<()> {
    (**self).clear_all()
  }
}

/// SQLite-backed store. Writes are synchronous: once `set` returns Ok the
/// entry has been handed to SQLite, so a crash right after still keeps it.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshot_cache (
    cache_key TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL,
    data TEXT NOT NULL,
    remote_modified_time TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_snapshot_cache_collection
    ON snapshot_cache(collection_id);
"#;

impl SqliteStore {
  /// Open (or create) the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::CacheStorage(format!("failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(&path).map_err(|e| {
      Error::CacheStorage(format!(
        "failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_connection(conn)
  }

  /// Open the store at an explicit path (config override).
  pub fn open_at(path: &std::path::Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::CacheStorage(format!("failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::CacheStorage(format!(
        "failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_connection(conn)
  }

  /// Fully in-memory database, used by tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::CacheStorage("could not determine data directory".into()))?;

    Ok(data_dir.join("tripsync").join("cache.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::Internal(format!("cache lock poisoned: {}", e)))
  }
}

impl SnapshotStore for SqliteStore {
  fn get(&self, key: &CacheKey) -> Result<Option<CollectionSnapshot>> {
    let conn = self.lock()?;

    let data: Option<String> = conn
      .query_row(
        "SELECT data FROM snapshot_cache WHERE cache_key = ?",
        params![key.storage_key()],
        |row| row.get(0),
      )
      .optional()?;

    match data {
      Some(json) => Ok(Some(serde_json::from_str(&json)?)),
      None => Ok(None),
    }
  }

  fn set(&self, key: &CacheKey, snapshot: &CollectionSnapshot) -> Result<()> {
    let conn = self.lock()?;
    let json = serde_json::to_string(snapshot)?;

    // Single statement, so callers never observe a half-written entry.
    conn.execute(
      "INSERT OR REPLACE INTO snapshot_cache
         (cache_key, collection_id, data, remote_modified_time, cached_at)
       VALUES (?, ?, ?, ?, datetime('now'))",
      params![
        key.storage_key(),
        snapshot.collection_id,
        json,
        snapshot.remote_modified_time
      ],
    )?;

    Ok(())
  }

  fn clear(&self, key: &CacheKey) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(
      "DELETE FROM snapshot_cache WHERE cache_key = ?",
      params![key.storage_key()],
    )?;
    Ok(())
  }

  fn clear_all(&self) -> Result<()> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM snapshot_cache", [])?;
    Ok(())
  }
}

/// HashMap-backed store for ephemeral runs (config `persistent: false`) and
/// tests. Same contract as [`SqliteStore`], minus durability.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, CollectionSnapshot>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CollectionSnapshot>>> {
    self
      .entries
      .lock()
      .map_err(|e| Error::Internal(format!("cache lock poisoned: {}", e)))
  }
}

impl SnapshotStore for MemoryStore {
  fn get(&self, key: &CacheKey) -> Result<Option<CollectionSnapshot>> {
    Ok(self.lock()?.get(&key.storage_key()).cloned())
  }

  fn set(&self, key: &CacheKey, snapshot: &CollectionSnapshot) -> Result<()> {
    self.lock()?.insert(key.storage_key(), snapshot.clone());
    Ok(())
  }

  fn clear(&self, key: &CacheKey) -> Result<()> {
    self.lock()?.remove(&key.storage_key());
    Ok(())
  }

  fn clear_all(&self) -> Result<()> {
    self.lock()?.clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::itinerary::types::{DateRange, RecordFields, RecordId};

  fn snapshot(collection_id: &str, modified: &str) -> CollectionSnapshot {
    CollectionSnapshot {
      items: vec![RecordFields {
        title: Some("Nishiki market".into()),
        ..Default::default()
      }
      .to_record(RecordId::Remote("r1".into()))],
      collection_id: collection_id.into(),
      collection_name: "Kyoto".into(),
      remote_modified_time: modified.into(),
      fetched_at: Utc::now(),
      date_range: None,
    }
  }

  fn january() -> DateRange {
    DateRange {
      start: "2024-01-01".parse().unwrap(),
      end: "2024-01-31".parse().unwrap(),
    }
  }

  #[test]
  fn sqlite_roundtrip() {
    let store = SqliteStore::open_in_memory().unwrap();
    let key = CacheKey::new("trip-42", None);
    let snap = snapshot("trip-42", "2024-05-01T10:00:00Z");

    assert!(store.get(&key).unwrap().is_none());

    store.set(&key, &snap).unwrap();
    assert_eq!(store.get(&key).unwrap(), Some(snap));
  }

  #[test]
  fn set_replaces_the_whole_entry() {
    let store = SqliteStore::open_in_memory().unwrap();
    let key = CacheKey::new("trip-42", None);

    store
      .set(&key, &snapshot("trip-42", "2024-05-01T10:00:00Z"))
      .unwrap();
    let newer = snapshot("trip-42", "2024-05-02T08:30:00Z");
    store.set(&key, &newer).unwrap();

    assert_eq!(store.get(&key).unwrap(), Some(newer));
  }

  #[test]
  fn ranged_and_unranged_keys_are_independent() {
    let store = SqliteStore::open_in_memory().unwrap();
    let plain = CacheKey::new("trip-42", None);
    let ranged = CacheKey::new("trip-42", Some(january()));

    let full = snapshot("trip-42", "2024-05-01T10:00:00Z");
    let mut filtered = snapshot("trip-42", "2024-05-03T09:00:00Z");
    filtered.date_range = Some(january());

    store.set(&plain, &full).unwrap();
    store.set(&ranged, &filtered).unwrap();

    assert_eq!(store.get(&plain).unwrap(), Some(full.clone()));
    assert_eq!(store.get(&ranged).unwrap(), Some(filtered));

    // Clearing one leaves the other alone.
    store.clear(&ranged).unwrap();
    assert!(store.get(&ranged).unwrap().is_none());
    assert_eq!(store.get(&plain).unwrap(), Some(full));
  }

  #[test]
  fn clear_and_clear_all() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = CacheKey::new("trip-a", None);
    let b = CacheKey::new("trip-b", None);

    store.set(&a, &snapshot("trip-a", "2024-05-01T10:00:00Z")).unwrap();
    store.set(&b, &snapshot("trip-b", "2024-05-01T10:00:00Z")).unwrap();

    store.clear(&a).unwrap();
    assert!(store.get(&a).unwrap().is_none());
    assert!(store.get(&b).unwrap().is_some());

    // Clearing a missing key is fine.
    store.clear(&a).unwrap();

    store.clear_all().unwrap();
    assert!(store.get(&b).unwrap().is_none());
  }

  #[test]
  fn memory_store_matches_the_contract() {
    let store = MemoryStore::new();
    let key = CacheKey::new("trip-42", None);
    let snap = snapshot("trip-42", "2024-05-01T10:00:00Z");

    assert!(store.get(&key).unwrap().is_none());
    store.set(&key, &snap).unwrap();
    assert_eq!(store.get(&key).unwrap(), Some(snap));
    store.clear(&key).unwrap();
    assert!(store.get(&key).unwrap().is_none());
  }
}
