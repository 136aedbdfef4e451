//! Error taxonomy for the itinerary engine.
//!
//! Callers need to distinguish transport failures from definitive remote
//! rejections (the UI message differs) and both from local storage trouble,
//! so the engine uses a typed enum rather than an opaque report.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// The remote gateway could not be reached (network error or timeout).
  #[error("gateway unreachable: {0}")]
  GatewayUnreachable(String),

  /// The remote gateway answered with a definitive error (validation
  /// failure, unknown record, etc.). Retrying without changes won't help.
  #[error("remote rejected the request: {0}")]
  RemoteRejected(String),

  /// The persistent cache could not be read or written. The in-memory view
  /// stays usable; durability is degraded until the medium recovers.
  #[error("cache storage failure: {0}")]
  CacheStorage(String),

  /// Engine misuse or broken internal invariant (e.g. mutating a collection
  /// that was never loaded, poisoned lock).
  #[error("internal error: {0}")]
  Internal(String),
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    Error::CacheStorage(e.to_string())
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Error::CacheStorage(format!("snapshot (de)serialization failed: {}", e))
  }
}
