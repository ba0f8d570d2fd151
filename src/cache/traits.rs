//! Storage trait and error taxonomy for the response stores.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::StoredResponse;

/// Failures a storage backend can report. Quota exhaustion is separated out
/// because the mediator treats it as "write skipped", never as request
/// failure.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
  #[error("storage backend error: {0}")]
  Backend(String),
  #[error("storage quota exceeded")]
  QuotaExceeded,
  #[error("malformed cache entry for key {0}")]
  MalformedEntry(String),
}

/// Metadata for one cached entry, as returned by enumeration. Carries what
/// eviction and status reporting need without loading bodies.
#[derive(Debug, Clone)]
pub struct EntryMeta {
  pub key: String,
  pub url: String,
  pub byte_size: u64,
  pub stored_at: DateTime<Utc>,
}

/// Backend for named response stores.
///
/// Operations are synchronous; backends are expected to be cheap enough to
/// call from async handlers (SQLite behind a mutex, or an in-memory map).
/// `put` must be idempotent: writing the same key twice leaves one entry.
pub trait CacheStorage: Send + Sync {
  /// Look up an entry. A missing store is an empty store.
  fn get(&self, store: &str, key: &str) -> Result<Option<StoredResponse>, StoreError>;

  /// Insert or replace an entry. The plain URL is stored alongside the key
  /// for enumeration and refresh.
  fn put(
    &self,
    store: &str,
    key: &str,
    url: &str,
    response: &StoredResponse,
  ) -> Result<(), StoreError>;

  /// Remove an entry. Removing a missing entry is not an error.
  fn delete(&self, store: &str, key: &str) -> Result<(), StoreError>;

  /// Enumerate entry metadata for a store, in no particular order.
  fn keys(&self, store: &str) -> Result<Vec<EntryMeta>, StoreError>;

  /// Total byte size of a store's entries.
  fn total_bytes(&self, store: &str) -> Result<u64, StoreError>;

  /// Number of entries in a store.
  fn entry_count(&self, store: &str) -> Result<u64, StoreError>;

  /// Names of all stores that currently hold at least one entry.
  fn list_stores(&self) -> Result<Vec<String>, StoreError>;

  /// Drop a whole store and everything in it.
  fn delete_store(&self, store: &str) -> Result<(), StoreError>;
}
