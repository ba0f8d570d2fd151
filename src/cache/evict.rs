//! Byte-budget enforcement: oldest entries go first.

use tracing::{debug, warn};

use super::traits::{CacheStorage, StoreError};

/// Bring a store back under its byte budget by deleting entries in
/// oldest-`stored_at`-first order, stopping as soon as the store fits.
///
/// Returns the number of bytes reclaimed. Safe to run redundantly; an
/// already-fitting store is a no-op. Individual delete failures are logged
/// and skipped so one bad row cannot wedge the pass.
pub fn enforce_budget(
  storage: &dyn CacheStorage,
  store: &str,
  max_bytes: u64,
) -> Result<u64, StoreError> {
  let total = storage.total_bytes(store)?;
  if total <= max_bytes {
    return Ok(0);
  }

  let mut metas = storage.keys(store)?;
  metas.sort_by_key(|m| m.stored_at);

  let mut removed: u64 = 0;
  for meta in metas {
    if total - removed <= max_bytes {
      break;
    }

    match storage.delete(store, &meta.key) {
      Ok(()) => {
        removed += meta.byte_size;
        debug!(
          store,
          url = %meta.url,
          bytes = meta.byte_size,
          "evicted cache entry"
        );
      }
      Err(e) => {
        warn!(store, key = %meta.key, error = %e, "failed to evict cache entry");
      }
    }
  }

  if removed > 0 {
    debug!(store, reclaimed = removed, "cache budget enforced");
  }

  Ok(removed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::types::StoredResponse;
  use chrono::{Duration, Utc};

  fn entry(size: usize, age_minutes: i64) -> StoredResponse {
    let mut resp = StoredResponse::new(200, Vec::new(), vec![0u8; size]);
    resp.stored_at = Utc::now() - Duration::minutes(age_minutes);
    resp
  }

  #[test]
  fn under_budget_is_a_noop() {
    let storage = MemoryStorage::new();
    storage.put("s", "k", "u", &entry(100, 0)).unwrap();

    let removed = enforce_budget(&storage, "s", 1000).unwrap();

    assert_eq!(removed, 0);
    assert_eq!(storage.entry_count("s").unwrap(), 1);
  }

  #[test]
  fn evicts_oldest_first_until_under_budget() {
    let storage = MemoryStorage::new();
    storage.put("s", "oldest", "u1", &entry(40, 30)).unwrap();
    storage.put("s", "middle", "u2", &entry(40, 20)).unwrap();
    storage.put("s", "newest", "u3", &entry(40, 10)).unwrap();

    let removed = enforce_budget(&storage, "s", 100).unwrap();

    // Only the oldest entry needs to go: 120 - 40 = 80 <= 100.
    assert_eq!(removed, 40);
    assert!(storage.get("s", "oldest").unwrap().is_none());
    assert!(storage.get("s", "middle").unwrap().is_some());
    assert!(storage.get("s", "newest").unwrap().is_some());
  }

  #[test]
  fn never_removes_more_than_necessary() {
    let storage = MemoryStorage::new();
    for i in 0..5 {
      // Ages 50, 40, 30, 20, 10 minutes; 30 bytes each.
      storage
        .put("s", &format!("k{}", i), "u", &entry(30, 50 - (i as i64) * 10))
        .unwrap();
    }

    enforce_budget(&storage, "s", 100).unwrap();

    // 150 bytes total, budget 100: exactly two entries must go.
    assert_eq!(storage.entry_count("s").unwrap(), 3);
    assert!(storage.total_bytes("s").unwrap() <= 100);
    assert!(storage.get("s", "k0").unwrap().is_none());
    assert!(storage.get("s", "k1").unwrap().is_none());
    assert!(storage.get("s", "k4").unwrap().is_some());
  }

  #[test]
  fn five_large_writes_keep_the_three_most_recent() {
    // Five 30MB entries against a 100MB budget leave the three newest.
    const MB: usize = 1024 * 1024;
    let storage = MemoryStorage::new();
    for i in 0..5 {
      storage
        .put("s", &format!("k{}", i), "u", &entry(30 * MB, 50 - (i as i64) * 10))
        .unwrap();
    }

    enforce_budget(&storage, "s", 100 * MB as u64).unwrap();

    assert!(storage.total_bytes("s").unwrap() <= 100 * MB as u64);
    assert_eq!(storage.entry_count("s").unwrap(), 3);
    for key in ["k2", "k3", "k4"] {
      assert!(storage.get("s", key).unwrap().is_some());
    }
  }

  #[test]
  fn redundant_runs_are_safe() {
    let storage = MemoryStorage::new();
    storage.put("s", "a", "u", &entry(60, 20)).unwrap();
    storage.put("s", "b", "u", &entry(60, 10)).unwrap();

    enforce_budget(&storage, "s", 80).unwrap();
    let removed_again = enforce_budget(&storage, "s", 80).unwrap();

    assert_eq!(removed_again, 0);
    assert_eq!(storage.entry_count("s").unwrap(), 1);
  }
}
