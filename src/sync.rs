//! Deferred-operation queue drained when connectivity returns.
//!
//! Items are appended while offline and replayed in order by the worker's
//! sync handler. Draining is at-least-once: an item is only gone for good
//! after its replay succeeded, so replayed operations must be idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Mutex;

/// What a queued item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncKind {
  /// A GET to replay against an API endpoint.
  ApiRequest,
  /// A URL to re-fetch into a named store.
  CacheUpdate,
  /// A user action to hand back to the pages once they can process it.
  UserAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItem {
  pub id: String,
  pub kind: SyncKind,
  pub payload: serde_json::Value,
  pub enqueued_at: DateTime<Utc>,
  /// Replay attempts so far. There is currently no retry cap; failed items
  /// stay queued for the next drain.
  pub attempts: u32,
}

/// Ordered queue of deferred operations. Append-only during normal
/// operation; the worker pops items one at a time while draining and pushes
/// failures back to the tail.
#[derive(Default)]
pub struct SyncQueue {
  items: Mutex<VecDeque<SyncItem>>,
}

impl SyncQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a new item and return its id.
  pub fn enqueue(&self, kind: SyncKind, payload: serde_json::Value) -> String {
    let enqueued_at = Utc::now();
    let id = make_id(kind, &payload, enqueued_at);

    let item = SyncItem {
      id: id.clone(),
      kind,
      payload,
      enqueued_at,
      attempts: 0,
    };

    if let Ok(mut items) = self.items.lock() {
      items.push_back(item);
    }
    id
  }

  /// Take the item at the head of the queue, if any.
  pub fn pop(&self) -> Option<SyncItem> {
    self.items.lock().ok()?.pop_front()
  }

  /// Put a failed item back at the tail with its attempt count bumped.
  pub fn requeue(&self, mut item: SyncItem) {
    item.attempts += 1;
    if let Ok(mut items) = self.items.lock() {
      items.push_back(item);
    }
  }

  pub fn len(&self) -> usize {
    self.items.lock().map(|items| items.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Copy of the queue contents, oldest first.
  pub fn snapshot(&self) -> Vec<SyncItem> {
    self
      .items
      .lock()
      .map(|items| items.iter().cloned().collect())
      .unwrap_or_default()
  }
}

fn make_id(kind: SyncKind, payload: &serde_json::Value, at: DateTime<Utc>) -> String {
  let mut hasher = Sha256::new();
  hasher.update(format!("{:?}", kind).as_bytes());
  hasher.update(payload.to_string().as_bytes());
  hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
  hex::encode(hasher.finalize())[..16].to_string()
}
