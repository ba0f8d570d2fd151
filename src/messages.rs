//! Page ↔ worker message protocol.
//!
//! Pages send [`ClientMessage`]s and, for request/response style calls, get
//! a [`WorkerReply`] back over the reply channel. The worker pushes
//! [`WorkerEvent`]s to all pages on its own initiative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::metrics::MetricsReport;
use crate::sync::SyncKind;

/// Messages a page can send to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// Promote this worker immediately instead of waiting for old tabs.
  SkipWaiting,
  /// Ask for per-store entry counts and sizes.
  GetCacheStatus,
  /// Drop one named store.
  ClearCache {
    #[serde(rename = "cacheName")]
    cache_name: String,
  },
  /// Drop every store this worker owns.
  ClearAllCaches,
  GetPerformanceMetrics,
  /// Defer an operation until connectivity returns.
  QueueBackgroundSync {
    kind: SyncKind,
    #[serde(default)]
    payload: serde_json::Value,
  },
  /// Runtime settings changes, e.g. the performance-mode budget halving.
  UpdateSettings {
    #[serde(default, rename = "performanceMode")]
    performance_mode: Option<bool>,
  },
}

/// Direct reply to a request/response style [`ClientMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerReply {
  Queued { queued: bool, id: String },
  Ack { success: bool },
  CacheStatus(CacheStatus),
  Metrics(MetricsReport),
}

/// Unsolicited notifications pushed from the worker to every open page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerEvent {
  SwActivated {
    version: String,
    timestamp: DateTime<Utc>,
  },
  /// A user action queued while offline, handed back for the page to apply.
  QueuedAction {
    action: String,
    data: serde_json::Value,
    timestamp: DateTime<Utc>,
  },
  PerformanceUpdate {
    metrics: MetricsReport,
    #[serde(rename = "cacheStatus")]
    cache_status: CacheStatus,
  },
}

/// Per-store status snapshot, keyed by store name.
pub type CacheStatus = BTreeMap<String, StoreStatus>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
  pub entries: u64,
  /// Size in megabytes, rounded to two decimals; `size` on the wire.
  #[serde(rename = "size")]
  pub size_mb: f64,
  #[serde(rename = "lastUpdated")]
  pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn client_messages_use_screaming_snake_type_tags() {
    let msg: ClientMessage =
      serde_json::from_value(json!({ "type": "SKIP_WAITING" })).unwrap();
    assert!(matches!(msg, ClientMessage::SkipWaiting));

    let msg: ClientMessage = serde_json::from_value(json!({
      "type": "CLEAR_CACHE",
      "cacheName": "glowcache-api-v2.0.0",
    }))
    .unwrap();
    match msg {
      ClientMessage::ClearCache { cache_name } => {
        assert_eq!(cache_name, "glowcache-api-v2.0.0");
      }
      other => panic!("unexpected message: {other:?}"),
    }

    let msg: ClientMessage = serde_json::from_value(json!({
      "type": "QUEUE_BACKGROUND_SYNC",
      "kind": "user-action",
      "payload": { "action": "save-preset" },
    }))
    .unwrap();
    assert!(matches!(
      msg,
      ClientMessage::QueueBackgroundSync { kind: SyncKind::UserAction, .. }
    ));
  }

  #[test]
  fn wire_fields_are_camel_case() {
    let msg: ClientMessage = serde_json::from_value(json!({
      "type": "UPDATE_SETTINGS",
      "performanceMode": true,
    }))
    .unwrap();
    assert!(matches!(
      msg,
      ClientMessage::UpdateSettings { performance_mode: Some(true) }
    ));

    let status = StoreStatus {
      entries: 3,
      size_mb: 1.25,
      last_updated: Utc::now(),
    };
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["size"], 1.25);
    assert!(value["lastUpdated"].is_string());

    let event = WorkerEvent::PerformanceUpdate {
      metrics: crate::metrics::PerformanceMetrics::new().snapshot(),
      cache_status: CacheStatus::new(),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "PERFORMANCE_UPDATE");
    assert!(value["cacheStatus"].is_object());
    assert!(value["metrics"]["cacheHits"].is_number());
    assert!(value["metrics"]["uptime"].is_number());
  }

  #[test]
  fn worker_events_serialize_with_type_tags() {
    let event = WorkerEvent::SwActivated {
      version: "2.0.0".to_string(),
      timestamp: Utc::now(),
    };

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "SW_ACTIVATED");
    assert_eq!(value["version"], "2.0.0");
  }

  #[test]
  fn replies_serialize_flat() {
    let reply = WorkerReply::Ack { success: true };
    assert_eq!(serde_json::to_value(&reply).unwrap(), json!({ "success": true }));

    let reply = WorkerReply::Queued {
      queued: true,
      id: "abc123".to_string(),
    };
    let value = serde_json::to_value(&reply).unwrap();
    assert_eq!(value["queued"], true);
  }
}
