//! Process-wide request counters, reset at worker startup.
//!
//! Every mediated request increments exactly one counter. The struct is
//! shared behind an `Arc` and mutated from async handlers, so counters are
//! atomics rather than a module-level mutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct PerformanceMetrics {
  cache_hits: AtomicU64,
  cache_misses: AtomicU64,
  network_requests: AtomicU64,
  offline_requests: AtomicU64,
  errors: AtomicU64,
  started_at: DateTime<Utc>,
}

impl Default for PerformanceMetrics {
  fn default() -> Self {
    Self::new()
  }
}

impl PerformanceMetrics {
  pub fn new() -> Self {
    Self {
      cache_hits: AtomicU64::new(0),
      cache_misses: AtomicU64::new(0),
      network_requests: AtomicU64::new(0),
      offline_requests: AtomicU64::new(0),
      errors: AtomicU64::new(0),
      started_at: Utc::now(),
    }
  }

  pub fn record_cache_hit(&self) {
    self.cache_hits.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_cache_miss(&self) {
    self.cache_misses.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_network_request(&self) {
    self.network_requests.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_offline_request(&self) {
    self.offline_requests.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_error(&self) {
    self.errors.fetch_add(1, Ordering::Relaxed);
  }

  /// Point-in-time report with the derived figures external reporters want.
  pub fn snapshot(&self) -> MetricsReport {
    let cache_hits = self.cache_hits.load(Ordering::Relaxed);
    let cache_misses = self.cache_misses.load(Ordering::Relaxed);
    let network_requests = self.network_requests.load(Ordering::Relaxed);
    let offline_requests = self.offline_requests.load(Ordering::Relaxed);
    let errors = self.errors.load(Ordering::Relaxed);

    let total_requests = cache_hits + cache_misses + network_requests;
    let cache_hit_rate = if total_requests > 0 {
      (cache_hits as f64 / total_requests as f64 * 10_000.0).round() / 100.0
    } else {
      0.0
    };

    let uptime_ms = (Utc::now() - self.started_at).num_milliseconds().max(0) as u64;

    MetricsReport {
      cache_hits,
      cache_misses,
      network_requests,
      offline_requests,
      errors,
      total_requests,
      cache_hit_rate,
      uptime_ms,
    }
  }
}

/// Serializable metrics report pushed to pages and returned over the message
/// channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
  pub cache_hits: u64,
  pub cache_misses: u64,
  pub network_requests: u64,
  pub offline_requests: u64,
  pub errors: u64,
  pub total_requests: u64,
  /// Percentage of total requests answered from cache, two decimals.
  pub cache_hit_rate: f64,
  /// Milliseconds since worker startup; `uptime` on the wire.
  #[serde(rename = "uptime")]
  pub uptime_ms: u64,
}

impl MetricsReport {
  /// Sum of all counters; tests use this to assert the exactly-one-increment
  /// invariant.
  pub fn counter_sum(&self) -> u64 {
    self.cache_hits + self.cache_misses + self.network_requests + self.offline_requests + self.errors
  }
}
