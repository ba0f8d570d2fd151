//! Shared test doubles for the fetch pipeline.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::cache::{CacheStorage, EntryMeta, MemoryStorage, StoreError};
use crate::net::{FetchError, NetworkClient};
use crate::types::{Request, StoredResponse};

/// Programmable network: routes map URLs to canned outcomes, and the whole
/// network can be flipped offline. Unrouted URLs fail like a dead host.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Result<StoredResponse, FetchError>>>,
  online: AtomicBool,
  fetches: AtomicU64,
  methods: Mutex<Vec<String>>,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self {
      routes: Mutex::new(HashMap::new()),
      online: AtomicBool::new(true),
      fetches: AtomicU64::new(0),
      methods: Mutex::new(Vec::new()),
    }
  }

  pub fn offline() -> Self {
    let net = Self::new();
    net.set_online(false);
    net
  }

  pub fn respond(&self, url: &str, response: StoredResponse) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Ok(response));
  }

  pub fn fail(&self, url: &str, error: FetchError) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Err(error));
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  pub fn fetch_count(&self) -> u64 {
    self.fetches.load(Ordering::SeqCst)
  }

  /// Method of the most recent fetch, as it would appear on the wire.
  pub fn last_method(&self) -> Option<String> {
    self.methods.lock().unwrap().last().cloned()
  }
}

#[async_trait]
impl NetworkClient for FakeNetwork {
  async fn fetch(
    &self,
    request: &Request,
    _timeout: Duration,
  ) -> Result<StoredResponse, FetchError> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    self
      .methods
      .lock()
      .unwrap()
      .push(request.method.as_str().to_string());

    if !self.online.load(Ordering::SeqCst) {
      return Err(FetchError::Transport("network offline".to_string()));
    }

    self
      .routes
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .unwrap_or_else(|| Err(FetchError::Transport("no route to host".to_string())))
  }
}

/// Storage wrapper that fails selected operations, for error-path coverage.
/// Reads can be made to fail like a broken backend; writes can be made to
/// report an exhausted quota. Everything else delegates to a real in-memory
/// store.
#[derive(Default)]
pub struct FailingStorage {
  inner: MemoryStorage,
  fail_reads: AtomicBool,
  reject_writes: AtomicBool,
}

impl FailingStorage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn fail_reads(&self) {
    self.fail_reads.store(true, Ordering::SeqCst);
  }

  pub fn reject_writes(&self) {
    self.reject_writes.store(true, Ordering::SeqCst);
  }
}

impl CacheStorage for FailingStorage {
  fn get(&self, store: &str, key: &str) -> Result<Option<StoredResponse>, StoreError> {
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(StoreError::Backend("simulated read failure".to_string()));
    }
    self.inner.get(store, key)
  }

  fn put(
    &self,
    store: &str,
    key: &str,
    url: &str,
    response: &StoredResponse,
  ) -> Result<(), StoreError> {
    if self.reject_writes.load(Ordering::SeqCst) {
      return Err(StoreError::QuotaExceeded);
    }
    self.inner.put(store, key, url, response)
  }

  fn delete(&self, store: &str, key: &str) -> Result<(), StoreError> {
    self.inner.delete(store, key)
  }

  fn keys(&self, store: &str) -> Result<Vec<EntryMeta>, StoreError> {
    self.inner.keys(store)
  }

  fn total_bytes(&self, store: &str) -> Result<u64, StoreError> {
    self.inner.total_bytes(store)
  }

  fn entry_count(&self, store: &str) -> Result<u64, StoreError> {
    self.inner.entry_count(store)
  }

  fn list_stores(&self) -> Result<Vec<String>, StoreError> {
    self.inner.list_stores()
  }

  fn delete_store(&self, store: &str) -> Result<(), StoreError> {
    self.inner.delete_store(store)
  }
}

/// Successful response with a body and a content type, for route setup.
pub fn ok_response(content_type: &str, body: &[u8]) -> StoredResponse {
  StoredResponse::new(
    200,
    vec![("Content-Type".to_string(), content_type.to_string())],
    body.to_vec(),
  )
}
