//! The worker itself: owns the stores, the request pipeline, the sync queue
//! and the page channel, and moves through the install/activate lifecycle.

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

use crate::cache::{enforce_budget, CacheStorage};
use crate::classify::{CacheCategory, Classifier};
use crate::config::WorkerConfig;
use crate::fallback;
use crate::lifecycle::{self, LifecycleState};
use crate::mediator::FetchMediator;
use crate::messages::{CacheStatus, ClientMessage, StoreStatus, WorkerEvent, WorkerReply};
use crate::metrics::PerformanceMetrics;
use crate::net::NetworkClient;
use crate::sync::{SyncItem, SyncKind, SyncQueue};
use crate::types::{Method, Request, StoredResponse};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub struct Worker {
  config: RwLock<WorkerConfig>,
  classifier: Classifier,
  storage: Arc<dyn CacheStorage>,
  network: Arc<dyn NetworkClient>,
  metrics: Arc<PerformanceMetrics>,
  mediator: FetchMediator,
  queue: SyncQueue,
  state: RwLock<LifecycleState>,
  online: AtomicBool,
  events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Worker {
  /// Build a worker and the channel its page-bound events arrive on.
  pub fn new(
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn NetworkClient>,
  ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
    let (events, receiver) = mpsc::unbounded_channel();
    let metrics = Arc::new(PerformanceMetrics::new());
    let classifier = Classifier::from_config(&config);
    let mediator = FetchMediator::new(
      Arc::clone(&storage),
      Arc::clone(&network),
      Arc::clone(&metrics),
    );

    let worker = Self {
      config: RwLock::new(config),
      classifier,
      storage,
      network,
      metrics,
      mediator,
      queue: SyncQueue::new(),
      state: RwLock::new(LifecycleState::Installing),
      online: AtomicBool::new(true),
      events,
    };
    (worker, receiver)
  }

  pub fn state(&self) -> LifecycleState {
    self
      .state
      .read()
      .map(|s| *s)
      .unwrap_or(LifecycleState::Redundant)
  }

  fn set_state(&self, next: LifecycleState) {
    if let Ok(mut state) = self.state.write() {
      *state = next;
    }
  }

  /// Install: pre-warm the static store from the asset manifest. Individual
  /// asset failures do not fail the install. Returns how many assets cached.
  pub async fn install(&self) -> usize {
    self.set_state(LifecycleState::Installing);
    let config = match self.config_snapshot() {
      Some(config) => config,
      None => return 0,
    };
    let cached = lifecycle::prewarm_static(&config, &self.storage, &self.network).await;
    self.set_state(LifecycleState::Installed);
    cached
  }

  /// Activate: delete stores left behind by previous versions, then announce
  /// the takeover to every page.
  pub fn activate(&self) {
    self.set_state(LifecycleState::Activating);
    if let Some(config) = self.config_snapshot() {
      let deleted = lifecycle::cleanup_stale_stores(&config, &self.storage);
      if !deleted.is_empty() {
        info!(count = deleted.len(), "removed stale cache stores");
      }
      self.send_event(WorkerEvent::SwActivated {
        version: config.version,
        timestamp: chrono::Utc::now(),
      });
    }
    self.set_state(LifecycleState::Activated);
  }

  /// Resolve one intercepted request. GETs go through the category
  /// strategies; POSTs to the sync endpoint are queued for replay; anything
  /// else passes straight through to the network.
  pub async fn handle_fetch(&self, request: &Request) -> StoredResponse {
    let config = match self.config_snapshot() {
      Some(config) => config,
      None => {
        self.metrics.record_error();
        return fallback::error_response("Worker state unavailable");
      }
    };

    match request.method {
      Method::Get => self.mediator.handle(&config, &self.classifier, request).await,
      Method::Post if request.url.path() == config.sync_endpoint => {
        self.queue_sync_post(request)
      }
      _ => self.pass_through(&config, request).await,
    }
  }

  /// Queue a POST to the sync endpoint for later replay and acknowledge it
  /// immediately, so the page never blocks on connectivity.
  fn queue_sync_post(&self, request: &Request) -> StoredResponse {
    let parsed = request
      .body
      .as_deref()
      .ok_or_else(|| eyre!("missing request body"))
      .and_then(|body| {
        serde_json::from_slice::<serde_json::Value>(body)
          .map_err(|e| eyre!("invalid sync payload: {e}"))
      })
      .and_then(|value| {
        let kind: SyncKind = serde_json::from_value(value["kind"].clone())
          .map_err(|e| eyre!("unknown sync kind: {e}"))?;
        Ok((kind, value["payload"].clone()))
      });

    match parsed {
      Ok((kind, payload)) => {
        let id = self.queue.enqueue(kind, payload);
        info!(id = %id, "queued background sync item");
        StoredResponse::json(
          200,
          &serde_json::json!({ "success": true, "queued": true, "id": id }),
        )
      }
      Err(e) => {
        warn!(error = %e, "rejected sync enqueue request");
        StoredResponse::json(
          500,
          &serde_json::json!({ "success": false, "error": e.to_string() }),
        )
      }
    }
  }

  /// Non-GET requests outside the sync endpoint are not cacheable; forward
  /// them and synthesize a JSON failure when the network is gone.
  async fn pass_through(&self, config: &WorkerConfig, request: &Request) -> StoredResponse {
    match self
      .network
      .fetch(request, config.timeout(CacheCategory::Dynamic))
      .await
    {
      Ok(response) => response,
      Err(e) => {
        warn!(url = %request.url, error = %e, "pass-through request failed");
        fallback::offline_response("Network unavailable", 503)
      }
    }
  }

  /// Handle one page message. Fire-and-forget messages return `None`;
  /// request/response messages return the reply to post back.
  pub fn handle_message(&self, message: ClientMessage) -> Option<WorkerReply> {
    match message {
      ClientMessage::SkipWaiting => {
        self.activate();
        None
      }
      ClientMessage::GetCacheStatus => Some(WorkerReply::CacheStatus(self.cache_status())),
      ClientMessage::GetPerformanceMetrics => {
        Some(WorkerReply::Metrics(self.metrics.snapshot()))
      }
      ClientMessage::ClearCache { cache_name } => {
        let success = match self.storage.delete_store(&cache_name) {
          Ok(()) => true,
          Err(e) => {
            warn!(store = %cache_name, error = %e, "failed to clear store");
            false
          }
        };
        Some(WorkerReply::Ack { success })
      }
      ClientMessage::ClearAllCaches => Some(WorkerReply::Ack {
        success: self.clear_all_stores(),
      }),
      ClientMessage::QueueBackgroundSync { kind, payload } => {
        let id = self.queue.enqueue(kind, payload);
        Some(WorkerReply::Queued { queued: true, id })
      }
      ClientMessage::UpdateSettings { performance_mode } => {
        if let Some(enabled) = performance_mode {
          if let Ok(mut config) = self.config.write() {
            config.performance_mode = enabled;
            info!(enabled, "performance mode updated");
          }
        }
        None
      }
    }
  }

  fn clear_all_stores(&self) -> bool {
    let Some(config) = self.config_snapshot() else {
      return false;
    };
    let names = match self.storage.list_stores() {
      Ok(names) => names,
      Err(e) => {
        warn!(error = %e, "could not enumerate stores");
        return false;
      }
    };

    let mut success = true;
    for name in names.iter().filter(|n| n.starts_with(&config.prefix)) {
      if let Err(e) = self.storage.delete_store(name) {
        warn!(store = %name, error = %e, "failed to clear store");
        success = false;
      }
    }
    success
  }

  /// Per-store entry counts and sizes, for the cache management UI.
  pub fn cache_status(&self) -> CacheStatus {
    let mut status = CacheStatus::new();
    let Some(config) = self.config_snapshot() else {
      return status;
    };
    let names = match self.storage.list_stores() {
      Ok(names) => names,
      Err(e) => {
        warn!(error = %e, "could not enumerate stores for status");
        return status;
      }
    };

    for name in names.into_iter().filter(|n| config.is_current_store(n)) {
      let metas = match self.storage.keys(&name) {
        Ok(metas) => metas,
        Err(e) => {
          warn!(store = %name, error = %e, "could not read store for status");
          continue;
        }
      };
      if metas.is_empty() {
        continue;
      }

      let bytes: u64 = metas.iter().map(|m| m.byte_size).sum();
      let last_updated = metas
        .iter()
        .map(|m| m.stored_at)
        .max()
        .unwrap_or_else(chrono::Utc::now);

      status.insert(
        name,
        StoreStatus {
          entries: metas.len() as u64,
          size_mb: (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0,
          last_updated,
        },
      );
    }
    status
  }

  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  pub fn queued_items(&self) -> Vec<SyncItem> {
    self.queue.snapshot()
  }

  /// Record a connectivity change. Coming back online drains the sync queue.
  pub async fn set_online(&self, online: bool) {
    let was_online = self.online.swap(online, Ordering::SeqCst);
    if online && !was_online {
      info!("connectivity restored, draining sync queue");
      self.handle_sync().await;
    }
  }

  /// Drain the sync queue once. Each item is replayed in order; failures go
  /// back to the tail and wait for the next drain, so delivery is
  /// at-least-once.
  pub async fn handle_sync(&self) {
    let pending = self.queue.len();
    for _ in 0..pending {
      let Some(item) = self.queue.pop() else {
        break;
      };
      let id = item.id.clone();
      if let Err(e) = self.process_item(item.clone()).await {
        warn!(id = %id, attempts = item.attempts + 1, error = %e, "sync replay failed");
        self.queue.requeue(item);
      } else {
        info!(id = %id, "sync item replayed");
      }
    }
  }

  async fn process_item(&self, item: SyncItem) -> Result<()> {
    let config = self
      .config_snapshot()
      .ok_or_else(|| eyre!("worker state unavailable"))?;

    match item.kind {
      SyncKind::ApiRequest => {
        let request = payload_request(&item.payload)?;
        self
          .network
          .fetch(&request, config.timeout(CacheCategory::Api))
          .await
          .map_err(|e| eyre!("replay failed: {e}"))?;
        Ok(())
      }
      SyncKind::CacheUpdate => {
        let request = payload_request(&item.payload)?;
        self.refresh_into_api_store(&config, &request).await
      }
      SyncKind::UserAction => {
        // Actions are applied by the pages, not the worker; hand it back.
        self.send_event(WorkerEvent::QueuedAction {
          action: item.payload["action"].as_str().unwrap_or("unknown").to_string(),
          data: item.payload["data"].clone(),
          timestamp: item.enqueued_at,
        });
        Ok(())
      }
    }
  }

  /// Periodic refresh: re-fetch the volatile endpoints into the API store,
  /// re-enforce every budget, and push a status report to the pages.
  pub async fn handle_periodic_sync(&self) {
    let Some(config) = self.config_snapshot() else {
      return;
    };

    for endpoint in &config.refresh_endpoints {
      let request = match Url::parse(endpoint) {
        Ok(url) => Request::get(url),
        Err(e) => {
          warn!(endpoint = %endpoint, error = %e, "skipping unparseable refresh endpoint");
          continue;
        }
      };
      if let Err(e) = self.refresh_into_api_store(&config, &request).await {
        warn!(endpoint = %endpoint, error = %e, "periodic refresh failed");
      }
    }

    for category in CacheCategory::ALL {
      if let Some(budget) = config.budget_bytes(category) {
        let store = config.store_name(category);
        if let Err(e) = enforce_budget(self.storage.as_ref(), &store, budget) {
          warn!(store = %store, error = %e, "budget enforcement failed");
        }
      }
    }

    self.send_event(WorkerEvent::PerformanceUpdate {
      metrics: self.metrics.snapshot(),
      cache_status: self.cache_status(),
    });
  }

  async fn refresh_into_api_store(
    &self,
    config: &WorkerConfig,
    request: &Request,
  ) -> Result<()> {
    let response = self
      .network
      .fetch(request, config.timeout(CacheCategory::Api))
      .await
      .map_err(|e| eyre!("fetch failed: {e}"))?;

    let store = config.store_name(CacheCategory::Api);
    self
      .storage
      .put(&store, &request.cache_key(), request.url.as_str(), &response)
      .map_err(|e| eyre!("cache write failed: {e}"))?;
    if let Some(budget) = config.budget_bytes(CacheCategory::Api) {
      if let Err(e) = enforce_budget(self.storage.as_ref(), &store, budget) {
        warn!(store = %store, error = %e, "budget enforcement failed");
      }
    }
    Ok(())
  }

  /// Spawn the periodic-sync ticker. The first refresh happens one interval
  /// from now, not immediately.
  pub fn start_periodic_refresh(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
    let worker = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.tick().await; // first tick fires at once
      loop {
        ticker.tick().await;
        worker.handle_periodic_sync().await;
      }
    })
  }

  fn config_snapshot(&self) -> Option<WorkerConfig> {
    match self.config.read() {
      Ok(config) => Some(config.clone()),
      Err(_) => {
        warn!("configuration lock poisoned");
        None
      }
    }
  }

  fn send_event(&self, event: WorkerEvent) {
    // All pages gone is not an error.
    let _ = self.events.send(event);
  }
}

fn payload_request(payload: &serde_json::Value) -> Result<Request> {
  let raw = payload["url"]
    .as_str()
    .ok_or_else(|| eyre!("sync payload missing url"))?;
  let url = Url::parse(raw).map_err(|e| eyre!("invalid sync url {raw}: {e}"))?;
  Ok(Request::get(url))
}
