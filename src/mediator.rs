//! Per-category fetch strategies.
//!
//! The mediator is the per-request pipeline: classify, consult the
//! category's store, attempt the network within the category's deadline,
//! write through with eviction, and fall back to synthesized responses when
//! everything else failed. It never returns an error: whatever happens, the
//! caller gets some response, and exactly one metrics counter records how
//! the request was resolved.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::cache::{enforce_budget, CacheStorage, StoreError};
use crate::classify::{CacheCategory, Classifier};
use crate::config::WorkerConfig;
use crate::fallback;
use crate::metrics::PerformanceMetrics;
use crate::net::NetworkClient;
use crate::types::{Request, StoredResponse};

pub struct FetchMediator {
  storage: Arc<dyn CacheStorage>,
  network: Arc<dyn NetworkClient>,
  metrics: Arc<PerformanceMetrics>,
}

impl FetchMediator {
  pub fn new(
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn NetworkClient>,
    metrics: Arc<PerformanceMetrics>,
  ) -> Self {
    Self {
      storage,
      network,
      metrics,
    }
  }

  /// Resolve one intercepted GET request. Cache-first categories prefer a
  /// fresh stored entry and serve stale ones only after the network failed;
  /// network-first categories try the network and fall back to cache, then
  /// to a synthesized response.
  pub async fn handle(
    &self,
    config: &WorkerConfig,
    classifier: &Classifier,
    request: &Request,
  ) -> StoredResponse {
    let category = classifier.classify(&request.url);

    let result = match category {
      CacheCategory::Static
      | CacheCategory::Font
      | CacheCategory::Cdn
      | CacheCategory::Image
      | CacheCategory::Audio => self.cache_first(config, category, request).await,
      CacheCategory::Api => self.network_first_api(config, request).await,
      CacheCategory::Dynamic => self.network_first_dynamic(config, request).await,
    };

    match result {
      Ok(response) => response,
      Err(e) => {
        // Storage gave out entirely; the page still gets valid JSON.
        error!(url = %request.url, error = %e, "request handling failed");
        self.metrics.record_error();
        fallback::error_response("Request failed")
      }
    }
  }

  async fn cache_first(
    &self,
    config: &WorkerConfig,
    category: CacheCategory,
    request: &Request,
  ) -> Result<StoredResponse, StoreError> {
    let store = config.store_name(category);
    let key = request.cache_key();
    let cached = self.cached(&store, &key)?;

    if let Some(hit) = &cached {
      if !hit.is_expired(config.max_age(category)) {
        self.metrics.record_cache_hit();
        return Ok(hit.clone());
      }
    }

    match self.network.fetch(request, config.timeout(category)).await {
      Ok(response) => {
        self.write_through(config, category, &store, &key, request, &response);
        self.metrics.record_network_request();
        Ok(response)
      }
      Err(e) => {
        warn!(
          category = category.name(),
          url = %request.url,
          error = %e,
          "network attempt failed"
        );
        if let Some(hit) = cached {
          // Expired beats absent.
          self.metrics.record_cache_hit();
          return Ok(hit);
        }
        self.metrics.record_cache_miss();
        Ok(miss_fallback(category))
      }
    }
  }

  async fn network_first_api(
    &self,
    config: &WorkerConfig,
    request: &Request,
  ) -> Result<StoredResponse, StoreError> {
    let store = config.store_name(CacheCategory::Api);
    let key = request.cache_key();

    match self
      .network
      .fetch(request, config.timeout(CacheCategory::Api))
      .await
    {
      Ok(response) => {
        self.write_through(config, CacheCategory::Api, &store, &key, request, &response);
        self.metrics.record_network_request();
        Ok(response)
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "API network attempt failed");

        // Stale entries are fine here; a cached reply beats a canned one.
        if let Some(hit) = self.cached(&store, &key)? {
          self.metrics.record_cache_hit();
          let cache_date = hit
            .header("date")
            .map(str::to_string)
            .unwrap_or_else(|| hit.stored_at.to_rfc3339());
          return Ok(
            hit
              .with_header("X-Served-From", "cache")
              .with_header("X-Cache-Date", &cache_date),
          );
        }

        self.metrics.record_offline_request();
        Ok(fallback::api_fallback(&request.url, &config.hosts))
      }
    }
  }

  async fn network_first_dynamic(
    &self,
    config: &WorkerConfig,
    request: &Request,
  ) -> Result<StoredResponse, StoreError> {
    let store = config.store_name(CacheCategory::Dynamic);
    let key = request.cache_key();

    match self
      .network
      .fetch(request, config.timeout(CacheCategory::Dynamic))
      .await
    {
      Ok(response) => {
        self.write_through(
          config,
          CacheCategory::Dynamic,
          &store,
          &key,
          request,
          &response,
        );
        self.metrics.record_network_request();
        Ok(response)
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "dynamic network attempt failed");

        if let Some(hit) = self.cached(&store, &key)? {
          self.metrics.record_cache_hit();
          return Ok(hit);
        }

        if request.navigation {
          if let Some(page) = self.offline_page(config)? {
            self.metrics.record_offline_request();
            return Ok(page);
          }
        }

        self.metrics.record_cache_miss();
        Ok(fallback::offline_response("Page not available offline", 503))
      }
    }
  }

  /// Cache lookup that degrades a malformed entry to a miss; only backend
  /// failures propagate.
  fn cached(&self, store: &str, key: &str) -> Result<Option<StoredResponse>, StoreError> {
    match self.storage.get(store, key) {
      Ok(entry) => Ok(entry),
      Err(StoreError::MalformedEntry(key)) => {
        debug!(store, key, "ignoring malformed cache entry");
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  /// Store a successful response and re-enforce the category budget.
  /// Write failures never fail the request; the fetched response is
  /// returned whether or not it could be cached.
  fn write_through(
    &self,
    config: &WorkerConfig,
    category: CacheCategory,
    store: &str,
    key: &str,
    request: &Request,
    response: &StoredResponse,
  ) {
    if !response.is_ok() {
      return;
    }

    match self.storage.put(store, key, request.url.as_str(), response) {
      Ok(()) => {
        if let Some(budget) = config.budget_bytes(category) {
          if let Err(e) = enforce_budget(self.storage.as_ref(), store, budget) {
            warn!(store, error = %e, "budget enforcement failed");
          }
        }
      }
      Err(StoreError::QuotaExceeded) => {
        warn!(store, url = %request.url, "cache write skipped: storage quota exceeded");
      }
      Err(e) => {
        warn!(store, url = %request.url, error = %e, "cache write failed");
      }
    }
  }

  /// The pre-cached offline page, if install managed to warm it.
  fn offline_page(&self, config: &WorkerConfig) -> Result<Option<StoredResponse>, StoreError> {
    let url = match config.asset_url(&config.offline_page) {
      Ok(url) => url,
      Err(_) => return Ok(None),
    };
    let key = Request::get(url).cache_key();
    self.cached(&config.store_name(CacheCategory::Static), &key)
  }
}

fn miss_fallback(category: CacheCategory) -> StoredResponse {
  match category {
    CacheCategory::Image => fallback::placeholder_image(),
    CacheCategory::Audio => fallback::offline_response("Audio not available offline", 503),
    CacheCategory::Font => fallback::offline_response("Font not available offline", 503),
    CacheCategory::Cdn => fallback::offline_response("CDN resource not available offline", 503),
    _ => fallback::offline_response("Static asset not available offline", 503),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::testutil::{ok_response, FailingStorage, FakeNetwork};
  use url::Url;

  struct Fixture {
    mediator: FetchMediator,
    config: WorkerConfig,
    classifier: Classifier,
    storage: Arc<MemoryStorage>,
    network: Arc<FakeNetwork>,
    metrics: Arc<PerformanceMetrics>,
  }

  fn fixture() -> Fixture {
    let config = WorkerConfig::default();
    let classifier = Classifier::from_config(&config);
    let storage = Arc::new(MemoryStorage::new());
    let network = Arc::new(FakeNetwork::new());
    let metrics = Arc::new(PerformanceMetrics::new());
    let mediator = FetchMediator::new(storage.clone(), network.clone(), metrics.clone());

    Fixture {
      mediator,
      config,
      classifier,
      storage,
      network,
      metrics,
    }
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  async fn handle(f: &Fixture, request: &Request) -> StoredResponse {
    f.mediator.handle(&f.config, &f.classifier, request).await
  }

  #[tokio::test]
  async fn static_asset_round_trip_survives_going_offline() {
    let f = fixture();
    let request = get("http://localhost:8080/index.html");
    f.network
      .respond(request.url.as_str(), ok_response("text/html", b"<html>app</html>"));

    let first = handle(&f, &request).await;
    assert_eq!(first.status, 200);
    assert_eq!(first.body, b"<html>app</html>");

    // Second request with the network down is served from the static store.
    f.network.set_online(false);
    let second = handle(&f, &request).await;
    assert_eq!(second.status, 200);
    assert_eq!(second.body, b"<html>app</html>");

    let report = f.metrics.snapshot();
    assert_eq!(report.network_requests, 1);
    assert_eq!(report.cache_hits, 1);
  }

  #[tokio::test]
  async fn api_prefers_network_even_when_cached() {
    let f = fixture();
    let request = get("https://api.quotable.io/random");
    f.network
      .respond(request.url.as_str(), ok_response("application/json", b"{\"fresh\":1}"));

    // Seed the cache; network-first must still hit the network.
    handle(&f, &request).await;
    handle(&f, &request).await;

    assert_eq!(f.network.fetch_count(), 2);
    assert_eq!(f.metrics.snapshot().network_requests, 2);
  }

  #[tokio::test]
  async fn api_offline_with_cache_is_tagged_as_cache_served() {
    let f = fixture();
    let request = get("https://api.quotable.io/random");
    f.network
      .respond(request.url.as_str(), ok_response("application/json", b"{\"q\":\"hi\"}"));

    handle(&f, &request).await;
    f.network.set_online(false);
    let offline = handle(&f, &request).await;

    assert_eq!(offline.body, b"{\"q\":\"hi\"}");
    assert_eq!(offline.header("X-Served-From"), Some("cache"));
    assert!(offline.header("X-Cache-Date").is_some());
  }

  #[tokio::test]
  async fn quote_api_offline_and_uncached_yields_shaped_fallback() {
    let f = fixture();
    f.network.set_online(false);

    let response = handle(&f, &get("https://api.quotable.io/random")).await;

    assert_eq!(response.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert!(body["content"].is_string());
    assert!(body["author"].is_string());
    assert_eq!(body["offline"], true);
    assert_eq!(f.metrics.snapshot().offline_requests, 1);
  }

  #[tokio::test]
  async fn image_server_error_and_uncached_yields_placeholder() {
    let f = fixture();
    let request = get("https://picsum.photos/400/300.png");
    f.network
      .fail(request.url.as_str(), crate::net::FetchError::HttpStatus(500));

    let response = handle(&f, &request).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("image/svg+xml"));
    assert!(response.body_text().contains("<svg"));
  }

  #[tokio::test]
  async fn expired_entry_is_refetched_but_served_stale_on_failure() {
    let f = fixture();
    let request = get("https://somewhere.example/photo.png");

    // Plant an entry well past the image freshness window.
    let mut stale = ok_response("image/png", b"old-bytes");
    stale.stored_at = chrono::Utc::now() - chrono::Duration::days(60);
    f.storage
      .put(
        &f.config.store_name(CacheCategory::Image),
        &request.cache_key(),
        request.url.as_str(),
        &stale,
      )
      .unwrap();

    // Network up: expired entry is skipped in favor of a fresh fetch.
    f.network
      .respond(request.url.as_str(), ok_response("image/png", b"new-bytes"));
    let fresh = handle(&f, &request).await;
    assert_eq!(fresh.body, b"new-bytes");

    // Network down with the entry expired again: stale still beats absent.
    let mut stale_again = ok_response("image/png", b"old-bytes");
    stale_again.stored_at = chrono::Utc::now() - chrono::Duration::days(60);
    f.storage
      .put(
        &f.config.store_name(CacheCategory::Image),
        &request.cache_key(),
        request.url.as_str(),
        &stale_again,
      )
      .unwrap();
    f.network.set_online(false);

    let served = handle(&f, &request).await;
    assert_eq!(served.body, b"old-bytes");
  }

  #[tokio::test]
  async fn failed_navigation_serves_precached_offline_page() {
    let f = fixture();
    f.network.set_online(false);

    // Pre-warm the offline page the way install would.
    let offline_url = f.config.asset_url("/offline.html").unwrap();
    let offline_request = Request::get(offline_url);
    f.storage
      .put(
        &f.config.store_name(CacheCategory::Static),
        &offline_request.cache_key(),
        offline_request.url.as_str(),
        &ok_response("text/html", b"<html>offline</html>"),
      )
      .unwrap();

    let nav = Request::navigate(Url::parse("https://unknown.example/some/page").unwrap());
    let response = handle(&f, &nav).await;

    assert_eq!(response.body, b"<html>offline</html>");
    assert_eq!(f.metrics.snapshot().offline_requests, 1);
  }

  #[tokio::test]
  async fn failed_plain_dynamic_request_gets_offline_json() {
    let f = fixture();
    f.network.set_online(false);

    let response = handle(&f, &get("https://unknown.example/data")).await;

    assert_eq!(response.status, 503);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["offline"], true);
  }

  #[tokio::test]
  async fn audio_miss_is_a_503_not_a_placeholder() {
    let f = fixture();
    f.network.set_online(false);

    let response = handle(&f, &get("https://somewhere.example/rain.mp3")).await;

    assert_eq!(response.status, 503);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["offline"], true);
  }

  #[tokio::test]
  async fn write_through_enforces_the_category_budget() {
    let mut config = WorkerConfig::default();
    config.budgets.image_mb = 0; // budget of zero evicts everything after write
    let f = Fixture {
      config,
      ..fixture()
    };

    let request = get("https://somewhere.example/big.png");
    f.network
      .respond(request.url.as_str(), ok_response("image/png", &[0u8; 4096]));

    let response = f.mediator.handle(&f.config, &f.classifier, &request).await;
    assert_eq!(response.status, 200);

    let store = f.config.store_name(CacheCategory::Image);
    assert_eq!(f.storage.total_bytes(&store).unwrap(), 0);
  }

  #[tokio::test]
  async fn quota_exceeded_write_still_returns_the_fetched_response() {
    let config = WorkerConfig::default();
    let classifier = Classifier::from_config(&config);
    let storage = Arc::new(FailingStorage::new());
    storage.reject_writes();
    let network = Arc::new(FakeNetwork::new());
    let metrics = Arc::new(PerformanceMetrics::new());
    let mediator = FetchMediator::new(storage.clone(), network.clone(), metrics.clone());

    let request = get("https://picsum.photos/a.png");
    network.respond(request.url.as_str(), ok_response("image/png", b"pixels"));

    let response = mediator.handle(&config, &classifier, &request).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"pixels");
    assert_eq!(storage.entry_count(&config.store_name(CacheCategory::Image)).unwrap(), 0);

    let report = metrics.snapshot();
    assert_eq!(report.network_requests, 1);
    assert_eq!(report.counter_sum(), 1);
  }

  #[tokio::test]
  async fn backend_read_failure_yields_error_json_and_one_errors_increment() {
    let config = WorkerConfig::default();
    let classifier = Classifier::from_config(&config);
    let storage = Arc::new(FailingStorage::new());
    storage.fail_reads();
    let network = Arc::new(FakeNetwork::new());
    let metrics = Arc::new(PerformanceMetrics::new());
    let mediator = FetchMediator::new(storage, network, metrics.clone());

    let response = mediator
      .handle(&config, &classifier, &get("http://localhost:8080/index.html"))
      .await;

    assert_eq!(response.status, 500);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "Worker Error");

    let report = metrics.snapshot();
    assert_eq!(report.errors, 1);
    assert_eq!(report.counter_sum(), 1);
  }

  #[tokio::test]
  async fn every_request_increments_exactly_one_counter() {
    let f = fixture();
    f.network
      .respond("http://localhost:8080/js/main.js", ok_response("text/javascript", b"js"));
    f.network.fail(
      "https://picsum.photos/a.png",
      crate::net::FetchError::Timeout(std::time::Duration::from_secs(15)),
    );

    let requests = [
      get("http://localhost:8080/js/main.js"),  // network
      get("http://localhost:8080/js/main.js"),  // cache hit
      get("https://picsum.photos/a.png"),       // miss -> placeholder
      get("https://api.quotable.io/random"),    // offline fallback (no route)
      get("https://unknown.example/x"),         // dynamic miss
    ];

    let mut last_sum = 0;
    for request in &requests {
      handle(&f, request).await;
      let sum = f.metrics.snapshot().counter_sum();
      assert_eq!(sum, last_sum + 1, "request to {} double-counted", request.url);
      last_sum = sum;
    }
  }
}
