//! Worker lifecycle: install-time pre-warm and activation cleanup.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::CacheStorage;
use crate::classify::CacheCategory;
use crate::config::WorkerConfig;
use crate::net::NetworkClient;
use crate::types::Request;

/// Where the worker is in its life. Transitions only move forward;
/// `Redundant` means a newer version has taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Installing,
  Installed,
  Activating,
  Activated,
  Redundant,
}

/// Assets fetched per batch during pre-warm, to avoid stampeding the origin.
const PREWARM_BATCH: usize = 10;

/// Fetch and store every asset in the static manifest. Failures of
/// individual assets are logged and skipped; the app still installs without
/// its optional assets. Returns how many assets were cached.
pub async fn prewarm_static(
  config: &WorkerConfig,
  storage: &Arc<dyn CacheStorage>,
  network: &Arc<dyn NetworkClient>,
) -> usize {
  let store = config.store_name(CacheCategory::Static);
  let timeout = config.timeout(CacheCategory::Static);
  let mut cached = 0usize;

  for batch in config.static_assets.chunks(PREWARM_BATCH) {
    let fetches = batch.iter().map(|path| {
      let storage = Arc::clone(storage);
      let network = Arc::clone(network);
      let store = store.clone();
      async move {
        let url = match config.asset_url(path) {
          Ok(url) => url,
          Err(e) => {
            warn!(path = %path, error = %e, "skipping unparseable static asset");
            return false;
          }
        };

        let request = Request::get(url);
        match network.fetch(&request, timeout).await {
          Ok(response) => {
            let key = request.cache_key();
            match storage.put(&store, &key, request.url.as_str(), &response) {
              Ok(()) => true,
              Err(e) => {
                warn!(path = %path, error = %e, "failed to cache static asset");
                false
              }
            }
          }
          Err(e) => {
            warn!(path = %path, error = %e, "failed to fetch static asset");
            false
          }
        }
      }
    });

    cached += join_all(fetches).await.into_iter().filter(|ok| *ok).count();
  }

  info!(
    cached,
    total = config.static_assets.len(),
    "static pre-warm finished"
  );
  cached
}

/// Delete every store carrying this worker's prefix but not the current
/// version. Deletion failures are logged and left for the next activation.
/// Returns the names of the stores that were removed.
pub fn cleanup_stale_stores(
  config: &WorkerConfig,
  storage: &Arc<dyn CacheStorage>,
) -> Vec<String> {
  let names = match storage.list_stores() {
    Ok(names) => names,
    Err(e) => {
      warn!(error = %e, "could not enumerate stores for cleanup");
      return Vec::new();
    }
  };

  let mut deleted = Vec::new();
  for name in names {
    if !name.starts_with(&config.prefix) || config.is_current_store(&name) {
      continue;
    }

    match storage.delete_store(&name) {
      Ok(()) => {
        info!(store = %name, "deleted stale cache store");
        deleted.push(name);
      }
      Err(e) => {
        warn!(store = %name, error = %e, "failed to delete stale store, will retry");
      }
    }
  }

  deleted
}
