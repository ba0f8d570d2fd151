use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::classify::CacheCategory;

const MB: u64 = 1024 * 1024;

/// Worker configuration: version, store naming, per-category byte budgets,
/// freshness windows, network timeouts, hostname allowlists and the static
/// asset manifest.
///
/// Every field has a default carried from the production cache policy, so an
/// absent or partial config file still yields a working worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Build version embedded in store names; bumping it is the sole mechanism
  /// for forced cache invalidation across deploys.
  pub version: String,
  /// Prefix for all store names owned by this worker.
  pub prefix: String,
  /// Origin the app shell is served from, e.g. "https://app.example.com".
  pub origin: String,
  pub budgets: Budgets,
  pub max_ages: MaxAges,
  pub timeouts: Timeouts,
  pub hosts: HostPatterns,
  /// App-shell assets pre-warmed into the static store on install.
  pub static_assets: Vec<String>,
  /// Path of the pre-cached offline page served for failed navigations.
  pub offline_page: String,
  /// Same-origin POST endpoint whose requests are queued for background sync.
  pub sync_endpoint: String,
  /// Volatile API endpoints re-fetched on periodic sync.
  pub refresh_endpoints: Vec<String>,
  /// Halves every byte budget; toggled via the UPDATE_SETTINGS message.
  pub performance_mode: bool,
}

/// Per-category size budgets in megabytes. Static and CDN stores carry no
/// byte budget; they are bounded by freshness instead.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Budgets {
  pub dynamic_mb: u64,
  pub api_mb: u64,
  pub image_mb: u64,
  pub audio_mb: u64,
  pub font_mb: u64,
}

impl Default for Budgets {
  fn default() -> Self {
    Self {
      dynamic_mb: 50,
      api_mb: 25,
      image_mb: 150,
      audio_mb: 300,
      font_mb: 10,
    }
  }
}

/// Per-category freshness windows in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaxAges {
  pub static_secs: u64,
  pub dynamic_secs: u64,
  pub api_secs: u64,
  pub image_secs: u64,
  pub audio_secs: u64,
  pub font_secs: u64,
}

impl Default for MaxAges {
  fn default() -> Self {
    const DAY: u64 = 24 * 60 * 60;
    Self {
      static_secs: 365 * DAY,
      dynamic_secs: 7 * DAY,
      api_secs: 30 * 60,
      image_secs: 30 * DAY,
      audio_secs: 7 * DAY,
      font_secs: 365 * DAY,
    }
  }
}

/// Per-category network timeouts in milliseconds. Audio gets the longest
/// window because of file sizes; APIs stay short so fallbacks arrive quickly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timeouts {
  pub static_ms: u64,
  pub dynamic_ms: u64,
  pub api_ms: u64,
  pub image_ms: u64,
  pub audio_ms: u64,
  pub font_ms: u64,
  pub cdn_ms: u64,
}

impl Default for Timeouts {
  fn default() -> Self {
    Self {
      static_ms: 5_000,
      dynamic_ms: 8_000,
      api_ms: 10_000,
      image_ms: 15_000,
      audio_ms: 30_000,
      font_ms: 10_000,
      cdn_ms: 10_000,
    }
  }
}

/// Hostname allowlists used by the classifier and the fallback generator.
/// Matching is substring-based on the hostname.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostPatterns {
  pub weather: Vec<String>,
  pub quotes: Vec<String>,
  pub image_search: Vec<String>,
  pub sound_search: Vec<String>,
  pub colors: Vec<String>,
  pub image_cdn: Vec<String>,
  pub audio: Vec<String>,
  pub fonts: Vec<String>,
  pub cdn: Vec<String>,
}

fn hosts(list: &[&str]) -> Vec<String> {
  list.iter().map(|s| s.to_string()).collect()
}

impl Default for HostPatterns {
  fn default() -> Self {
    Self {
      weather: hosts(&["api.openweathermap.org", "weatherapi.com", "api.weather.gov"]),
      quotes: hosts(&["api.quotable.io", "zenquotes.io", "quotegarden.com"]),
      image_search: hosts(&[
        "source.unsplash.com",
        "api.nasa.gov",
        "collectionapi.metmuseum.org",
      ]),
      sound_search: hosts(&["freesound.org", "zapsplat.com"]),
      colors: hosts(&["colormind.io", "coolors.co", "paletton.com"]),
      image_cdn: hosts(&["images.unsplash.com", "picsum.photos"]),
      audio: hosts(&["soundjay.com"]),
      fonts: hosts(&["fonts.gstatic.com", "fonts.googleapis.com"]),
      cdn: hosts(&[
        "cdnjs.cloudflare.com",
        "cdn.jsdelivr.net",
        "unpkg.com",
        "code.iconify.design",
        "cdn.animate.style",
      ]),
    }
  }
}

fn default_static_assets() -> Vec<String> {
  [
    "/",
    "/index.html",
    "/manifest.json",
    "/css/main.css",
    "/css/components.css",
    "/css/animations.css",
    "/js/main.js",
    "/js/app.js",
    "/js/settings.js",
    "/js/storage.js",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
    "/offline.html",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      version: "2.0.0".to_string(),
      prefix: "glowcache".to_string(),
      origin: "http://localhost:8080".to_string(),
      budgets: Budgets::default(),
      max_ages: MaxAges::default(),
      timeouts: Timeouts::default(),
      hosts: HostPatterns::default(),
      static_assets: default_static_assets(),
      offline_page: "/offline.html".to_string(),
      sync_endpoint: "/api/sync".to_string(),
      refresh_endpoints: vec!["https://api.quotable.io/random".to_string()],
      performance_mode: false,
    }
  }
}

impl WorkerConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./glowcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/glowcache/config.yaml
  ///
  /// No file found means defaults.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("glowcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("glowcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: WorkerConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Versioned store name for a category, e.g. "glowcache-api-v2.0.0".
  pub fn store_name(&self, category: CacheCategory) -> String {
    format!("{}-{}-v{}", self.prefix, category.name(), self.version)
  }

  /// Whether a store name belongs to the current build version.
  pub fn is_current_store(&self, name: &str) -> bool {
    CacheCategory::ALL
      .iter()
      .any(|cat| name == self.store_name(*cat))
  }

  /// Byte budget for a category, already halved in performance mode.
  /// None means the category is freshness-bounded instead.
  pub fn budget_bytes(&self, category: CacheCategory) -> Option<u64> {
    let mb = match category {
      CacheCategory::Dynamic => self.budgets.dynamic_mb,
      CacheCategory::Api => self.budgets.api_mb,
      CacheCategory::Image => self.budgets.image_mb,
      CacheCategory::Audio => self.budgets.audio_mb,
      CacheCategory::Font => self.budgets.font_mb,
      CacheCategory::Static | CacheCategory::Cdn => return None,
    };
    let bytes = mb * MB;
    Some(if self.performance_mode { bytes / 2 } else { bytes })
  }

  /// Freshness window for a category. CDN resources age like static assets.
  pub fn max_age(&self, category: CacheCategory) -> Duration {
    let secs = match category {
      CacheCategory::Static | CacheCategory::Cdn => self.max_ages.static_secs,
      CacheCategory::Dynamic => self.max_ages.dynamic_secs,
      CacheCategory::Api => self.max_ages.api_secs,
      CacheCategory::Image => self.max_ages.image_secs,
      CacheCategory::Audio => self.max_ages.audio_secs,
      CacheCategory::Font => self.max_ages.font_secs,
    };
    Duration::from_secs(secs)
  }

  /// Network timeout for a category.
  pub fn timeout(&self, category: CacheCategory) -> Duration {
    let ms = match category {
      CacheCategory::Static => self.timeouts.static_ms,
      CacheCategory::Dynamic => self.timeouts.dynamic_ms,
      CacheCategory::Api => self.timeouts.api_ms,
      CacheCategory::Image => self.timeouts.image_ms,
      CacheCategory::Audio => self.timeouts.audio_ms,
      CacheCategory::Font => self.timeouts.font_ms,
      CacheCategory::Cdn => self.timeouts.cdn_ms,
    };
    Duration::from_millis(ms)
  }

  /// Absolute URL for a same-origin asset path.
  pub fn asset_url(&self, path: &str) -> Result<Url> {
    Url::parse(&format!("{}{}", self.origin.trim_end_matches('/'), path))
      .map_err(|e| eyre!("Invalid asset URL for {}: {}", path, e))
  }
}
