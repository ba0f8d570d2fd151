//! Request classification into cache categories.
//!
//! Classification is a pure, total function of the request URL: every URL
//! lands in exactly one [`CacheCategory`], and the rules are evaluated in a
//! fixed precedence order with first match winning. Overlaps are real (an
//! image host can also appear in a CDN list), so the order is part of the
//! contract.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{HostPatterns, WorkerConfig};

/// The cache tier a request belongs to. Each category owns one versioned
/// store, one fetch strategy, one freshness window and one fallback shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
  Static,
  Api,
  Image,
  Audio,
  Font,
  Cdn,
  Dynamic,
}

impl CacheCategory {
  pub const ALL: [CacheCategory; 7] = [
    CacheCategory::Static,
    CacheCategory::Api,
    CacheCategory::Image,
    CacheCategory::Audio,
    CacheCategory::Font,
    CacheCategory::Cdn,
    CacheCategory::Dynamic,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      CacheCategory::Static => "static",
      CacheCategory::Api => "api",
      CacheCategory::Image => "image",
      CacheCategory::Audio => "audio",
      CacheCategory::Font => "font",
      CacheCategory::Cdn => "cdn",
      CacheCategory::Dynamic => "dynamic",
    }
  }
}

/// API family a hostname belongs to, used to pick the fallback payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFamily {
  Weather,
  Quotes,
  ImageSearch,
  SoundSearch,
  Colors,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "aac", "flac", "wma"];
const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];

/// Static-asset path prefixes on the app's own origin.
const STATIC_PREFIXES: &[&str] = &["/src/", "/assets/", "/css/", "/js/", "/icons/"];

/// Exact same-origin paths that are part of the app shell.
const STATIC_PAGES: &[&str] = &["/", "/index.html", "/manifest.json", "/offline.html"];

/// Maps request URLs to cache categories using path, extension and hostname
/// rules. Built once from config; classification itself does no I/O.
#[derive(Debug, Clone)]
pub struct Classifier {
  origin: String,
  hosts: HostPatterns,
}

impl Classifier {
  pub fn from_config(config: &WorkerConfig) -> Self {
    Self {
      origin: config.origin.trim_end_matches('/').to_string(),
      hosts: config.hosts.clone(),
    }
  }

  /// Assign a category to a URL. Rules in precedence order:
  ///
  /// 1. Same-origin app-shell paths → Static
  /// 2. Known API hostnames (weather/quotes/image-search/sound-search/colors) → Api
  /// 3. Image extension or image-CDN hostname → Image
  /// 4. Audio extension or audio-host hostname → Audio
  /// 5. Font extension or web-font hostname → Font
  /// 6. CDN script/style hostname → Cdn
  /// 7. Everything else → Dynamic
  pub fn classify(&self, url: &Url) -> CacheCategory {
    if self.is_static_asset(url) {
      return CacheCategory::Static;
    }
    if self.api_family(url).is_some() {
      return CacheCategory::Api;
    }

    let host = url.host_str().unwrap_or("");
    let path = url.path();

    if has_extension(path, IMAGE_EXTENSIONS) || host_matches(host, &self.hosts.image_cdn) {
      return CacheCategory::Image;
    }
    if has_extension(path, AUDIO_EXTENSIONS) || host_matches(host, &self.hosts.audio) {
      return CacheCategory::Audio;
    }
    if has_extension(path, FONT_EXTENSIONS) || host_matches(host, &self.hosts.fonts) {
      return CacheCategory::Font;
    }
    if host_matches(host, &self.hosts.cdn) {
      return CacheCategory::Cdn;
    }

    CacheCategory::Dynamic
  }

  /// Which API family a URL's hostname belongs to, if any. Drives both the
  /// Api classification rule and the fallback payload shape.
  pub fn api_family(&self, url: &Url) -> Option<ApiFamily> {
    let host = url.host_str()?;
    api_family_for_host(host, &self.hosts)
  }

  fn is_static_asset(&self, url: &Url) -> bool {
    if url.origin().ascii_serialization() != self.origin {
      return false;
    }
    let path = url.path();
    STATIC_PAGES.contains(&path) || STATIC_PREFIXES.iter().any(|p| path.starts_with(p))
  }
}

/// Family lookup shared with the fallback generator, which must classify
/// hosts without holding a full classifier.
pub fn api_family_for_host(host: &str, hosts: &HostPatterns) -> Option<ApiFamily> {
  if host_matches(host, &hosts.weather) {
    Some(ApiFamily::Weather)
  } else if host_matches(host, &hosts.quotes) {
    Some(ApiFamily::Quotes)
  } else if host_matches(host, &hosts.image_search) {
    Some(ApiFamily::ImageSearch)
  } else if host_matches(host, &hosts.sound_search) {
    Some(ApiFamily::SoundSearch)
  } else if host_matches(host, &hosts.colors) {
    Some(ApiFamily::Colors)
  } else {
    None
  }
}

fn host_matches(host: &str, patterns: &[String]) -> bool {
  patterns.iter().any(|p| host.contains(p.as_str()))
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
  match path.rsplit_once('.') {
    Some((_, ext)) => extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)),
    None => false,
  }
}
