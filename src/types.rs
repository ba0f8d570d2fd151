//! Core request and response types shared across the cache pipeline.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

/// HTTP method. GET and POST get their own variants because the pipeline
/// branches on them; everything else is carried verbatim so pass-through
/// requests keep their method on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Other(String),
}

impl Method {
  pub fn as_str(&self) -> &str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Other(name) => name,
    }
  }
}

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// True for top-level page navigations; drives the offline-page fallback.
  pub navigation: bool,
  pub body: Option<Vec<u8>>,
}

impl Request {
  /// A plain GET request.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      navigation: false,
      body: None,
    }
  }

  /// A GET request representing a top-level page navigation.
  pub fn navigate(url: Url) -> Self {
    Self {
      navigation: true,
      ..Self::get(url)
    }
  }

  /// A POST request with a body.
  pub fn post(url: Url, body: Vec<u8>) -> Self {
    Self {
      method: Method::Post,
      url,
      navigation: false,
      body: Some(body),
    }
  }

  /// A bodiless request with an arbitrary method, forwarded uncached.
  pub fn with_method(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      navigation: false,
      body: None,
    }
  }

  /// Stable cache key for this request.
  ///
  /// SHA256 over method and URL for fixed-length keys; the plain URL is kept
  /// alongside the key in storage for enumeration and refresh.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response as held by a cache store: status, headers, body and the time it
/// was captured. This is the only response representation the pipeline uses;
/// synthetic fallbacks and real network responses are indistinguishable to
/// callers apart from their headers.
#[derive(Debug, Clone)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
      stored_at: Utc::now(),
    }
  }

  /// A JSON response with the given status.
  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self::new(
      status,
      vec![("Content-Type".to_string(), "application/json".to_string())],
      value.to_string().into_bytes(),
    )
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Replace a header if present, append it otherwise.
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    if let Some(slot) = self
      .headers
      .iter_mut()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
    {
      slot.1 = value.to_string();
    } else {
      self.headers.push((name.to_string(), value.to_string()));
    }
    self
  }

  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Entry size as accounted against a store's byte budget.
  pub fn byte_size(&self) -> u64 {
    self.body.len() as u64
  }

  /// Whether this entry is older than the given freshness window.
  pub fn is_expired(&self, max_age: std::time::Duration) -> bool {
    let age = Utc::now() - self.stored_at;
    match chrono::Duration::from_std(max_age) {
      Ok(max) => age > max,
      Err(_) => false,
    }
  }

  /// Body interpreted as UTF-8, for JSON payloads and tests.
  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}
