//! Synthesized substitute responses for requests that failed everywhere.
//!
//! Fallbacks are deterministic for a given URL (timestamps aside) and shaped
//! like the real upstream payloads, so calling code written against the live
//! APIs keeps working offline. Harmless substitutions return 200; genuine
//! unavailability returns 503.

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use url::Url;

use crate::classify::{api_family_for_host, ApiFamily};
use crate::config::HostPatterns;
use crate::types::StoredResponse;

const SERVED_FROM: &str = "X-Served-From";

/// Canned quotes served when every quote API is unreachable.
const FALLBACK_QUOTES: &[(&str, &str, &[&str])] = &[
  (
    "The best way to predict the future is to create it.",
    "Peter Drucker",
    &["inspirational", "future"],
  ),
  (
    "In the middle of difficulty lies opportunity.",
    "Albert Einstein",
    &["inspirational", "opportunity"],
  ),
  (
    "Life is what happens to you while you're busy making other plans.",
    "John Lennon",
    &["life", "wisdom"],
  ),
  (
    "The only way to do great work is to love what you do.",
    "Steve Jobs",
    &["work", "passion"],
  ),
];

/// Substitute payload for a failed API request, shaped per API family.
/// Recognized families get a plausible 200 payload tagged `offline: true`;
/// unknown API hosts get a generic 503.
pub fn api_fallback(url: &Url, hosts: &HostPatterns) -> StoredResponse {
  let family = url.host_str().and_then(|h| api_family_for_host(h, hosts));

  let response = match family {
    Some(ApiFamily::Weather) => StoredResponse::json(200, &weather_payload()),
    Some(ApiFamily::Quotes) => StoredResponse::json(200, &quote_payload(url)),
    Some(ApiFamily::Colors) => StoredResponse::json(200, &color_payload(url)),
    Some(ApiFamily::ImageSearch) | Some(ApiFamily::SoundSearch) | None => StoredResponse::json(
      503,
      &json!({
        "error": "API not available offline",
        "offline": true,
        "message": "This service requires an internet connection",
      }),
    ),
  };

  response.with_header(SERVED_FROM, "offline-fallback")
}

fn weather_payload() -> serde_json::Value {
  let now = Utc::now().timestamp_millis();
  json!({
    "weather": [{ "main": "Clear", "description": "clear sky", "icon": "01d" }],
    "main": { "temp": 22, "feels_like": 22, "humidity": 50, "pressure": 1013 },
    "name": "Your Location",
    "wind": { "speed": 3.5, "deg": 180 },
    "visibility": 10000,
    "clouds": { "all": 0 },
    "sys": { "sunrise": now - 3_600_000, "sunset": now + 3_600_000 },
    "offline": true,
  })
}

fn quote_payload(url: &Url) -> serde_json::Value {
  // Selection keyed on the URL so the same request always gets the same
  // quote, unlike the upstream's random pick.
  let (content, author, tags) = FALLBACK_QUOTES[url_digest(url)[0] as usize % FALLBACK_QUOTES.len()];
  json!({
    "content": content,
    "author": author,
    "tags": tags,
    "offline": true,
  })
}

fn color_payload(url: &Url) -> serde_json::Value {
  let digest = url_digest(url);
  let palette: Vec<String> = digest
    .chunks(3)
    .take(5)
    .map(|c| format!("#{:02x}{:02x}{:02x}", c[0], c[1], c[2]))
    .collect();
  json!({ "colors": palette, "offline": true })
}

fn url_digest(url: &Url) -> Vec<u8> {
  let mut hasher = Sha256::new();
  hasher.update(url.as_str().as_bytes());
  hasher.finalize().to_vec()
}

/// Placeholder graphic served when an image is unreachable and uncached,
/// so the page never shows a broken-image icon.
pub fn placeholder_image() -> StoredResponse {
  let svg = r##"<svg width="400" height="300" xmlns="http://www.w3.org/2000/svg">
  <defs>
    <linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">
      <stop offset="0%" style="stop-color:#2a2a2a;stop-opacity:1"/>
      <stop offset="100%" style="stop-color:#1a1a1a;stop-opacity:1"/>
    </linearGradient>
  </defs>
  <rect width="100%" height="100%" fill="url(#grad)"/>
  <circle cx="200" cy="120" r="30" fill="#444" opacity="0.5"/>
  <text x="50%" y="60%" text-anchor="middle" dy=".3em" fill="#666" font-family="Arial, sans-serif" font-size="16">Image not available offline</text>
  <text x="50%" y="70%" text-anchor="middle" dy=".3em" fill="#555" font-family="Arial, sans-serif" font-size="12">Connect to internet to load images</text>
</svg>"##;

  StoredResponse::new(
    200,
    vec![
      ("Content-Type".to_string(), "image/svg+xml".to_string()),
      (SERVED_FROM.to_string(), "placeholder".to_string()),
    ],
    svg.as_bytes().to_vec(),
  )
}

/// Generic offline JSON body for categories with no richer substitute.
pub fn offline_response(message: &str, status: u16) -> StoredResponse {
  StoredResponse::json(
    status,
    &json!({
      "error": "Offline",
      "message": message,
      "offline": true,
      "timestamp": Utc::now().to_rfc3339(),
    }),
  )
  .with_header(SERVED_FROM, "offline-response")
}

/// Last-resort 500-style body for uncategorizable internal faults. Always
/// valid JSON; the page must never see a raw error.
pub fn error_response(message: &str) -> StoredResponse {
  StoredResponse::json(
    500,
    &json!({
      "error": "Worker Error",
      "message": message,
      "timestamp": Utc::now().to_rfc3339(),
    }),
  )
  .with_header(SERVED_FROM, "error-response")
}
