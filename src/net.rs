//! Network boundary: bounded fetches with an explicit failure taxonomy.
//!
//! Every network attempt carries a hard deadline. A timeout is
//! indistinguishable from any other failure to the caller: the mediator
//! falls through to cache or fallback either way, it just gets to log why.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use thiserror::Error;

use crate::types::{Method, Request, StoredResponse};

/// Why a network attempt failed. Non-2xx statuses count as failures here
/// because the cache never stores or forwards them; they route to
/// cache-then-fallback like any other error.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
  #[error("network timeout after {0:?}")]
  Timeout(Duration),
  #[error("transport error: {0}")]
  Transport(String),
  #[error("http status {0}")]
  HttpStatus(u16),
  #[error("failed to read response body: {0}")]
  BodyRead(String),
}

impl FetchError {
  pub fn is_timeout(&self) -> bool {
    matches!(self, FetchError::Timeout(_))
  }
}

/// The seam between the cache pipeline and the real network. The worker uses
/// [`HttpClient`]; tests substitute a programmable fake.
#[async_trait]
pub trait NetworkClient: Send + Sync {
  /// Fetch a request with a hard deadline. Succeeds only with a fully read
  /// 2xx response, so partial bodies can never reach a cache store.
  async fn fetch(&self, request: &Request, timeout: Duration) -> Result<StoredResponse, FetchError>;
}

/// reqwest-backed client. Timeouts are enforced per call rather than on the
/// client so each category can use its own window.
pub struct HttpClient {
  client: reqwest::Client,
}

impl HttpClient {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl NetworkClient for HttpClient {
  async fn fetch(&self, request: &Request, timeout: Duration) -> Result<StoredResponse, FetchError> {
    let attempt = async {
      let method = match &request.method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Other(name) => reqwest::Method::from_bytes(name.as_bytes())
          .map_err(|_| FetchError::Transport(format!("invalid http method: {name}")))?,
      };
      let mut builder = self.client.request(method, request.url.clone());

      if let Some(body) = &request.body {
        builder = builder.body(body.clone());
      }

      // Bypass intermediary caches; this worker is the cache.
      builder = builder.header("Cache-Control", "no-cache");

      let response = builder
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

      let status = response.status().as_u16();
      if !response.status().is_success() {
        return Err(FetchError::HttpStatus(status));
      }

      let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(name, value)| {
          (
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
          )
        })
        .collect();

      let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::BodyRead(e.to_string()))?;

      Ok(StoredResponse::new(status, headers, body.to_vec()))
    };

    match tokio::time::timeout(timeout, attempt).await {
      Ok(result) => result,
      Err(_) => Err(FetchError::Timeout(timeout)),
    }
  }
}
