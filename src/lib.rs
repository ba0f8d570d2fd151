//! Offline-first HTTP response cache, organized the way a PWA service
//! worker organizes its caches: requests are classified into categories,
//! each category has its own versioned store, freshness window, byte budget
//! and fetch strategy, and every failure path degrades to something the page
//! can render.

pub mod cache;
pub mod classify;
pub mod config;
pub mod fallback;
pub mod lifecycle;
pub mod mediator;
pub mod messages;
pub mod metrics;
pub mod net;
pub mod sync;
pub mod types;
pub mod worker;

#[cfg(test)]
mod testutil;

pub use cache::{CacheStorage, MemoryStorage, SqliteStorage, StoreError};
pub use classify::{CacheCategory, Classifier};
pub use config::WorkerConfig;
pub use mediator::FetchMediator;
pub use messages::{ClientMessage, WorkerEvent, WorkerReply};
pub use metrics::{MetricsReport, PerformanceMetrics};
pub use net::{FetchError, HttpClient, NetworkClient};
pub use types::{Method, Request, StoredResponse};
pub use worker::Worker;
