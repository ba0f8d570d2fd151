//! Versioned response stores with byte budgets and age-based eviction.
//!
//! One named store per cache category, tagged with the build version. The
//! storage backend is pluggable behind [`CacheStorage`]: SQLite for the real
//! worker, an in-memory map for tests and ephemeral use.

mod evict;
mod storage;
mod traits;

pub use evict::enforce_budget;
pub use storage::{MemoryStorage, SqliteStorage};
pub use traits::{CacheStorage, EntryMeta, StoreError};
