//! # tiercache
//!
//! A two-tier (process-local + shared) key-value cache for Rust.
//!
//! Applications put a [`HybridCache`] in front of a shared store to avoid
//! round trips on repeated reads. Each process keeps a local copy; writes go to
//! the shared store and broadcast an invalidation so every other process drops
//! its copy.
//!
//! ## Feature Flags
//!
//! - `redis-backend` - `RedisStore` and `RedisBus`
//! - `conf` - settings loading from TOML files and `TIERCACHE_*` environment variables
//! - `full` (default) - All features enabled
//!
//! ## Quick Start
//!
//! ```
//! use tiercache::{Cache, Expiration, HybridCache, LocalCache, MemoryBus, MemoryStore, RemoteCache};
//! use std::time::Duration;
//!
//! # async fn example() -> tiercache::Result<()> {
//! let cache = HybridCache::new(
//!     LocalCache::new().with_max_entries(10_000),
//!     RemoteCache::new(MemoryStore::new()),
//!     MemoryBus::new(),
//! )
//! .await?;
//!
//! cache.set("user:42", &"alice", Some(Expiration::In(Duration::from_secs(300)))).await?;
//! let name: Option<String> = cache.get("user:42").await?;
//! assert_eq!(name.as_deref(), Some("alice"));
//! # Ok(())
//! # }
//! ```
//!
//! With Redis and settings from the environment:
//!
//! ```no_run
//! use tiercache::conf::CacheSettings;
//! use tiercache::{HybridCache, RedisBus, RedisStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = CacheSettings::load(None)?;
//! let cache = HybridCache::with_settings(
//!     RedisStore::from_settings(&settings.remote)?,
//!     RedisBus::from_settings(&settings)?,
//!     &settings,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub use tiercache_cache::*;
pub use tiercache_exception::{Error, Result};

#[cfg(feature = "conf")]
pub use tiercache_conf as conf;
