//! # tiercache-cache
//!
//! Two-tier key-value caching.
//!
//! ## Tiers
//!
//! - [`LocalCache`]: process-local cache with atomic add/replace, counters,
//!   expirations, versions and pattern removal
//! - [`RemoteCache`]: the same contract over a shared [`KeyValueStore`]
//! - [`HybridCache`]: local in front of remote, kept coherent across processes
//!   through an [`InvalidationBus`]
//!
//! ## Backends
//!
//! - [`MemoryStore`] / [`MemoryBus`]: in-process, for single-host deployments
//!   and tests
//! - `RedisStore` / `RedisBus`: Redis, behind the `redis-backend` feature
//!
//! ## Example
//!
//! ```
//! use tiercache_cache::{Cache, Expiration, LocalCache};
//! use std::time::Duration;
//!
//! # async fn example() -> tiercache_exception::Result<()> {
//! let cache = LocalCache::new();
//!
//! assert!(cache.add("lock:job-42", &"worker-1", Some(Expiration::In(Duration::from_secs(30)))).await?);
//! assert!(!cache.add("lock:job-42", &"worker-2", None).await?);
//!
//! assert_eq!(cache.increment("jobs:done", 1, None).await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod cache_trait;
mod entry;
mod eviction;
pub mod expiration;
pub mod hybrid;
pub mod invalidation;
pub mod local;
pub mod pattern;
pub mod remote;
pub mod statistics;
pub mod store;
pub mod task;

pub use cache_trait::{Cache, FlushableCache};
pub use expiration::Expiration;
pub use hybrid::HybridCache;
pub use invalidation::{InvalidationBus, InvalidationMessage, InvalidationStream, MemoryBus};
pub use local::LocalCache;
pub use pattern::KeyPattern;
pub use remote::RemoteCache;
pub use statistics::{CacheStatistics, HybridStatistics};
pub use store::{FlushableStore, KeyTtl, KeyValueStore, MemoryStore, SetCondition};
pub use task::BackgroundTask;

#[cfg(feature = "redis-backend")]
pub use invalidation::RedisBus;
#[cfg(feature = "redis-backend")]
pub use store::RedisStore;
