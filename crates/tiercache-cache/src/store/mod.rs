//! Shared key-value stores behind the remote tier
//!
//! A store holds serialized text values and exposes the handful of atomic
//! primitives the remote tier needs: conditional set, counters, expirations and
//! prefix deletes.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_backend;

pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use redis_backend::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use tiercache_exception::Result;

/// Precondition for [`KeyValueStore::set`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
	Always,
	/// Only write when the key does not exist (`NX`)
	IfNotExists,
	/// Only write when the key already exists (`XX`)
	IfExists,
}

/// Remaining time to live of a stored key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
	Missing,
	Persistent,
	Expires(Duration),
}

/// Shared key-value store visible to every process
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
	async fn get(&self, key: &str) -> Result<Option<String>>;

	/// Get several keys in one round trip, in the order requested
	async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>>;

	/// Write `value` if `condition` holds; `true` if the write happened
	async fn set(
		&self,
		key: &str,
		value: String,
		ttl: Option<Duration>,
		condition: SetCondition,
	) -> Result<bool>;

	async fn delete(&self, key: &str) -> Result<bool>;

	/// Delete several keys, returning how many existed
	async fn delete_many(&self, keys: &[&str]) -> Result<u64>;

	/// Delete every key starting with `prefix`, returning how many were deleted
	async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;

	async fn exists(&self, key: &str) -> Result<bool>;

	/// Set (`Some`) or clear (`None`) the time to live of an existing key
	///
	/// Returns `false` if the key does not exist.
	async fn expire(&self, key: &str, ttl: Option<Duration>) -> Result<bool>;

	async fn ttl(&self, key: &str) -> Result<KeyTtl>;

	/// Atomically add `delta` to the integer at `key`, treating absence as zero
	///
	/// `ttl` is applied only when this call creates the counter; an existing
	/// counter keeps its time to live.
	async fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64>;
}

/// Stores that allow dropping every key
#[async_trait]
pub trait FlushableStore: KeyValueStore {
	async fn flush(&self) -> Result<()>;
}
