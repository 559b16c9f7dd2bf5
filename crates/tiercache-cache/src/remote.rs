//! Shared cache tier
//!
//! Values are serialized to JSON text and written to a [`KeyValueStore`] that
//! every process can see. Atomicity comes from the store's own conditional
//! writes and counters; the client takes no locks.

use crate::cache_trait::{Cache, FlushableCache};
use crate::expiration::{Expiration, Lifetime};
use crate::store::{FlushableStore, KeyTtl, KeyValueStore, SetCondition};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tiercache_exception::{Error, Result};

/// Cache over a shared key-value store
///
/// # Examples
///
/// ```
/// use tiercache_cache::{Cache, MemoryStore, RemoteCache};
///
/// # async fn example() {
/// let cache = RemoteCache::new(MemoryStore::new());
///
/// cache.set("greeting", &"hello", None).await.unwrap();
/// let value: Option<String> = cache.get("greeting").await.unwrap();
/// assert_eq!(value.as_deref(), Some("hello"));
/// # }
/// ```
pub struct RemoteCache<S> {
	store: Arc<S>,
	default_expiration: Option<Duration>,
}

impl<S> Clone for RemoteCache<S> {
	fn clone(&self) -> Self {
		Self {
			store: Arc::clone(&self.store),
			default_expiration: self.default_expiration,
		}
	}
}

impl<S: KeyValueStore> RemoteCache<S> {
	pub fn new(store: S) -> Self {
		Self::from_shared(Arc::new(store))
	}

	/// Create a cache over a store handle shared with other components
	pub fn from_shared(store: Arc<S>) -> Self {
		Self {
			store,
			default_expiration: None,
		}
	}

	/// Set the expiration used when a write does not specify one
	pub fn with_default_expiration(mut self, expiration: Duration) -> Self {
		self.default_expiration = Some(expiration);
		self
	}

	pub fn store(&self) -> &S {
		&self.store
	}

	/// Expiration applied to writes that do not specify one
	pub fn default_expiration(&self) -> Option<Duration> {
		self.default_expiration
	}

	fn lifetime(&self, expiration: Option<Expiration>) -> Lifetime {
		Expiration::or_default(expiration, self.default_expiration).lifetime(Utc::now())
	}

	async fn write<T>(
		&self,
		key: &str,
		value: &T,
		expiration: Option<Expiration>,
		condition: SetCondition,
	) -> Result<bool>
	where
		T: Serialize + Sync + ?Sized,
	{
		let payload = serde_json::to_string(value)?;
		let ttl = match self.lifetime(expiration) {
			Lifetime::Unbounded => None,
			Lifetime::For(ttl) => Some(ttl),
			Lifetime::Elapsed => {
				// The value would be absent on arrival
				if condition != SetCondition::IfNotExists {
					self.store.delete(key).await?;
				}
				return Ok(false);
			}
		};
		self.store.set(key, payload, ttl, condition).await
	}

	/// Remove every key starting with `prefix`
	pub async fn remove_by_prefix(&self, prefix: &str) -> Result<u64> {
		self.store.delete_by_prefix(prefix).await
	}

	/// Raw JSON payload of a key, `None` when absent or empty
	pub(crate) async fn get_payload(&self, key: &str) -> Result<Option<String>> {
		Ok(self
			.store
			.get(key)
			.await?
			.filter(|payload| !payload.is_empty()))
	}
}

fn decode<T: DeserializeOwned>(payload: String) -> Result<Option<T>> {
	if payload.is_empty() {
		return Ok(None);
	}
	Ok(Some(serde_json::from_str(&payload)?))
}

#[async_trait]
impl<S: KeyValueStore> Cache for RemoteCache<S> {
	async fn add<T>(&self, key: &str, value: &T, expiration: Option<Expiration>) -> Result<bool>
	where
		T: Serialize + Send + Sync,
	{
		self.write(key, value, expiration, SetCondition::IfNotExists)
			.await
	}

	async fn set<T>(&self, key: &str, value: &T, expiration: Option<Expiration>) -> Result<bool>
	where
		T: Serialize + Send + Sync,
	{
		self.write(key, value, expiration, SetCondition::Always)
			.await
	}

	async fn replace<T>(
		&self,
		key: &str,
		value: &T,
		expiration: Option<Expiration>,
	) -> Result<bool>
	where
		T: Serialize + Send + Sync,
	{
		self.write(key, value, expiration, SetCondition::IfExists)
			.await
	}

	async fn get<T>(&self, key: &str) -> Result<Option<T>>
	where
		T: DeserializeOwned + Send,
	{
		match self.get_payload(key).await? {
			Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
			None => Ok(None),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool> {
		self.store.exists(key).await
	}

	async fn remove(&self, key: &str) -> Result<bool> {
		self.store.delete(key).await
	}

	async fn remove_all(&self, keys: &[&str]) -> Result<usize> {
		match self.store.delete_many(keys).await {
			Ok(deleted) => Ok(deleted as usize),
			Err(e) => {
				tracing::warn!(error = %e, "batch delete failed, removing keys one by one");
				let mut removed = 0;
				for key in keys {
					match self.store.delete(key).await {
						Ok(true) => removed += 1,
						Ok(false) => {}
						Err(e) => {
							tracing::warn!(key = %key, error = %e, "failed to remove key, continuing");
						}
					}
				}
				Ok(removed)
			}
		}
	}

	async fn increment(
		&self,
		key: &str,
		amount: i64,
		expiration: Option<Expiration>,
	) -> Result<i64> {
		let Some(explicit) = expiration else {
			return self
				.store
				.incr_by(key, amount, self.default_expiration)
				.await;
		};

		match explicit.lifetime(Utc::now()) {
			Lifetime::Elapsed => Err(Error::InvalidArgument(format!(
				"expiration for counter '{}' has already elapsed",
				key
			))),
			Lifetime::For(ttl) => {
				let value = self.store.incr_by(key, amount, Some(ttl)).await?;
				self.store.expire(key, Some(ttl)).await?;
				Ok(value)
			}
			Lifetime::Unbounded => {
				let value = self.store.incr_by(key, amount, None).await?;
				self.store.expire(key, None).await?;
				Ok(value)
			}
		}
	}

	async fn get_all<T>(&self, keys: &[&str]) -> Result<HashMap<String, T>>
	where
		T: DeserializeOwned + Send,
	{
		let payloads = self.store.get_many(keys).await?;

		let mut results = HashMap::with_capacity(keys.len());
		for (key, payload) in keys.iter().zip(payloads) {
			if let Some(value) = payload.map(decode::<T>).transpose()?.flatten() {
				results.insert((*key).to_string(), value);
			}
		}
		Ok(results)
	}

	async fn set_expiration(&self, key: &str, expiration: Expiration) -> Result<bool> {
		match expiration.lifetime(Utc::now()) {
			Lifetime::Elapsed => self.store.delete(key).await,
			Lifetime::For(ttl) => self.store.expire(key, Some(ttl)).await,
			Lifetime::Unbounded => self.store.expire(key, None).await,
		}
	}

	async fn get_expiration(&self, key: &str) -> Result<Option<Expiration>> {
		Ok(match self.store.ttl(key).await? {
			KeyTtl::Missing => None,
			KeyTtl::Persistent => Some(Expiration::Never),
			KeyTtl::Expires(remaining) => {
				let remaining = TimeDelta::from_std(remaining)
					.map_err(|e| Error::Backend(format!("Invalid remaining TTL: {}", e)))?;
				Some(Expiration::At(Utc::now() + remaining))
			}
		})
	}
}

#[async_trait]
impl<S: FlushableStore> FlushableCache for RemoteCache<S> {
	async fn flush_all(&self) -> Result<()> {
		self.store.flush().await
	}
}
