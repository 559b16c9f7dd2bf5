//! Cache contract shared by the local, remote and hybrid tiers

use crate::expiration::Expiration;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tiercache_exception::{Error, Result};

/// Key-value cache with compare-and-insert semantics
///
/// Misses are not errors: `get` returns `Ok(None)` and a failed `add` or
/// `replace` precondition returns `Ok(false)`. Errors are reserved for
/// serialization and backing-store failures.
///
/// An `expiration` of `None` applies the implementation's default policy.
#[async_trait]
pub trait Cache: Send + Sync {
	/// Store `value` only if `key` is absent or expired
	async fn add<T>(&self, key: &str, value: &T, expiration: Option<Expiration>) -> Result<bool>
	where
		T: Serialize + Send + Sync;

	/// Store `value` unconditionally
	async fn set<T>(&self, key: &str, value: &T, expiration: Option<Expiration>) -> Result<bool>
	where
		T: Serialize + Send + Sync;

	/// Store `value` only if a live entry already exists for `key`
	async fn replace<T>(
		&self,
		key: &str,
		value: &T,
		expiration: Option<Expiration>,
	) -> Result<bool>
	where
		T: Serialize + Send + Sync;

	/// Get a value, `None` when absent or expired
	async fn get<T>(&self, key: &str) -> Result<Option<T>>
	where
		T: DeserializeOwned + Send;

	/// Get a value, or the type's default when absent or expired
	async fn get_or_default<T>(&self, key: &str) -> Result<T>
	where
		T: DeserializeOwned + Default + Send,
	{
		Ok(self.get::<T>(key).await?.unwrap_or_default())
	}

	/// Whether a live entry exists for `key`
	async fn exists(&self, key: &str) -> Result<bool>;

	/// Remove an entry; `true` if a live entry was removed
	async fn remove(&self, key: &str) -> Result<bool>;

	/// Remove several entries, continuing past per-key failures
	///
	/// Returns the number of live entries removed.
	async fn remove_all(&self, keys: &[&str]) -> Result<usize> {
		let mut removed = 0;
		for key in keys {
			match self.remove(key).await {
				Ok(true) => removed += 1,
				Ok(false) => {}
				Err(e) => {
					tracing::warn!(key = %key, error = %e, "failed to remove key, continuing");
				}
			}
		}
		Ok(removed)
	}

	/// Atomically add `amount` to the integer at `key` (absent counts as zero)
	async fn increment(&self, key: &str, amount: i64, expiration: Option<Expiration>)
	-> Result<i64>;

	/// Atomically subtract `amount` from the integer at `key`
	async fn decrement(
		&self,
		key: &str,
		amount: i64,
		expiration: Option<Expiration>,
	) -> Result<i64> {
		let negated = amount.checked_neg().ok_or_else(|| {
			Error::InvalidArgument(format!("cannot decrement by {}", amount))
		})?;
		self.increment(key, negated, expiration).await
	}

	/// Get several values; missing keys are omitted from the result
	async fn get_all<T>(&self, keys: &[&str]) -> Result<HashMap<String, T>>
	where
		T: DeserializeOwned + Send,
	{
		let mut results = HashMap::with_capacity(keys.len());
		for key in keys {
			if let Some(value) = self.get::<T>(key).await? {
				results.insert((*key).to_string(), value);
			}
		}
		Ok(results)
	}

	/// Store several values; no atomicity across keys
	///
	/// Returns the number of values stored.
	async fn set_all<T>(
		&self,
		values: HashMap<String, T>,
		expiration: Option<Expiration>,
	) -> Result<usize>
	where
		T: Serialize + Send + Sync,
	{
		let mut stored = 0;
		for (key, value) in &values {
			if self.set(key, value, expiration).await? {
				stored += 1;
			}
		}
		Ok(stored)
	}

	/// Change the expiration of a live entry; `false` if the key is absent
	async fn set_expiration(&self, key: &str, expiration: Expiration) -> Result<bool>;

	/// Current expiration of a live entry, `None` if the key is absent
	async fn get_expiration(&self, key: &str) -> Result<Option<Expiration>>;
}

/// Caches that can drop every entry they manage
///
/// Kept separate from [`Cache`] because shared stores do not all expose a
/// flush; those backends simply do not implement this trait.
#[async_trait]
pub trait FlushableCache: Cache {
	/// Remove every entry this instance manages
	async fn flush_all(&self) -> Result<()>;
}
