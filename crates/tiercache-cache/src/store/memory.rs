//! In-process shared store

use super::{FlushableStore, KeyTtl, KeyValueStore, SetCondition};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiercache_exception::{Error, Result};

#[derive(Debug, Clone)]
struct StoredValue {
	value: String,
	expires_at: Option<Instant>,
}

impl StoredValue {
	fn new(value: String, ttl: Option<Duration>, now: Instant) -> Self {
		Self {
			value,
			expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
		}
	}

	fn is_expired_at(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

/// Key-value store living in the current process
///
/// Clones share the same data, so several caches built over clones of one
/// store behave like separate processes sharing a server.
///
/// # Examples
///
/// ```
/// use tiercache_cache::{KeyValueStore, MemoryStore, SetCondition};
///
/// # async fn example() {
/// let store = MemoryStore::new();
/// let peer = store.clone();
///
/// store.set("k", "1".to_string(), None, SetCondition::Always).await.unwrap();
/// assert_eq!(peer.get("k").await.unwrap().as_deref(), Some("1"));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	data: Arc<DashMap<String, StoredValue>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored keys, expired ones included
	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	fn live(&self, key: &str, now: Instant) -> Option<StoredValue> {
		let (live, expired) = match self.data.get(key) {
			Some(stored) if !stored.is_expired_at(now) => (Some(stored.clone()), false),
			Some(_) => (None, true),
			None => (None, false),
		};
		if expired {
			self.data.remove_if(key, |_, stored| stored.is_expired_at(now));
		}
		live
	}
}

#[async_trait]
impl KeyValueStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<String>> {
		Ok(self.live(key, Instant::now()).map(|stored| stored.value))
	}

	async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
		let now = Instant::now();
		Ok(keys
			.iter()
			.map(|key| self.live(key, now).map(|stored| stored.value))
			.collect())
	}

	async fn set(
		&self,
		key: &str,
		value: String,
		ttl: Option<Duration>,
		condition: SetCondition,
	) -> Result<bool> {
		let now = Instant::now();
		match self.data.entry(key.to_string()) {
			Entry::Occupied(mut occupied) => {
				let live = !occupied.get().is_expired_at(now);
				if condition == SetCondition::IfNotExists && live {
					return Ok(false);
				}
				if condition == SetCondition::IfExists && !live {
					return Ok(false);
				}
				occupied.insert(StoredValue::new(value, ttl, now));
				Ok(true)
			}
			Entry::Vacant(vacant) => {
				if condition == SetCondition::IfExists {
					return Ok(false);
				}
				vacant.insert(StoredValue::new(value, ttl, now));
				Ok(true)
			}
		}
	}

	async fn delete(&self, key: &str) -> Result<bool> {
		let now = Instant::now();
		Ok(matches!(self.data.remove(key), Some((_, stored)) if !stored.is_expired_at(now)))
	}

	async fn delete_many(&self, keys: &[&str]) -> Result<u64> {
		let mut deleted = 0;
		for key in keys {
			if self.delete(key).await? {
				deleted += 1;
			}
		}
		Ok(deleted)
	}

	async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
		let now = Instant::now();
		let mut deleted = 0;
		self.data.retain(|key, stored| {
			if !key.starts_with(prefix) {
				return true;
			}
			if !stored.is_expired_at(now) {
				deleted += 1;
			}
			false
		});
		Ok(deleted)
	}

	async fn exists(&self, key: &str) -> Result<bool> {
		Ok(self.live(key, Instant::now()).is_some())
	}

	async fn expire(&self, key: &str, ttl: Option<Duration>) -> Result<bool> {
		let now = Instant::now();
		match self.data.get_mut(key) {
			Some(mut stored) if !stored.is_expired_at(now) => {
				stored.expires_at = ttl.and_then(|ttl| now.checked_add(ttl));
				Ok(true)
			}
			_ => Ok(false),
		}
	}

	async fn ttl(&self, key: &str) -> Result<KeyTtl> {
		let now = Instant::now();
		Ok(match self.live(key, now) {
			None => KeyTtl::Missing,
			Some(StoredValue {
				expires_at: None, ..
			}) => KeyTtl::Persistent,
			Some(StoredValue {
				expires_at: Some(at),
				..
			}) => KeyTtl::Expires(at.saturating_duration_since(now)),
		})
	}

	async fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64> {
		let now = Instant::now();
		let mut entry = self
			.data
			.entry(key.to_string())
			.or_insert_with(|| StoredValue::new("0".to_string(), ttl, now));

		if entry.is_expired_at(now) {
			*entry = StoredValue::new("0".to_string(), ttl, now);
		}

		let current: i64 = entry.value.trim().parse().map_err(|_| {
			Error::InvalidArgument(format!("value at '{}' is not an integer", key))
		})?;
		let next = current.checked_add(delta).ok_or_else(|| {
			Error::InvalidArgument(format!("counter '{}' would overflow", key))
		})?;
		entry.value = next.to_string();
		Ok(next)
	}
}

#[async_trait]
impl FlushableStore for MemoryStore {
	async fn flush(&self) -> Result<()> {
		self.data.clear();
		Ok(())
	}
}
