//! Process-local cache
//!
//! Entries live in a sharded concurrent map. Add and replace check their
//! precondition and write under the same shard lock, so two racing adds on an
//! absent key cannot both succeed. Counter updates run under a lock owned by
//! the cache instance and commit through an optimistic version check, so plain
//! writes racing a counter update are never lost either.

use crate::cache_trait::{Cache, FlushableCache};
use crate::entry::CacheEntry;
use crate::eviction::EvictionIndex;
use crate::expiration::Expiration;
use crate::pattern::KeyPattern;
use crate::statistics::{CacheStatistics, Counter};
use crate::task::BackgroundTask;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tiercache_conf::LocalSettings;
use tiercache_exception::{Error, Result};
use tokio::sync::Mutex;

/// Precondition checked atomically with a local write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
	Always,
	IfAbsent,
	IfPresent,
	IfVersion(u64),
}

#[derive(Debug, Default)]
struct LocalCounters {
	hits: Counter,
	misses: Counter,
	evictions: Counter,
}

/// Process-local cache backend
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct LocalCache {
	store: Arc<DashMap<String, CacheEntry>>,
	index: Arc<SyncMutex<EvictionIndex>>,
	version: Arc<AtomicU64>,
	counter_lock: Arc<Mutex<()>>,
	counters: Arc<LocalCounters>,
	max_entries: Option<usize>,
	default_expiration: Option<Duration>,
}

impl LocalCache {
	/// Create an unbounded cache whose entries never expire by default
	///
	/// # Examples
	///
	/// ```
	/// use tiercache_cache::LocalCache;
	///
	/// let cache = LocalCache::new();
	/// assert!(cache.is_empty());
	/// ```
	pub fn new() -> Self {
		Self {
			store: Arc::new(DashMap::new()),
			index: Arc::new(SyncMutex::new(EvictionIndex::default())),
			version: Arc::new(AtomicU64::new(0)),
			counter_lock: Arc::new(Mutex::new(())),
			counters: Arc::new(LocalCounters::default()),
			max_entries: None,
			default_expiration: None,
		}
	}

	/// Create a cache from settings
	pub fn from_settings(settings: &LocalSettings) -> Self {
		let mut cache = Self::new();
		cache.max_entries = settings.max_entries;
		cache.default_expiration = settings.default_expiration();
		cache
	}

	/// Bound the number of entries
	///
	/// Once a write pushes the cache over the bound, expired entries are
	/// dropped first, then the least recently set ones.
	///
	/// # Examples
	///
	/// ```
	/// use tiercache_cache::{Cache, LocalCache};
	///
	/// # async fn example() {
	/// let cache = LocalCache::new().with_max_entries(2);
	///
	/// cache.set("a", &1, None).await.unwrap();
	/// cache.set("b", &2, None).await.unwrap();
	/// cache.set("c", &3, None).await.unwrap();
	///
	/// assert_eq!(cache.len(), 2);
	/// assert_eq!(cache.get::<i32>("a").await.unwrap(), None);
	/// # }
	/// ```
	pub fn with_max_entries(mut self, max_entries: usize) -> Self {
		self.max_entries = Some(max_entries);
		self
	}

	/// Set the expiration used when a write does not specify one
	pub fn with_default_expiration(mut self, expiration: Duration) -> Self {
		self.default_expiration = Some(expiration);
		self
	}

	pub fn max_entries(&self) -> Option<usize> {
		self.max_entries
	}

	fn next_version(&self) -> u64 {
		self.version.fetch_add(1, Ordering::Relaxed) + 1
	}

	// The index lock is only ever taken after a map shard lock, never before

	fn track(&self, key: &str, entry: &CacheEntry) {
		self.index.lock().track(key, entry.version, entry.expires_at);
	}

	fn forget(&self, entry: &CacheEntry) {
		self.index.lock().forget(entry.version);
	}

	fn discard(&self, removed: Option<(String, CacheEntry)>) -> Option<CacheEntry> {
		removed.map(|(_, entry)| {
			self.forget(&entry);
			entry
		})
	}

	fn resolve(&self, expiration: Option<Expiration>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
		Expiration::or_default(expiration, self.default_expiration).deadline(now)
	}

	/// Write serialized bytes if `mode` allows it, returning the new version
	///
	/// A deadline already in the past removes the entry instead (when the
	/// precondition holds) and reports no write.
	fn write(
		&self,
		key: &str,
		value: Vec<u8>,
		expires_at: Option<DateTime<Utc>>,
		mode: WriteMode,
		now: DateTime<Utc>,
	) -> Option<u64> {
		let elapsed = expires_at.is_some_and(|at| at <= now);

		let written = match self.store.entry(key.to_string()) {
			Entry::Occupied(mut occupied) => {
				let current = occupied.get();
				let live = !current.is_expired_at(now);
				let allowed = match mode {
					WriteMode::Always => true,
					WriteMode::IfAbsent => !live,
					WriteMode::IfPresent => live,
					WriteMode::IfVersion(expected) => live && current.version == expected,
				};

				if !allowed {
					None
				} else if elapsed {
					let removed = occupied.remove();
					self.forget(&removed);
					None
				} else {
					let version = self.next_version();
					let entry = CacheEntry::new(value, expires_at, version);
					self.track(key, &entry);
					let previous = occupied.insert(entry);
					self.forget(&previous);
					Some(version)
				}
			}
			Entry::Vacant(vacant) => {
				let allowed = matches!(mode, WriteMode::Always | WriteMode::IfAbsent);
				if !allowed || elapsed {
					None
				} else {
					let version = self.next_version();
					let entry = CacheEntry::new(value, expires_at, version);
					self.track(key, &entry);
					vacant.insert(entry);
					Some(version)
				}
			}
		};

		if written.is_some() {
			self.enforce_capacity(key, now);
		}
		written
	}

	fn write_value<T>(
		&self,
		key: &str,
		value: &T,
		expiration: Option<Expiration>,
		mode: WriteMode,
	) -> Result<Option<u64>>
	where
		T: Serialize + ?Sized,
	{
		let bytes = serde_json::to_vec(value)?;
		let now = Utc::now();
		let expires_at = self.resolve(expiration, now);
		Ok(self.write(key, bytes, expires_at, mode, now))
	}

	/// Evict until the bound holds: expired entries first, then the least
	/// recently set, never the entry just written
	fn enforce_capacity(&self, just_written: &str, now: DateTime<Utc>) {
		let Some(max_entries) = self.max_entries else {
			return;
		};

		while self.store.len() > max_entries {
			let victim = {
				let mut index = self.index.lock();
				index
					.pop_expired(now)
					.or_else(|| index.pop_oldest(just_written))
			};
			let Some((key, version)) = victim else {
				self.evict_untracked(just_written, max_entries);
				return;
			};

			if self
				.store
				.remove_if(&key, |_, entry| entry.version == version)
				.is_some()
			{
				self.counters.evictions.incr();
				tracing::debug!(key = %key, version, "evicted local entry over capacity");
			}
		}
	}

	/// Slow path for entries written concurrently with `clear`, which the
	/// index may have lost
	fn evict_untracked(&self, just_written: &str, max_entries: usize) {
		while self.store.len() > max_entries {
			let oldest = self
				.store
				.iter()
				.filter(|entry| entry.key() != just_written)
				.min_by_key(|entry| entry.value().version)
				.map(|entry| entry.key().clone());
			let Some(key) = oldest else {
				break;
			};
			if self.discard(self.store.remove(&key)).is_some() {
				self.counters.evictions.incr();
			}
		}
	}

	/// Live value bytes and version, dropping the entry if it has expired
	fn snapshot(&self, key: &str, now: DateTime<Utc>) -> Option<(Vec<u8>, u64, Option<DateTime<Utc>>)> {
		let (live, expired) = match self.store.get(key) {
			Some(entry) if !entry.is_expired_at(now) => (
				Some((entry.value.clone(), entry.version, entry.expires_at)),
				false,
			),
			Some(_) => (None, true),
			None => (None, false),
		};

		if expired {
			self.discard(self.store.remove_if(key, |_, entry| entry.is_expired_at(now)));
		}
		live
	}

	/// Current version of a live entry
	pub fn version(&self, key: &str) -> Option<u64> {
		self.snapshot(key, Utc::now()).map(|(_, version, _)| version)
	}

	/// Write only if the stored version still equals `expected_version`
	///
	/// Returns `false` without modifying anything when the entry changed
	/// (or disappeared) since the caller observed it.
	///
	/// # Examples
	///
	/// ```
	/// use tiercache_cache::{Cache, LocalCache};
	///
	/// # async fn example() {
	/// let cache = LocalCache::new();
	/// cache.set("doc", &"v1", None).await.unwrap();
	/// let seen = cache.version("doc").unwrap();
	///
	/// cache.set("doc", &"v2", None).await.unwrap();
	///
	/// // Another writer got there first
	/// assert!(!cache.set_if_version("doc", &"v3", None, seen).unwrap());
	/// assert_eq!(cache.get::<String>("doc").await.unwrap().as_deref(), Some("v2"));
	/// # }
	/// ```
	pub fn set_if_version<T>(
		&self,
		key: &str,
		value: &T,
		expiration: Option<Expiration>,
		expected_version: u64,
	) -> Result<bool>
	where
		T: Serialize + ?Sized,
	{
		Ok(self
			.write_value(key, value, expiration, WriteMode::IfVersion(expected_version))?
			.is_some())
	}

	/// Store a copy of an entry held elsewhere and return the version written
	///
	/// The copy expires at `bound` (the source entry's deadline, `None` when it
	/// never expires) or at the local default, whichever comes first.
	pub(crate) fn set_serialized(
		&self,
		key: &str,
		payload: Vec<u8>,
		bound: Option<DateTime<Utc>>,
	) -> Option<u64> {
		let now = Utc::now();
		let expires_at = match (self.resolve(None, now), bound) {
			(Some(local), Some(bound)) => Some(local.min(bound)),
			(local, bound) => local.or(bound),
		};
		self.write(key, payload, expires_at, WriteMode::Always, now)
	}

	/// Remove an entry only if it still holds `version`
	pub(crate) fn remove_if_version(&self, key: &str, version: u64) -> bool {
		self.discard(self.store.remove_if(key, |_, entry| entry.version == version))
			.is_some()
	}

	/// Remove a key whether or not it is live
	pub(crate) fn evict(&self, key: &str) {
		self.discard(self.store.remove(key));
	}

	/// Remove every key matching `pattern`
	///
	/// Works on a snapshot of the keys; entries written while the removal
	/// runs may survive. Returns the number of live entries removed.
	///
	/// # Examples
	///
	/// ```
	/// use tiercache_cache::{Cache, KeyPattern, LocalCache};
	///
	/// # async fn example() {
	/// let cache = LocalCache::new();
	/// cache.set("user:1", &"alice", None).await.unwrap();
	/// cache.set("user:2", &"bob", None).await.unwrap();
	/// cache.set("order:1", &17, None).await.unwrap();
	///
	/// let removed = cache.remove_by_pattern(&KeyPattern::glob("user:*").unwrap());
	/// assert_eq!(removed, 2);
	/// assert!(cache.exists("order:1").await.unwrap());
	/// # }
	/// ```
	pub fn remove_by_pattern(&self, pattern: &KeyPattern) -> usize {
		self.remove_matching(|key| pattern.matches(key))
	}

	/// Remove every key starting with `prefix`
	pub fn remove_by_prefix(&self, prefix: &str) -> usize {
		self.remove_matching(|key| key.starts_with(prefix))
	}

	fn remove_matching(&self, predicate: impl Fn(&str) -> bool) -> usize {
		let now = Utc::now();
		let keys: Vec<String> = self
			.store
			.iter()
			.filter(|entry| predicate(entry.key()))
			.map(|entry| entry.key().clone())
			.collect();

		let mut removed = 0;
		for key in keys {
			match self.discard(self.store.remove(&key)) {
				Some(entry) if !entry.is_expired_at(now) => removed += 1,
				Some(_) => {}
				None => {
					tracing::debug!(key = %key, "key vanished during bulk removal, skipping");
				}
			}
		}
		removed
	}

	/// Drop every expired entry
	///
	/// Reads already skip expired entries; this only reclaims memory.
	pub fn cleanup_expired(&self) -> usize {
		let now = Utc::now();
		let mut swept = Vec::new();
		self.store.retain(|_, entry| {
			let expired = entry.is_expired_at(now);
			if expired {
				swept.push(entry.version);
			}
			!expired
		});

		let mut index = self.index.lock();
		for version in &swept {
			index.forget(*version);
		}
		swept.len()
	}

	/// Start a background sweep of expired entries
	///
	/// The sweep stops when the returned handle is dropped.
	pub fn start_auto_cleanup(&self, interval: Duration) -> BackgroundTask {
		let cache = self.clone();
		BackgroundTask::new(tokio::spawn(async move {
			let mut interval_timer = tokio::time::interval(interval);
			loop {
				interval_timer.tick().await;
				let swept = cache.cleanup_expired();
				if swept > 0 {
					tracing::debug!(swept, "swept expired local entries");
				}
			}
		}))
	}

	/// Snapshot of the live keys
	pub fn keys(&self) -> Vec<String> {
		let now = Utc::now();
		self.store
			.iter()
			.filter(|entry| !entry.value().is_expired_at(now))
			.map(|entry| entry.key().clone())
			.collect()
	}

	/// Number of stored entries, including expired ones not yet swept
	pub fn len(&self) -> usize {
		self.store.len()
	}

	pub fn is_empty(&self) -> bool {
		self.store.is_empty()
	}

	/// Remove every entry
	pub fn clear(&self) {
		self.store.clear();
		self.index.lock().clear();
	}

	pub fn statistics(&self) -> CacheStatistics {
		let hits = self.counters.hits.get();
		let misses = self.counters.misses.get();
		CacheStatistics {
			hits,
			misses,
			total_requests: hits + misses,
			evictions: self.counters.evictions.get(),
			entry_count: self.store.len() as u64,
		}
	}
}

impl Default for LocalCache {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Cache for LocalCache {
	async fn add<T>(&self, key: &str, value: &T, expiration: Option<Expiration>) -> Result<bool>
	where
		T: Serialize + Send + Sync,
	{
		Ok(self
			.write_value(key, value, expiration, WriteMode::IfAbsent)?
			.is_some())
	}

	async fn set<T>(&self, key: &str, value: &T, expiration: Option<Expiration>) -> Result<bool>
	where
		T: Serialize + Send + Sync,
	{
		Ok(self
			.write_value(key, value, expiration, WriteMode::Always)?
			.is_some())
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
		Ok(self
			.write_value(key, value, expiration, WriteMode::IfPresent)?
			.is_some())
	}

	async fn get<T>(&self, key: &str) -> Result<Option<T>>
	where
		T: DeserializeOwned + Send,
	{
		match self.snapshot(key, Utc::now()) {
			Some((bytes, _, _)) => {
				self.counters.hits.incr();
				Ok(Some(serde_json::from_slice(&bytes)?))
			}
			None => {
				self.counters.misses.incr();
				Ok(None)
			}
		}
	}

	async fn exists(&self, key: &str) -> Result<bool> {
		Ok(self.snapshot(key, Utc::now()).is_some())
	}

	async fn remove(&self, key: &str) -> Result<bool> {
		let now = Utc::now();
		Ok(matches!(self.discard(self.store.remove(key)), Some(entry) if !entry.is_expired_at(now)))
	}

	async fn remove_all(&self, keys: &[&str]) -> Result<usize> {
		let now = Utc::now();
		Ok(keys
			.iter()
			.filter(|key| {
				matches!(self.discard(self.store.remove(**key)), Some(entry) if !entry.is_expired_at(now))
			})
			.count())
	}

	async fn increment(
		&self,
		key: &str,
		amount: i64,
		expiration: Option<Expiration>,
	) -> Result<i64> {
		let _guard = self.counter_lock.lock().await;

		loop {
			let now = Utc::now();
			if expiration.is_some_and(|exp| exp.is_elapsed(now)) {
				return Err(Error::InvalidArgument(format!(
					"expiration for counter '{}' has already elapsed",
					key
				)));
			}

			let (current, mode, existing_deadline) = match self.snapshot(key, now) {
				Some((bytes, version, expires_at)) => {
					let current: i64 = serde_json::from_slice(&bytes).map_err(|_| {
						Error::InvalidArgument(format!("value at '{}' is not an integer", key))
					})?;
					(current, WriteMode::IfVersion(version), Some(expires_at))
				}
				None => (0, WriteMode::IfAbsent, None),
			};

			let next = current.checked_add(amount).ok_or_else(|| {
				Error::InvalidArgument(format!("counter '{}' would overflow", key))
			})?;

			// An existing counter keeps its deadline unless a new one is given
			let expires_at = match (expiration, existing_deadline) {
				(Some(exp), _) => exp.deadline(now),
				(None, Some(existing)) => existing,
				(None, None) => self.resolve(None, now),
			};

			let bytes = serde_json::to_vec(&next)?;
			if self.write(key, bytes, expires_at, mode, now).is_some() {
				return Ok(next);
			}
			tracing::debug!(key = %key, "counter changed concurrently, retrying");
		}
	}

	async fn set_expiration(&self, key: &str, expiration: Expiration) -> Result<bool> {
		let now = Utc::now();
		let expires_at = expiration.deadline(now);

		if expiration.is_elapsed(now) {
			return Ok(self
				.discard(self.store.remove_if(key, |_, entry| !entry.is_expired_at(now)))
				.is_some());
		}

		match self.store.get_mut(key) {
			Some(mut entry) if !entry.is_expired_at(now) => {
				let previous = entry.version;
				entry.expires_at = expires_at;
				entry.version = self.next_version();

				let mut index = self.index.lock();
				index.forget(previous);
				index.track(key, entry.version, entry.expires_at);
				Ok(true)
			}
			_ => Ok(false),
		}
	}

	async fn get_expiration(&self, key: &str) -> Result<Option<Expiration>> {
		Ok(self
			.snapshot(key, Utc::now())
			.map(|(_, _, expires_at)| expires_at.map_or(Expiration::Never, Expiration::At)))
	}
}

#[async_trait]
impl FlushableCache for LocalCache {
	async fn flush_all(&self) -> Result<()> {
		self.clear();
		Ok(())
	}
}
