//! Hybrid cache - local tier in front of a shared tier
//!
//! Provides a two-level caching strategy: a [`LocalCache`] answers repeated
//! reads without a round trip, while a [`RemoteCache`] is the authority shared
//! by every process.
//!
//! # Coherence
//!
//! - **Reads** try the local tier first. On a miss the remote value is returned
//!   and copied into the local tier with the remote expiration.
//! - **Writes** go to the remote tier, then drop the local copy before
//!   returning, then publish an [`InvalidationMessage`] so peers drop theirs.
//!   Peers never receive values, only invalidations.
//! - **Invalidations** from peers remove local copies. A remote read that
//!   overlaps an invalidation does not leave its (possibly stale) copy behind.
//!
//! # Examples
//!
//! ```
//! use tiercache_cache::{Cache, HybridCache, LocalCache, MemoryBus, MemoryStore, RemoteCache};
//!
//! # async fn example() -> tiercache_exception::Result<()> {
//! let store = MemoryStore::new();
//! let bus = MemoryBus::new();
//!
//! // Two instances sharing a store and a bus, as two processes would
//! let a = HybridCache::new(LocalCache::new(), RemoteCache::new(store.clone()), bus.clone()).await?;
//! let b = HybridCache::new(LocalCache::new(), RemoteCache::new(store), bus).await?;
//!
//! a.set("user:1", &"alice", None).await?;
//! let name: Option<String> = b.get("user:1").await?;
//! assert_eq!(name.as_deref(), Some("alice"));
//! # Ok(())
//! # }
//! ```

use crate::cache_trait::{Cache, FlushableCache};
use crate::expiration::Expiration;
use crate::invalidation::{InvalidationBus, InvalidationMessage, InvalidationStream};
use crate::local::LocalCache;
use crate::remote::RemoteCache;
use crate::statistics::{Counter, HybridStatistics};
use crate::store::{FlushableStore, KeyValueStore};
use crate::task::BackgroundTask;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tiercache_conf::CacheSettings;
use tiercache_exception::Result;
use uuid::Uuid;

#[derive(Debug, Default)]
struct HybridCounters {
	remote_hits: Counter,
	misses: Counter,
	invalidations_received: Counter,
	invalidations_published: Counter,
	publish_failures: Counter,
}

/// Two-tier cache kept coherent across processes by an invalidation bus
///
/// Clones share both tiers and the listener. The listener stops when the last
/// clone is dropped or [`HybridCache::shutdown`] is called.
///
/// # Type Parameters
///
/// - `S`: Shared store behind the remote tier (typically `RedisStore`)
/// - `B`: Invalidation bus (typically `RedisBus`)
pub struct HybridCache<S, B> {
	local: LocalCache,
	remote: RemoteCache<S>,
	bus: Arc<B>,
	instance_id: Uuid,
	generation: Arc<AtomicU64>,
	counters: Arc<HybridCounters>,
	listener: Arc<BackgroundTask>,
	cleanup: Option<Arc<BackgroundTask>>,
}

impl<S, B> Clone for HybridCache<S, B> {
	fn clone(&self) -> Self {
		Self {
			local: self.local.clone(),
			remote: self.remote.clone(),
			bus: Arc::clone(&self.bus),
			instance_id: self.instance_id,
			generation: Arc::clone(&self.generation),
			counters: Arc::clone(&self.counters),
			listener: Arc::clone(&self.listener),
			cleanup: self.cleanup.clone(),
		}
	}
}

impl<S, B> HybridCache<S, B>
where
	S: KeyValueStore,
	B: InvalidationBus,
{
	/// Compose the two tiers and start listening for invalidations
	///
	/// The subscription is active when this returns, so no invalidation
	/// published afterwards is missed.
	pub async fn new(local: LocalCache, remote: RemoteCache<S>, bus: B) -> Result<Self> {
		let bus = Arc::new(bus);
		let stream = bus.subscribe().await?;

		let instance_id = Uuid::new_v4();
		let generation = Arc::new(AtomicU64::new(0));
		let counters = Arc::new(HybridCounters::default());

		let listener = BackgroundTask::new(tokio::spawn(listen(
			stream,
			local.clone(),
			instance_id,
			Arc::clone(&generation),
			Arc::clone(&counters),
			bus.topic().to_string(),
		)));

		tracing::info!(
			instance_id = %instance_id,
			topic = %bus.topic(),
			"hybrid cache listening for invalidations"
		);

		Ok(Self {
			local,
			remote,
			bus,
			instance_id,
			generation,
			counters,
			listener: Arc::new(listener),
			cleanup: None,
		})
	}

	/// Build both tiers from settings over an existing store and bus
	///
	/// Starts the local expiry sweep when a cleanup interval is configured.
	pub async fn with_settings(store: S, bus: B, settings: &CacheSettings) -> Result<Self> {
		if bus.topic() != settings.invalidation.topic {
			tracing::warn!(
				bus_topic = %bus.topic(),
				configured_topic = %settings.invalidation.topic,
				"invalidation bus topic differs from settings"
			);
		}

		let local = LocalCache::from_settings(&settings.local);
		let mut remote = RemoteCache::new(store);
		if let Some(expiration) = settings.remote.default_expiration() {
			remote = remote.with_default_expiration(expiration);
		}

		let mut cache = Self::new(local, remote, bus).await?;
		cache.cleanup = settings
			.local
			.cleanup_interval()
			.map(|interval| Arc::new(cache.local.start_auto_cleanup(interval)));
		Ok(cache)
	}

	/// Identifier stamped on every invalidation this instance publishes
	pub fn instance_id(&self) -> Uuid {
		self.instance_id
	}

	pub fn local(&self) -> &LocalCache {
		&self.local
	}

	pub fn remote(&self) -> &RemoteCache<S> {
		&self.remote
	}

	pub fn bus(&self) -> &B {
		&self.bus
	}

	/// Stop applying invalidations from peers
	///
	/// Local copies may go stale afterwards; intended for shutdown only.
	pub fn shutdown(&self) {
		self.listener.abort();
		if let Some(cleanup) = &self.cleanup {
			cleanup.abort();
		}
	}

	pub fn statistics(&self) -> HybridStatistics {
		HybridStatistics {
			local: self.local.statistics(),
			remote_hits: self.counters.remote_hits.get(),
			misses: self.counters.misses.get(),
			invalidations_received: self.counters.invalidations_received.get(),
			invalidations_published: self.counters.invalidations_published.get(),
			publish_failures: self.counters.publish_failures.get(),
		}
	}

	/// Drop local copies of `keys`
	///
	/// The generation bump comes first so an in-flight read that already
	/// fetched the old value discards its copy.
	fn invalidate_local<K: AsRef<str>>(&self, keys: &[K]) {
		self.generation.fetch_add(1, Ordering::SeqCst);
		for key in keys {
			self.local.evict(key.as_ref());
		}
	}

	async fn publish(&self, message: InvalidationMessage) {
		match self.bus.publish(&message).await {
			Ok(()) => self.counters.invalidations_published.incr(),
			Err(e) => {
				self.counters.publish_failures.incr();
				tracing::warn!(
					keys = ?message.keys,
					prefixes = ?message.prefixes,
					flush_all = message.flush_all,
					error = %e,
					"failed to publish invalidation, peers may serve stale entries until expiry"
				);
			}
		}
	}

	async fn publish_keys<K: AsRef<str>>(&self, keys: &[K]) {
		let message = InvalidationMessage::keys(
			self.instance_id,
			keys.iter().map(|key| key.as_ref().to_string()),
		);
		self.publish(message).await;
	}

	/// Copy a remote payload into the local tier unless an invalidation
	/// arrived since `observed` was read
	async fn populate(&self, key: &str, payload: Vec<u8>, observed: u64) {
		let bound = match self.remote.get_expiration(key).await {
			Ok(Some(expiration)) => expiration.deadline(Utc::now()),
			Ok(None) => return,
			Err(e) => {
				tracing::warn!(key = %key, error = %e, "failed to read remote expiration, not caching locally");
				return;
			}
		};

		if let Some(version) = self.local.set_serialized(key, payload, bound)
			&& self.generation.load(Ordering::SeqCst) != observed
		{
			self.local.remove_if_version(key, version);
			tracing::debug!(key = %key, "invalidation raced a remote read, dropped local copy");
		}
	}

	/// Remove every key starting with `prefix` from both tiers and from peers
	pub async fn remove_by_prefix(&self, prefix: &str) -> Result<u64> {
		let result = self.remote.remove_by_prefix(prefix).await;
		self.generation.fetch_add(1, Ordering::SeqCst);
		self.local.remove_by_prefix(prefix);
		let removed = result?;

		self.publish(InvalidationMessage::prefix(self.instance_id, prefix))
			.await;
		Ok(removed)
	}

	/// Drop every local copy on every instance, leaving the shared tier intact
	pub async fn flush_local(&self) {
		self.generation.fetch_add(1, Ordering::SeqCst);
		self.local.clear();
		self.publish(InvalidationMessage::flush_all(self.instance_id))
			.await;
	}
}

async fn listen(
	mut stream: InvalidationStream,
	local: LocalCache,
	instance_id: Uuid,
	generation: Arc<AtomicU64>,
	counters: Arc<HybridCounters>,
	topic: String,
) {
	while let Some(message) = stream.next().await {
		if message.origin == instance_id {
			continue;
		}

		generation.fetch_add(1, Ordering::SeqCst);
		if message.flush_all {
			local.clear();
		} else {
			for key in &message.keys {
				local.evict(key);
			}
			for prefix in &message.prefixes {
				local.remove_by_prefix(prefix);
			}
		}
		counters.invalidations_received.incr();

		tracing::debug!(
			origin = %message.origin,
			keys = message.keys.len(),
			prefixes = message.prefixes.len(),
			flush_all = message.flush_all,
			"applied invalidation"
		);
	}

	tracing::warn!(topic = %topic, "invalidation stream ended, local tier no longer kept coherent");
}

#[async_trait]
impl<S, B> Cache for HybridCache<S, B>
where
	S: KeyValueStore,
	B: InvalidationBus,
{
	/// Add to the shared tier; the local tier only learns about a successful add
	///
	/// Both tiers get the same absolute deadline, resolved once against the
	/// shared tier's default, so the local copy never outlives the shared entry.
	async fn add<T>(&self, key: &str, value: &T, expiration: Option<Expiration>) -> Result<bool>
	where
		T: Serialize + Send + Sync,
	{
		let payload = serde_json::to_vec(value)?;
		let deadline = Expiration::or_default(expiration, self.remote.default_expiration())
			.deadline(Utc::now());
		let pinned = deadline.map_or(Expiration::Never, Expiration::At);

		let observed = self.generation.load(Ordering::SeqCst);
		if !self.remote.add(key, value, Some(pinned)).await? {
			return Ok(false);
		}

		if let Some(version) = self.local.set_serialized(key, payload, deadline)
			&& self.generation.load(Ordering::SeqCst) != observed
		{
			self.local.remove_if_version(key, version);
		}
		Ok(true)
	}

	async fn set<T>(&self, key: &str, value: &T, expiration: Option<Expiration>) -> Result<bool>
	where
		T: Serialize + Send + Sync,
	{
		let result = self.remote.set(key, value, expiration).await;
		self.invalidate_local(&[key]);
		let stored = result?;

		self.publish_keys(&[key]).await;
		Ok(stored)
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
		let result = self.remote.replace(key, value, expiration).await;
		self.invalidate_local(&[key]);
		let replaced = result?;

		self.publish_keys(&[key]).await;
		Ok(replaced)
	}

	async fn get<T>(&self, key: &str) -> Result<Option<T>>
	where
		T: DeserializeOwned + Send,
	{
		if let Some(value) = self.local.get::<T>(key).await? {
			return Ok(Some(value));
		}

		let observed = self.generation.load(Ordering::SeqCst);
		let Some(payload) = self.remote.get_payload(key).await? else {
			self.counters.misses.incr();
			return Ok(None);
		};

		let value: T = serde_json::from_str(&payload)?;
		self.counters.remote_hits.incr();
		self.populate(key, payload.into_bytes(), observed).await;
		Ok(Some(value))
	}

	async fn exists(&self, key: &str) -> Result<bool> {
		if self.local.exists(key).await? {
			return Ok(true);
		}
		self.remote.exists(key).await
	}

	async fn remove(&self, key: &str) -> Result<bool> {
		let result = self.remote.remove(key).await;
		self.invalidate_local(&[key]);
		let removed = result?;

		self.publish_keys(&[key]).await;
		Ok(removed)
	}

	async fn remove_all(&self, keys: &[&str]) -> Result<usize> {
		let result = self.remote.remove_all(keys).await;
		self.invalidate_local(keys);
		let removed = result?;

		self.publish_keys(keys).await;
		Ok(removed)
	}

	/// Counters are always served by the shared tier
	async fn increment(
		&self,
		key: &str,
		amount: i64,
		expiration: Option<Expiration>,
	) -> Result<i64> {
		let result = self.remote.increment(key, amount, expiration).await;
		self.invalidate_local(&[key]);
		let value = result?;

		self.publish_keys(&[key]).await;
		Ok(value)
	}

	async fn get_all<T>(&self, keys: &[&str]) -> Result<HashMap<String, T>>
	where
		T: DeserializeOwned + Send,
	{
		self.remote.get_all(keys).await
	}

	async fn set_all<T>(
		&self,
		values: HashMap<String, T>,
		expiration: Option<Expiration>,
	) -> Result<usize>
	where
		T: Serialize + Send + Sync,
	{
		let keys: Vec<String> = values.keys().cloned().collect();
		let result = self.remote.set_all(values, expiration).await;
		self.invalidate_local(&keys);
		let stored = result?;

		self.publish_keys(&keys).await;
		Ok(stored)
	}

	async fn set_expiration(&self, key: &str, expiration: Expiration) -> Result<bool> {
		let result = self.remote.set_expiration(key, expiration).await;
		self.invalidate_local(&[key]);
		let updated = result?;

		self.publish_keys(&[key]).await;
		Ok(updated)
	}

	async fn get_expiration(&self, key: &str) -> Result<Option<Expiration>> {
		self.remote.get_expiration(key).await
	}
}

#[async_trait]
impl<S, B> FlushableCache for HybridCache<S, B>
where
	S: FlushableStore,
	B: InvalidationBus,
{
	/// Flush the shared tier, then every instance's local tier
	async fn flush_all(&self) -> Result<()> {
		let result = self.remote.flush_all().await;
		self.generation.fetch_add(1, Ordering::SeqCst);
		self.local.clear();
		result?;

		self.publish(InvalidationMessage::flush_all(self.instance_id))
			.await;
		Ok(())
	}
}
