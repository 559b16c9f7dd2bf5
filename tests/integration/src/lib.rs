//! Shared helpers for the Redis integration tests

use tiercache::{HybridCache, LocalCache, RedisBus, RedisStore, RemoteCache, Result};
use tiercache_test::logging::init_test_logging;
use uuid::Uuid;

/// Hybrid cache over Redis for both the store and the bus
pub type RedisHybrid = HybridCache<RedisStore, RedisBus>;

/// Key prefix unique to one test, so tests sharing a server never collide
pub fn unique_prefix(label: &str) -> String {
	format!("{}-{}", label, Uuid::new_v4().simple())
}

/// Build one "process": its own local tier and connections, shared server
pub async fn redis_hybrid(url: &str, key_prefix: &str, topic: &str) -> Result<RedisHybrid> {
	init_test_logging();
	let store = RedisStore::new(url)?.with_key_prefix(key_prefix);
	let bus = RedisBus::new(url, topic)?;
	HybridCache::new(LocalCache::new(), RemoteCache::new(store), bus).await
}
