//! Integration tests for the Redis store and the remote tier over it
//!
//! These tests run against a real Redis server started with TestContainers.
//!
//! ## Test Coverage
//!
//! - Conditional writes (NX/XX) and millisecond TTLs
//! - Expiration inspection, update and removal (PTTL, PEXPIRE, PERSIST)
//! - Atomic counters with TTL on creation
//! - Prefix deletes with SCAN + UNLINK and glob metacharacters in keys
//! - The cache contract over `RemoteCache<RedisStore>`

use rstest::*;
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tiercache::{
	Cache, Error, Expiration, KeyTtl, KeyValueStore, RedisStore, RemoteCache, SetCondition,
};
use tiercache_integration_tests::unique_prefix;
use tiercache_test::fixtures::redis_container;
use testcontainers::{ContainerAsync, GenericImage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Session {
	user_id: u64,
	roles: Vec<String>,
}

/// Fixture to provide a Redis store namespaced to the test
#[fixture]
async fn redis_store(
	#[future] redis_container: (ContainerAsync<GenericImage>, u16, String),
) -> (ContainerAsync<GenericImage>, RedisStore) {
	tiercache_test::logging::init_test_logging();
	let (container, _port, url) = redis_container.await;
	let store = RedisStore::new(url)
		.expect("Failed to create Redis store")
		.with_key_prefix(unique_prefix("store"));
	(container, store)
}

#[rstest]
#[serial(redis)]
#[tokio::test]
async fn test_conditional_set(#[future] redis_store: (ContainerAsync<GenericImage>, RedisStore)) {
	let (_container, store) = redis_store.await;

	assert!(!store.set("k", "1".into(), None, SetCondition::IfExists).await.unwrap());
	assert!(store.set("k", "1".into(), None, SetCondition::IfNotExists).await.unwrap());
	assert!(!store.set("k", "2".into(), None, SetCondition::IfNotExists).await.unwrap());
	assert!(store.set("k", "3".into(), None, SetCondition::IfExists).await.unwrap());
	assert!(store.set("k", "4".into(), None, SetCondition::Always).await.unwrap());

	assert_eq!(store.get("k").await.unwrap().as_deref(), Some("4"));
	assert_eq!(
		store.get_many(&["k", "missing"]).await.unwrap(),
		vec![Some("4".to_string()), None]
	);
}

#[rstest]
#[serial(redis)]
#[tokio::test]
async fn test_ttl_lifecycle(#[future] redis_store: (ContainerAsync<GenericImage>, RedisStore)) {
	let (_container, store) = redis_store.await;
	assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);

	store.set("k", "v".into(), None, SetCondition::Always).await.unwrap();
	assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Persistent);

	assert!(store.expire("k", Some(Duration::from_secs(60))).await.unwrap());
	assert!(matches!(store.ttl("k").await.unwrap(), KeyTtl::Expires(d) if d <= Duration::from_secs(60)));

	// PERSIST on an already persistent key still reports the key exists
	assert!(store.expire("k", None).await.unwrap());
	assert!(store.expire("k", None).await.unwrap());
	assert!(!store.expire("missing", None).await.unwrap());

	store
		.set("short", "v".into(), Some(Duration::from_millis(20)), SetCondition::Always)
		.await
		.unwrap();
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert!(!store.exists("short").await.unwrap());
}

#[rstest]
#[serial(redis)]
#[tokio::test]
async fn test_incr_by_ttl_only_on_creation(
	#[future] redis_store: (ContainerAsync<GenericImage>, RedisStore),
) {
	let (_container, store) = redis_store.await;

	assert_eq!(store.incr_by("fresh", 5, Some(Duration::from_secs(60))).await.unwrap(), 5);
	assert!(matches!(store.ttl("fresh").await.unwrap(), KeyTtl::Expires(_)));

	store.set("plain", "10".into(), None, SetCondition::Always).await.unwrap();
	assert_eq!(store.incr_by("plain", -3, Some(Duration::from_secs(60))).await.unwrap(), 7);
	assert_eq!(store.ttl("plain").await.unwrap(), KeyTtl::Persistent);

	store.set("text", "\"abc\"".into(), None, SetCondition::Always).await.unwrap();
	assert!(matches!(
		store.incr_by("text", 1, None).await,
		Err(Error::InvalidArgument(_))
	));
}

#[rstest]
#[serial(redis)]
#[tokio::test]
async fn test_delete_by_prefix_is_literal(
	#[future] redis_store: (ContainerAsync<GenericImage>, RedisStore),
) {
	let (_container, store) = redis_store.await;
	for key in ["user*:1", "user*:2", "user1:1", "order:1"] {
		store.set(key, "1".into(), None, SetCondition::Always).await.unwrap();
	}

	assert_eq!(store.delete_by_prefix("user*:").await.unwrap(), 2);
	assert!(store.exists("user1:1").await.unwrap());
	assert_eq!(store.delete_many(&["user1:1", "order:1", "missing"]).await.unwrap(), 2);
	assert_eq!(store.delete_many(&[]).await.unwrap(), 0);
}

#[rstest]
#[serial(redis)]
#[tokio::test]
async fn test_remote_cache_contract(
	#[future] redis_store: (ContainerAsync<GenericImage>, RedisStore),
) {
	let (_container, store) = redis_store.await;
	let cache = RemoteCache::new(store);

	assert!(cache.add("k", &1, None).await.unwrap());
	assert!(!cache.add("k", &2, None).await.unwrap());
	assert_eq!(cache.get::<i32>("k").await.unwrap(), Some(1));

	assert!(!cache.replace("absent", &1, None).await.unwrap());
	assert!(!cache.exists("absent").await.unwrap());

	let session = Session {
		user_id: 7,
		roles: vec!["admin".to_string()],
	};
	cache.set("session", &session, None).await.unwrap();
	assert_eq!(cache.get::<Session>("session").await.unwrap(), Some(session));

	assert!(
		cache
			.set_expiration("session", Expiration::In(Duration::from_secs(30)))
			.await
			.unwrap()
	);
	assert!(matches!(
		cache.get_expiration("session").await.unwrap(),
		Some(Expiration::At(_))
	));
	assert!(
		!cache
			.set_expiration("absent", Expiration::Never)
			.await
			.unwrap()
	);
}

#[rstest]
#[serial(redis)]
#[tokio::test]
async fn test_remote_expiration_after_one_millisecond(
	#[future] redis_store: (ContainerAsync<GenericImage>, RedisStore),
) {
	let (_container, store) = redis_store.await;
	let cache = RemoteCache::new(store);

	cache
		.set("k", &"v", Some(Expiration::In(Duration::from_millis(1))))
		.await
		.unwrap();
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert_eq!(cache.get::<String>("k").await.unwrap(), None);
	assert!(!cache.remove("k").await.unwrap());
}

#[rstest]
#[serial(redis)]
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_remote_increments(
	#[future] redis_store: (ContainerAsync<GenericImage>, RedisStore),
) {
	let (_container, store) = redis_store.await;
	let cache = Arc::new(RemoteCache::new(store));

	let handles: Vec<_> = (0..100)
		.map(|_| {
			let cache = Arc::clone(&cache);
			tokio::spawn(async move { cache.increment("counter", 1, None).await.unwrap() })
		})
		.collect();
	for handle in handles {
		handle.await.unwrap();
	}

	assert_eq!(cache.get::<i64>("counter").await.unwrap(), Some(100));
}
