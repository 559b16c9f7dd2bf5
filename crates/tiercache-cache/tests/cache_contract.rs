//! Contract tests shared by every cache tier
//!
//! Each check is written once against the `Cache` trait and run against the
//! local, remote and hybrid tiers so the three stay interchangeable.
//!
//! ## Test Coverage
//!
//! - add/replace preconditions
//! - Serialization of complex types
//! - Expiration and zero-value reads
//! - Concurrent counters and concurrent adds
//! - Batch operations

use rstest::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tiercache_cache::{
	Cache, Expiration, HybridCache, LocalCache, MemoryBus, MemoryStore, RemoteCache,
};
use tiercache_exception::Error;
use tokio::sync::Barrier;

// ========================================
// Test Fixtures
// ========================================

/// Complex struct for serialization testing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UserData {
	id: u64,
	username: String,
	tags: Vec<String>,
	metadata: HashMap<String, String>,
}

impl UserData {
	fn sample() -> Self {
		let mut metadata = HashMap::new();
		metadata.insert("role".to_string(), "admin".to_string());
		metadata.insert("department".to_string(), "engineering".to_string());

		Self {
			id: 12345,
			username: "alice".to_string(),
			tags: vec!["vip".to_string(), "premium".to_string()],
			metadata,
		}
	}
}

#[derive(Debug, Clone, Copy)]
enum Tier {
	Local,
	Remote,
	Hybrid,
}

async fn hybrid() -> HybridCache<MemoryStore, MemoryBus> {
	HybridCache::new(
		LocalCache::new(),
		RemoteCache::new(MemoryStore::new()),
		MemoryBus::new(),
	)
	.await
	.unwrap()
}

/// Run a generic check against a freshly built cache of the given tier
macro_rules! on_tier {
	($tier:expr, $check:ident) => {
		match $tier {
			Tier::Local => $check(LocalCache::new()).await,
			Tier::Remote => $check(RemoteCache::new(MemoryStore::new())).await,
			Tier::Hybrid => $check(hybrid().await).await,
		}
	};
}

// ========================================
// Checks
// ========================================

async fn add_only_once<C: Cache>(cache: C) {
	assert!(cache.add("k", &"first", None).await.unwrap());
	assert!(!cache.add("k", &"second", None).await.unwrap());

	let value: Option<String> = cache.get("k").await.unwrap();
	assert_eq!(value.as_deref(), Some("first"));
}

async fn replace_needs_live_entry<C: Cache>(cache: C) {
	assert!(!cache.replace("k", &1, None).await.unwrap());
	assert_eq!(cache.get::<i32>("k").await.unwrap(), None);

	cache.set("k", &1, None).await.unwrap();
	assert!(cache.replace("k", &2, None).await.unwrap());
	assert_eq!(cache.get::<i32>("k").await.unwrap(), Some(2));
}

async fn complex_value_round_trip<C: Cache>(cache: C) {
	let user = UserData::sample();
	cache.set("user:12345", &user, None).await.unwrap();

	let loaded: Option<UserData> = cache.get("user:12345").await.unwrap();
	assert_eq!(loaded, Some(user));
}

async fn short_expiration_elapses<C: Cache>(cache: C) {
	cache
		.set("k", &"v", Some(Expiration::In(Duration::from_millis(1))))
		.await
		.unwrap();
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert_eq!(cache.get::<String>("k").await.unwrap(), None);
	assert!(!cache.remove("k").await.unwrap());
}

async fn zero_value_on_miss<C: Cache>(cache: C) {
	assert_eq!(cache.get_or_default::<i64>("missing").await.unwrap(), 0);
	assert_eq!(
		cache.get_or_default::<Vec<String>>("missing").await.unwrap(),
		Vec::<String>::new()
	);
	assert!(
		!cache
			.set_expiration("missing", Expiration::In(Duration::from_secs(1)))
			.await
			.unwrap()
	);
	assert_eq!(cache.get_expiration("missing").await.unwrap(), None);
}

async fn concurrent_increments<C: Cache + Clone + 'static>(cache: C) {
	let barrier = Arc::new(Barrier::new(100));

	let handles: Vec<_> = (0..100)
		.map(|_| {
			let cache = cache.clone();
			let barrier = Arc::clone(&barrier);
			tokio::spawn(async move {
				barrier.wait().await;
				cache.increment("counter", 1, None).await.unwrap()
			})
		})
		.collect();
	for handle in handles {
		handle.await.unwrap();
	}

	assert_eq!(cache.get::<i64>("counter").await.unwrap(), Some(100));
}

async fn concurrent_adds_single_winner<C: Cache + Clone + 'static>(cache: C) {
	let barrier = Arc::new(Barrier::new(20));

	let handles: Vec<_> = (0..20)
		.map(|i| {
			let cache = cache.clone();
			let barrier = Arc::clone(&barrier);
			tokio::spawn(async move {
				barrier.wait().await;
				cache.add("lock", &i, None).await.unwrap()
			})
		})
		.collect();

	let mut winners = 0;
	for handle in handles {
		if handle.await.unwrap() {
			winners += 1;
		}
	}
	assert_eq!(winners, 1);
}

async fn batch_operations<C: Cache>(cache: C) {
	let mut values = HashMap::new();
	values.insert("batch:1".to_string(), 1);
	values.insert("batch:2".to_string(), 2);
	values.insert("batch:3".to_string(), 3);
	assert_eq!(cache.set_all(values, None).await.unwrap(), 3);

	let found: HashMap<String, i32> = cache
		.get_all(&["batch:1", "batch:3", "batch:9"])
		.await
		.unwrap();
	assert_eq!(found.len(), 2);
	assert_eq!(found["batch:3"], 3);

	assert_eq!(
		cache.remove_all(&["batch:1", "batch:2", "batch:9"]).await.unwrap(),
		2
	);
	assert!(cache.exists("batch:3").await.unwrap());
}

async fn counter_rejects_text<C: Cache>(cache: C) {
	cache.set("name", &"alice", None).await.unwrap();
	let err = cache.increment("name", 1, None).await.unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)));

	let err = cache.decrement("n", i64::MIN, None).await.unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)));
}

// ========================================
// Tests
// ========================================

/// Test Intent: Verify add stores only when the key is absent
#[rstest]
#[case::local(Tier::Local)]
#[case::remote(Tier::Remote)]
#[case::hybrid(Tier::Hybrid)]
#[tokio::test]
async fn test_add_only_once(#[case] tier: Tier) {
	on_tier!(tier, add_only_once);
}

/// Test Intent: Verify replace never creates an entry
#[rstest]
#[case::local(Tier::Local)]
#[case::remote(Tier::Remote)]
#[case::hybrid(Tier::Hybrid)]
#[tokio::test]
async fn test_replace_needs_live_entry(#[case] tier: Tier) {
	on_tier!(tier, replace_needs_live_entry);
}

/// Test Intent: Verify structured values survive JSON serialization
#[rstest]
#[case::local(Tier::Local)]
#[case::remote(Tier::Remote)]
#[case::hybrid(Tier::Hybrid)]
#[tokio::test]
async fn test_complex_value_round_trip(#[case] tier: Tier) {
	on_tier!(tier, complex_value_round_trip);
}

/// Test Intent: Verify a 1ms entry is gone 10ms later
#[rstest]
#[case::local(Tier::Local)]
#[case::remote(Tier::Remote)]
#[case::hybrid(Tier::Hybrid)]
#[tokio::test]
async fn test_short_expiration_elapses(#[case] tier: Tier) {
	on_tier!(tier, short_expiration_elapses);
}

/// Test Intent: Verify misses are values, not errors
#[rstest]
#[case::local(Tier::Local)]
#[case::remote(Tier::Remote)]
#[case::hybrid(Tier::Hybrid)]
#[tokio::test]
async fn test_zero_value_on_miss(#[case] tier: Tier) {
	on_tier!(tier, zero_value_on_miss);
}

/// Test Intent: Verify 100 concurrent increments lose no update
#[rstest]
#[case::local(Tier::Local)]
#[case::remote(Tier::Remote)]
#[case::hybrid(Tier::Hybrid)]
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_increments(#[case] tier: Tier) {
	on_tier!(tier, concurrent_increments);
}

/// Test Intent: Verify exactly one of many racing adds wins
#[rstest]
#[case::local(Tier::Local)]
#[case::remote(Tier::Remote)]
#[case::hybrid(Tier::Hybrid)]
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_adds_single_winner(#[case] tier: Tier) {
	on_tier!(tier, concurrent_adds_single_winner);
}

/// Test Intent: Verify batch reads skip misses and batch removes count live keys
#[rstest]
#[case::local(Tier::Local)]
#[case::remote(Tier::Remote)]
#[case::hybrid(Tier::Hybrid)]
#[tokio::test]
async fn test_batch_operations(#[case] tier: Tier) {
	on_tier!(tier, batch_operations);
}

/// Test Intent: Verify counters reject non-integers and unrepresentable deltas
#[rstest]
#[case::local(Tier::Local)]
#[case::remote(Tier::Remote)]
#[case::hybrid(Tier::Hybrid)]
#[tokio::test]
async fn test_counter_rejects_text(#[case] tier: Tier) {
	on_tier!(tier, counter_rejects_text);
}
