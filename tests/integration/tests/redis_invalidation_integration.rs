//! Integration tests for Redis Pub/Sub invalidation
//!
//! Two hybrid caches with separate connections share one Redis server, the
//! way two application processes would.

use futures::StreamExt;
use rstest::*;
use serial_test::serial;
use std::time::Duration;
use testcontainers::{ContainerAsync, GenericImage};
use tiercache::{Cache, InvalidationBus, InvalidationMessage, RedisBus};
use tiercache_integration_tests::{redis_hybrid, unique_prefix};
use tiercache_test::eventually;
use tiercache_test::fixtures::redis_container;
use uuid::Uuid;

const SETTLE: Duration = Duration::from_secs(5);

#[rstest]
#[serial(redis)]
#[tokio::test]
async fn test_publish_subscribe_round_trip(
	#[future] redis_container: (ContainerAsync<GenericImage>, u16, String),
) {
	let (_container, _port, url) = redis_container.await;
	let topic = unique_prefix("topic");
	let subscriber = RedisBus::new(url.as_str(), topic.as_str()).unwrap();
	let publisher = RedisBus::new(url.as_str(), topic.as_str()).unwrap();

	let mut stream = subscriber.subscribe().await.unwrap();
	let message = InvalidationMessage::prefix(Uuid::new_v4(), "user:");
	publisher.publish(&message).await.unwrap();

	let received = tokio::time::timeout(SETTLE, stream.next())
		.await
		.expect("Timed out waiting for invalidation")
		.expect("Stream ended");
	assert_eq!(received, message);
}

#[rstest]
#[serial(redis)]
#[tokio::test]
async fn test_hybrid_coherence_over_redis(
	#[future] redis_container: (ContainerAsync<GenericImage>, u16, String),
) {
	let (_container, _port, url) = redis_container.await;
	let prefix = unique_prefix("app");
	let topic = unique_prefix("cache");
	let a = redis_hybrid(&url, &prefix, &topic).await.unwrap();
	let b = redis_hybrid(&url, &prefix, &topic).await.unwrap();

	a.set("key", &"v0", None).await.unwrap();
	assert!(
		eventually(SETTLE, || async {
			b.get::<String>("key").await.unwrap().as_deref() == Some("v0")
				&& b.local().exists("key").await.unwrap()
		})
		.await
	);

	a.set("key", &"v1", None).await.unwrap();
	assert!(
		eventually(SETTLE, || async {
			b.get::<String>("key").await.unwrap().as_deref() == Some("v1")
		})
		.await
	);
	assert!(b.statistics().invalidations_received >= 2);
}

#[rstest]
#[serial(redis)]
#[tokio::test]
async fn test_flush_local_over_redis(
	#[future] redis_container: (ContainerAsync<GenericImage>, u16, String),
) {
	let (_container, _port, url) = redis_container.await;
	let prefix = unique_prefix("app");
	let topic = unique_prefix("cache");
	let a = redis_hybrid(&url, &prefix, &topic).await.unwrap();
	let b = redis_hybrid(&url, &prefix, &topic).await.unwrap();

	a.set("x", &1, None).await.unwrap();
	assert!(
		eventually(SETTLE, || async {
			b.get::<i32>("x").await.unwrap();
			b.local().exists("x").await.unwrap()
		})
		.await
	);

	a.flush_local().await;
	assert!(eventually(SETTLE, || async { b.local().is_empty() }).await);
	assert_eq!(b.get::<i32>("x").await.unwrap(), Some(1));
}

#[rstest]
#[serial(redis)]
#[tokio::test]
async fn test_prefix_removal_over_redis(
	#[future] redis_container: (ContainerAsync<GenericImage>, u16, String),
) {
	let (_container, _port, url) = redis_container.await;
	let prefix = unique_prefix("app");
	let topic = unique_prefix("cache");
	let a = redis_hybrid(&url, &prefix, &topic).await.unwrap();
	let b = redis_hybrid(&url, &prefix, &topic).await.unwrap();

	a.set("user:1", &1, None).await.unwrap();
	a.set("user:2", &2, None).await.unwrap();
	a.set("order:1", &3, None).await.unwrap();

	assert_eq!(a.remove_by_prefix("user:").await.unwrap(), 2);
	assert!(
		eventually(SETTLE, || async {
			b.get::<i32>("user:1").await.unwrap().is_none()
		})
		.await
	);
	assert_eq!(b.get::<i32>("order:1").await.unwrap(), Some(3));
}
