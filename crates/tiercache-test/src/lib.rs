//! # tiercache-test
//!
//! Testing utilities for tiercache.
//!
//! - **Fixtures**: a Redis container via TestContainers for integration tests
//! - **Polling**: [`eventually`] for assertions on asynchronously delivered
//!   invalidations
//! - **Logging**: [`logging::init_test_logging`] routes `tracing` output to the
//!   test harness
//!
//! ## Redis fixture
//!
//! ```rust,ignore
//! use tiercache_test::fixtures::redis_container;
//! use rstest::*;
//!
//! #[rstest]
//! #[tokio::test]
//! async fn test_with_redis(
//!     #[future] redis_container: (ContainerAsync<GenericImage>, u16, String)
//! ) {
//!     let (_container, _port, url) = redis_container.await;
//!     let store = RedisStore::new(url).unwrap();
//! }
//! ```

pub mod fixtures;
pub mod logging;

use std::future::Future;
use std::time::Duration;

/// Poll interval used by [`eventually`]
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Poll `condition` until it returns `true` or `timeout` elapses
///
/// Returns whether the condition was met.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
	F: FnMut() -> Fut,
	Fut: Future<Output = bool>,
{
	let deadline = tokio::time::Instant::now() + timeout;
	loop {
		if condition().await {
			return true;
		}
		if tokio::time::Instant::now() >= deadline {
			return false;
		}
		tokio::time::sleep(POLL_INTERVAL).await;
	}
}
