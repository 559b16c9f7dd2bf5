//! TestContainers fixtures
//!
//! Requires a running Docker daemon.

use rstest::*;
use std::time::Duration;
use testcontainers::{
	core::{IntoContainerPort, WaitFor},
	runners::AsyncRunner,
};

pub use testcontainers::{ContainerAsync, GenericImage};

const REDIS_IMAGE: &str = "redis";
const REDIS_TAG: &str = "7-alpine";
const REDIS_PORT: u16 = 6379;
const STARTUP_ATTEMPTS: u32 = 3;
const STARTUP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Start a Redis container
///
/// Returns the container (keep it alive for the duration of the test), the
/// mapped host port and a connection URL.
///
/// # Examples
///
/// ```rust,ignore
/// use tiercache_test::fixtures::redis_container;
/// use rstest::*;
///
/// #[rstest]
/// #[tokio::test]
/// async fn test_with_redis(
///     #[future] redis_container: (ContainerAsync<GenericImage>, u16, String)
/// ) {
///     let (_container, port, url) = redis_container.await;
///     let store = RedisStore::new(url).unwrap();
/// }
/// ```
#[fixture]
pub async fn redis_container() -> (ContainerAsync<GenericImage>, u16, String) {
	let mut attempt = 1;
	let mut delay = STARTUP_RETRY_DELAY;
	loop {
		match start_redis().await {
			Ok(started) => return started,
			Err(e) if attempt < STARTUP_ATTEMPTS => {
				eprintln!("redis container did not start (attempt {attempt}): {e}, retrying in {delay:?}");
				tokio::time::sleep(delay).await;
				attempt += 1;
				delay *= 2;
			}
			Err(e) => panic!("redis container did not start after {attempt} attempts: {e}"),
		}
	}
}

/// Container, mapped port and `redis://` URL of a fresh server
async fn start_redis()
-> Result<(ContainerAsync<GenericImage>, u16, String), testcontainers::TestcontainersError> {
	let container = GenericImage::new(REDIS_IMAGE, REDIS_TAG)
		.with_exposed_port(REDIS_PORT.tcp())
		.with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
		.start()
		.await?;

	let host = container.get_host().await?;
	let port = container.get_host_port_ipv4(REDIS_PORT).await?;
	Ok((container, port, format!("redis://{}:{}", host, port)))
}
