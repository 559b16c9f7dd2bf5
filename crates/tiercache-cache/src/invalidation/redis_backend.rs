//! Redis Pub/Sub invalidation bus

use super::{InvalidationBus, InvalidationMessage, InvalidationStream};
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use futures::StreamExt;
use redis::aio::PubSub;
use std::time::Duration;
use tiercache_conf::CacheSettings;
use tiercache_exception::{Error, Result};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Invalidation bus over Redis `PUBLISH`/`SUBSCRIBE`
///
/// Messages are JSON documents published on the bus topic. Each subscription
/// owns a dedicated pub/sub connection and reconnects with exponential backoff
/// if it drops. Messages published while disconnected are lost, so after every
/// reconnect the subscriber receives a flush-all.
///
/// # Examples
///
/// ```no_run
/// use tiercache_cache::{InvalidationBus, RedisBus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = RedisBus::new("redis://localhost:6379", "cache")?;
/// let invalidations = bus.subscribe().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBus {
	client: redis::Client,
	pool: Pool,
	topic: String,
}

impl RedisBus {
	pub fn new(connection_url: impl Into<String>, topic: impl Into<String>) -> Result<Self> {
		let url = connection_url.into();
		let client = redis::Client::open(url.as_str())
			.map_err(|e| Error::Configuration(format!("Invalid Redis URL: {}", e)))?;
		let pool = PoolConfig::from_url(url)
			.create_pool(Some(Runtime::Tokio1))
			.map_err(|e| Error::Configuration(format!("Failed to create Redis pool: {}", e)))?;

		Ok(Self {
			client,
			pool,
			topic: topic.into(),
		})
	}

	/// Create a bus on the configured store URL and topic
	pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
		Self::new(settings.remote.url.clone(), settings.invalidation.topic.clone())
	}
}

async fn open_subscription(client: &redis::Client, topic: &str) -> Result<PubSub> {
	let mut pubsub = client
		.get_async_pubsub()
		.await
		.map_err(|e| Error::Connection(format!("Failed to get pub/sub connection: {}", e)))?;
	pubsub
		.subscribe(topic)
		.await
		.map_err(|e| Error::Connection(format!("Failed to subscribe to '{}': {}", topic, e)))?;

	tracing::info!(topic = %topic, "subscribed to invalidation topic");
	Ok(pubsub)
}

/// Forward messages until the receiving side is dropped, reconnecting as needed
async fn forward(
	client: redis::Client,
	topic: String,
	mut pubsub: PubSub,
	tx: mpsc::UnboundedSender<InvalidationMessage>,
) {
	let mut backoff = INITIAL_BACKOFF;

	loop {
		{
			let messages = pubsub.on_message();
			tokio::pin!(messages);

			loop {
				tokio::select! {
					_ = tx.closed() => return,
					received = messages.next() => {
						let Some(msg) = received else {
							break;
						};
						let decoded = msg
							.get_payload::<String>()
							.map_err(|e| e.to_string())
							.and_then(|payload| {
								serde_json::from_str::<InvalidationMessage>(&payload)
									.map_err(|e| e.to_string())
							});
						match decoded {
							Ok(message) => {
								if tx.send(message).is_err() {
									return;
								}
							}
							Err(e) => {
								tracing::warn!(topic = %topic, error = %e, "failed to parse invalidation message payload");
							}
						}
					}
				}
			}
		}

		tracing::warn!(topic = %topic, "pub/sub connection closed, reconnecting");

		pubsub = loop {
			tokio::select! {
				_ = tx.closed() => return,
				_ = tokio::time::sleep(backoff) => {}
			}
			match open_subscription(&client, &topic).await {
				Ok(pubsub) => {
					backoff = INITIAL_BACKOFF;
					break pubsub;
				}
				Err(e) => {
					tracing::error!(
						topic = %topic,
						error = %e,
						backoff_secs = backoff.as_secs(),
						"invalidation subscription failed, retrying"
					);
					backoff = (backoff * 2).min(MAX_BACKOFF);
				}
			}
		};

		// Anything published while disconnected was missed
		if tx.send(InvalidationMessage::flush_all(Uuid::nil())).is_err() {
			return;
		}
	}
}

#[async_trait]
impl InvalidationBus for RedisBus {
	fn topic(&self) -> &str {
		&self.topic
	}

	async fn publish(&self, message: &InvalidationMessage) -> Result<()> {
		let payload = serde_json::to_string(message)?;
		let mut conn = self
			.pool
			.get()
			.await
			.map_err(|e| Error::Connection(format!("Failed to get connection from pool: {}", e)))?;

		let receivers: u64 = redis::cmd("PUBLISH")
			.arg(&self.topic)
			.arg(payload)
			.query_async(&mut *conn)
			.await
			.map_err(|e| Error::Backend(format!("Failed to publish invalidation: {}", e)))?;

		tracing::debug!(topic = %self.topic, receivers, "published invalidation");
		Ok(())
	}

	async fn subscribe(&self) -> Result<InvalidationStream> {
		let pubsub = open_subscription(&self.client, &self.topic).await?;
		let (tx, rx) = mpsc::unbounded_channel();
		tokio::spawn(forward(
			self.client.clone(),
			self.topic.clone(),
			pubsub,
			tx,
		));
		Ok(UnboundedReceiverStream::new(rx).boxed())
	}
}
