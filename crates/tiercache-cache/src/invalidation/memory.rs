//! In-process invalidation bus

use super::{InvalidationBus, InvalidationMessage, InvalidationStream};
use async_trait::async_trait;
use futures::StreamExt;
use tiercache_conf::DEFAULT_INVALIDATION_TOPIC;
use tiercache_exception::Result;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast channel standing in for a pub/sub server
///
/// Clones share the channel, so caches built over clones of one bus receive
/// each other's messages.
#[derive(Debug, Clone)]
pub struct MemoryBus {
	topic: String,
	sender: broadcast::Sender<InvalidationMessage>,
}

impl MemoryBus {
	pub fn new() -> Self {
		Self::with_topic(DEFAULT_INVALIDATION_TOPIC)
	}

	pub fn with_topic(topic: impl Into<String>) -> Self {
		Self::with_capacity(topic, DEFAULT_CAPACITY)
	}

	/// Create a bus whose subscribers buffer at most `capacity` messages
	///
	/// A subscriber that falls further behind receives a flush-all in place
	/// of the messages it missed.
	pub fn with_capacity(topic: impl Into<String>, capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self {
			topic: topic.into(),
			sender,
		}
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for MemoryBus {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl InvalidationBus for MemoryBus {
	fn topic(&self) -> &str {
		&self.topic
	}

	async fn publish(&self, message: &InvalidationMessage) -> Result<()> {
		// No subscribers is not an error
		if self.sender.send(message.clone()).is_err() {
			tracing::debug!(topic = %self.topic, "published invalidation with no subscribers");
		}
		Ok(())
	}

	async fn subscribe(&self) -> Result<InvalidationStream> {
		let topic = self.topic.clone();
		let stream = BroadcastStream::new(self.sender.subscribe()).map(move |received| {
			match received {
				Ok(message) => message,
				Err(BroadcastStreamRecvError::Lagged(skipped)) => {
					tracing::warn!(
						topic = %topic,
						skipped,
						"invalidation subscriber lagged, dropping all local entries"
					);
					InvalidationMessage::flush_all(Uuid::nil())
				}
			}
		});
		Ok(stream.boxed())
	}
}
