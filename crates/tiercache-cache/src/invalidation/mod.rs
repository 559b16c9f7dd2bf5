//! Cross-process invalidation
//!
//! Peers never exchange values, only the news that some keys (or all of them)
//! changed so local copies must be dropped. Delivery is at-least-once and
//! unordered; applying a message twice is harmless.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_backend;

pub use memory::MemoryBus;
#[cfg(feature = "redis-backend")]
pub use redis_backend::RedisBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tiercache_exception::Result;
use uuid::Uuid;

/// Stream of invalidation messages received on a topic
pub type InvalidationStream = BoxStream<'static, InvalidationMessage>;

/// Notice that local copies of some keys are stale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationMessage {
	/// Instance that published the message
	pub origin: Uuid,
	#[serde(default)]
	pub keys: Vec<String>,
	#[serde(default)]
	pub prefixes: Vec<String>,
	/// Drop every local entry
	#[serde(default)]
	pub flush_all: bool,
}

impl InvalidationMessage {
	pub fn keys<I, K>(origin: Uuid, keys: I) -> Self
	where
		I: IntoIterator<Item = K>,
		K: Into<String>,
	{
		Self {
			origin,
			keys: keys.into_iter().map(Into::into).collect(),
			prefixes: Vec::new(),
			flush_all: false,
		}
	}

	pub fn prefix(origin: Uuid, prefix: impl Into<String>) -> Self {
		Self {
			origin,
			keys: Vec::new(),
			prefixes: vec![prefix.into()],
			flush_all: false,
		}
	}

	pub fn flush_all(origin: Uuid) -> Self {
		Self {
			origin,
			keys: Vec::new(),
			prefixes: Vec::new(),
			flush_all: true,
		}
	}

	/// Whether applying the message would change nothing
	pub fn is_empty(&self) -> bool {
		!self.flush_all && self.keys.is_empty() && self.prefixes.is_empty()
	}
}

/// Publish/subscribe channel bound to one topic
#[async_trait]
pub trait InvalidationBus: Send + Sync + 'static {
	fn topic(&self) -> &str;

	async fn publish(&self, message: &InvalidationMessage) -> Result<()>;

	/// Start receiving messages published after this call returns
	async fn subscribe(&self) -> Result<InvalidationStream>;
}
