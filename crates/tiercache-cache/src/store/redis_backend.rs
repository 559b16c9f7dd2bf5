//! Redis store
//!
//! Provides a Redis-backed shared store with connection pooling.

use super::{KeyTtl, KeyValueStore, SetCondition};
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, PoolConfig as PoolSizing, Runtime};
use std::time::Duration;
use tiercache_conf::RemoteSettings;
use tiercache_exception::{Error, Result};

/// Number of keys to scan per iteration
const SCAN_BATCH_SIZE: usize = 100;

/// Redis store with connection pooling
///
/// Uses deadpool-redis for connection management. Flushing the whole database
/// is deliberately not offered; use [`KeyValueStore::delete_by_prefix`] with a
/// key prefix instead.
#[derive(Clone)]
pub struct RedisStore {
	pool: Pool,
	key_prefix: String,
}

impl RedisStore {
	/// Create a store with the default pool configuration
	///
	/// # Examples
	///
	/// ```no_run
	/// use tiercache_cache::RedisStore;
	///
	/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
	/// let store = RedisStore::new("redis://localhost:6379")?.with_key_prefix("myapp");
	/// // Keys are stored as "myapp:<key>"
	/// # Ok(())
	/// # }
	/// ```
	pub fn new(connection_url: impl Into<String>) -> Result<Self> {
		Self::with_pool_config(PoolConfig::from_url(connection_url.into()))
	}

	/// Create a store with a custom pool configuration
	pub fn with_pool_config(config: PoolConfig) -> Result<Self> {
		let pool = config
			.create_pool(Some(Runtime::Tokio1))
			.map_err(|e| Error::Configuration(format!("Failed to create Redis pool: {}", e)))?;

		Ok(Self {
			pool,
			key_prefix: String::new(),
		})
	}

	/// Create a store from remote settings
	pub fn from_settings(settings: &RemoteSettings) -> Result<Self> {
		let mut config = PoolConfig::from_url(settings.url.clone());
		config.pool = Some(PoolSizing::new(settings.pool_max_size));

		let store = Self::with_pool_config(config)?;
		Ok(match &settings.key_prefix {
			Some(prefix) => store.with_key_prefix(prefix.clone()),
			None => store,
		})
	}

	/// Namespace every key as `prefix:key`
	pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.key_prefix = prefix.into();
		self
	}

	/// Get the connection pool
	pub fn pool(&self) -> &Pool {
		&self.pool
	}

	fn build_key(&self, key: &str) -> String {
		if self.key_prefix.is_empty() {
			key.to_string()
		} else {
			format!("{}:{}", self.key_prefix, key)
		}
	}

	async fn connection(&self) -> Result<Connection> {
		self.pool
			.get()
			.await
			.map_err(|e| Error::Connection(format!("Failed to get connection from pool: {}", e)))
	}
}

fn command_error(action: &str, e: redis::RedisError) -> Error {
	let detail = e.to_string();
	if detail.contains("not an integer") || detail.contains("overflow") {
		Error::InvalidArgument(format!("Failed to {}: {}", action, detail))
	} else {
		Error::Backend(format!("Failed to {}: {}", action, detail))
	}
}

fn ttl_millis(ttl: Duration) -> u64 {
	u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Escape glob metacharacters so a prefix only matches literally
fn escape_glob(raw: &str) -> String {
	let mut escaped = String::with_capacity(raw.len());
	for c in raw.chars() {
		if matches!(c, '*' | '?' | '[' | ']' | '\\') {
			escaped.push('\\');
		}
		escaped.push(c);
	}
	escaped
}

#[async_trait]
impl KeyValueStore for RedisStore {
	async fn get(&self, key: &str) -> Result<Option<String>> {
		let mut conn = self.connection().await?;
		redis::cmd("GET")
			.arg(self.build_key(key))
			.query_async(&mut *conn)
			.await
			.map_err(|e| command_error("get value from Redis", e))
	}

	async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
		if keys.is_empty() {
			return Ok(Vec::new());
		}
		let full_keys: Vec<String> = keys.iter().map(|k| self.build_key(k)).collect();
		let mut conn = self.connection().await?;

		redis::cmd("MGET")
			.arg(&full_keys)
			.query_async(&mut *conn)
			.await
			.map_err(|e| command_error("get multiple values from Redis", e))
	}

	async fn set(
		&self,
		key: &str,
		value: String,
		ttl: Option<Duration>,
		condition: SetCondition,
	) -> Result<bool> {
		let mut cmd = redis::cmd("SET");
		cmd.arg(self.build_key(key)).arg(value);
		if let Some(ttl) = ttl {
			cmd.arg("PX").arg(ttl_millis(ttl));
		}
		match condition {
			SetCondition::Always => {}
			SetCondition::IfNotExists => {
				cmd.arg("NX");
			}
			SetCondition::IfExists => {
				cmd.arg("XX");
			}
		}

		let mut conn = self.connection().await?;
		// "OK" on success, nil when the NX/XX condition fails
		let reply: Option<String> = cmd
			.query_async(&mut *conn)
			.await
			.map_err(|e| command_error("set value in Redis", e))?;
		Ok(reply.is_some())
	}

	async fn delete(&self, key: &str) -> Result<bool> {
		let mut conn = self.connection().await?;
		let deleted: u64 = redis::cmd("DEL")
			.arg(self.build_key(key))
			.query_async(&mut *conn)
			.await
			.map_err(|e| command_error("delete value from Redis", e))?;
		Ok(deleted > 0)
	}

	async fn delete_many(&self, keys: &[&str]) -> Result<u64> {
		if keys.is_empty() {
			return Ok(0);
		}
		let full_keys: Vec<String> = keys.iter().map(|k| self.build_key(k)).collect();
		let mut conn = self.connection().await?;

		redis::cmd("DEL")
			.arg(&full_keys)
			.query_async(&mut *conn)
			.await
			.map_err(|e| command_error("delete multiple values from Redis", e))
	}

	async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
		let mut conn = self.connection().await?;
		let pattern = format!("{}*", escape_glob(&self.build_key(prefix)));
		let mut cursor: u64 = 0;
		let mut deleted = 0;

		// SCAN (non-blocking) + UNLINK (async deletion)
		loop {
			let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
				.arg(cursor)
				.arg("MATCH")
				.arg(&pattern)
				.arg("COUNT")
				.arg(SCAN_BATCH_SIZE)
				.query_async(&mut *conn)
				.await
				.map_err(|e| command_error("scan keys matching prefix", e))?;

			if !keys.is_empty() {
				let unlinked: u64 = redis::cmd("UNLINK")
					.arg(&keys)
					.query_async(&mut *conn)
					.await
					.map_err(|e| command_error("unlink keys", e))?;
				deleted += unlinked;
			}

			cursor = next_cursor;
			if cursor == 0 {
				break;
			}
		}

		tracing::debug!(prefix = %prefix, deleted, "deleted keys by prefix");
		Ok(deleted)
	}

	async fn exists(&self, key: &str) -> Result<bool> {
		let mut conn = self.connection().await?;
		let count: u64 = redis::cmd("EXISTS")
			.arg(self.build_key(key))
			.query_async(&mut *conn)
			.await
			.map_err(|e| command_error("check key existence in Redis", e))?;
		Ok(count > 0)
	}

	async fn expire(&self, key: &str, ttl: Option<Duration>) -> Result<bool> {
		let full_key = self.build_key(key);
		let mut conn = self.connection().await?;

		match ttl {
			Some(ttl) => {
				let updated: u64 = redis::cmd("PEXPIRE")
					.arg(&full_key)
					.arg(ttl_millis(ttl))
					.query_async(&mut *conn)
					.await
					.map_err(|e| command_error("set expiration in Redis", e))?;
				Ok(updated > 0)
			}
			None => {
				// PERSIST answers 0 for a key that is already persistent
				let count: u64 = redis::cmd("EXISTS")
					.arg(&full_key)
					.query_async(&mut *conn)
					.await
					.map_err(|e| command_error("check key existence in Redis", e))?;
				if count == 0 {
					return Ok(false);
				}
				let _: u64 = redis::cmd("PERSIST")
					.arg(&full_key)
					.query_async(&mut *conn)
					.await
					.map_err(|e| command_error("clear expiration in Redis", e))?;
				Ok(true)
			}
		}
	}

	async fn ttl(&self, key: &str) -> Result<KeyTtl> {
		let mut conn = self.connection().await?;
		let millis: i64 = redis::cmd("PTTL")
			.arg(self.build_key(key))
			.query_async(&mut *conn)
			.await
			.map_err(|e| command_error("read expiration from Redis", e))?;

		Ok(match millis {
			-2 => KeyTtl::Missing,
			-1 => KeyTtl::Persistent,
			ms => KeyTtl::Expires(Duration::from_millis(ms.max(0) as u64)),
		})
	}

	async fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64> {
		let full_key = self.build_key(key);
		let mut pipe = redis::pipe();
		pipe.atomic();
		if let Some(ttl) = ttl {
			// Creates the counter with its time to live; no-op when it exists
			pipe.cmd("SET")
				.arg(&full_key)
				.arg(0)
				.arg("NX")
				.arg("PX")
				.arg(ttl_millis(ttl))
				.ignore();
		}
		pipe.cmd("INCRBY").arg(&full_key).arg(delta);

		let mut conn = self.connection().await?;
		let (value,): (i64,) = pipe
			.query_async(&mut *conn)
			.await
			.map_err(|e| command_error("increment value in Redis", e))?;
		Ok(value)
	}
}
