//! Cache settings
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables (`TIERCACHE_` prefix by default).
//!
//! ```toml
//! [local]
//! max_entries = 10000
//! default_expiration_secs = 300
//!
//! [remote]
//! url = "redis://localhost:6379"
//! key_prefix = "myapp"
//!
//! [invalidation]
//! topic = "cache"
//! ```

use crate::env::{Env, EnvError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default topic used for invalidation messages
pub const DEFAULT_INVALIDATION_TOPIC: &str = "cache";

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "TIERCACHE_";

/// Top-level cache settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
	pub local: LocalSettings,
	pub remote: RemoteSettings,
	pub invalidation: InvalidationSettings,
}

/// Settings for the process-local tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
	/// Maximum number of entries before eviction kicks in (unbounded when absent)
	pub max_entries: Option<usize>,
	/// Expiration applied when a write does not specify one (never when absent)
	pub default_expiration_secs: Option<u64>,
	/// Interval of the background sweep of expired entries (lazy only when absent)
	pub cleanup_interval_secs: Option<u64>,
}

impl LocalSettings {
	pub fn default_expiration(&self) -> Option<Duration> {
		self.default_expiration_secs.map(Duration::from_secs)
	}

	pub fn cleanup_interval(&self) -> Option<Duration> {
		self.cleanup_interval_secs.map(Duration::from_secs)
	}
}

/// Settings for the shared tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
	/// Connection URL of the backing store
	pub url: String,
	/// Namespace prepended to every key as `prefix:key`
	pub key_prefix: Option<String>,
	/// Maximum number of pooled connections
	pub pool_max_size: usize,
	/// Expiration applied when a write does not specify one (never when absent)
	pub default_expiration_secs: Option<u64>,
}

impl Default for RemoteSettings {
	fn default() -> Self {
		Self {
			url: "redis://127.0.0.1:6379".to_string(),
			key_prefix: None,
			pool_max_size: 16,
			default_expiration_secs: None,
		}
	}
}

impl RemoteSettings {
	pub fn default_expiration(&self) -> Option<Duration> {
		self.default_expiration_secs.map(Duration::from_secs)
	}
}

/// Settings for the invalidation bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationSettings {
	/// Topic (channel) name shared by every process using the same store
	pub topic: String,
}

impl Default for InvalidationSettings {
	fn default() -> Self {
		Self {
			topic: DEFAULT_INVALIDATION_TOPIC.to_string(),
		}
	}
}

/// Errors raised while loading settings
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("Environment error: {0}")]
	Env(#[from] EnvError),

	#[error("Invalid setting '{field}': {message}")]
	Invalid { field: String, message: String },
}

impl CacheSettings {
	/// Parse settings from a TOML document; missing fields take defaults
	///
	/// # Examples
	///
	/// ```
	/// use tiercache_conf::CacheSettings;
	///
	/// let settings = CacheSettings::from_toml_str("[local]\nmax_entries = 100\n").unwrap();
	/// assert_eq!(settings.local.max_entries, Some(100));
	/// assert_eq!(settings.invalidation.topic, "cache");
	/// ```
	pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
		let settings: Self = toml::from_str(content)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Load settings from a TOML file, falling back to defaults if it does not exist
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let path = path.as_ref();
		if !path.exists() {
			tracing::debug!(path = %path.display(), "settings file not found, using defaults");
			return Ok(Self::default());
		}
		let content = fs::read_to_string(path)?;
		Self::from_toml_str(&content)
	}

	/// Load settings from an optional file and the process environment
	pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
		let settings = match path {
			Some(path) => Self::from_file(path)?,
			None => Self::default(),
		};
		settings.with_env(&Env::new().with_prefix(DEFAULT_ENV_PREFIX))
	}

	/// Apply environment overrides on top of these settings
	///
	/// Recognized keys (after the reader's prefix): `LOCAL_MAX_ENTRIES`,
	/// `LOCAL_DEFAULT_EXPIRATION_SECS`, `LOCAL_CLEANUP_INTERVAL_SECS`,
	/// `REMOTE_URL`, `REMOTE_KEY_PREFIX`, `REMOTE_POOL_MAX_SIZE`,
	/// `REMOTE_DEFAULT_EXPIRATION_SECS`, `INVALIDATION_TOPIC`.
	pub fn with_env(mut self, env: &Env) -> Result<Self, SettingsError> {
		if let Some(max) = env.opt_u64("LOCAL_MAX_ENTRIES")? {
			self.local.max_entries = Some(platform_size("local.max_entries", max)?);
		}
		if let Some(secs) = env.opt_u64("LOCAL_DEFAULT_EXPIRATION_SECS")? {
			self.local.default_expiration_secs = Some(secs);
		}
		if let Some(secs) = env.opt_u64("LOCAL_CLEANUP_INTERVAL_SECS")? {
			self.local.cleanup_interval_secs = Some(secs);
		}
		if let Some(url) = env.opt_str("REMOTE_URL")? {
			self.remote.url = url;
		}
		if let Some(prefix) = env.opt_str("REMOTE_KEY_PREFIX")? {
			self.remote.key_prefix = Some(prefix).filter(|p| !p.is_empty());
		}
		if let Some(size) = env.opt_u64("REMOTE_POOL_MAX_SIZE")? {
			self.remote.pool_max_size = platform_size("remote.pool_max_size", size)?;
		}
		if let Some(secs) = env.opt_u64("REMOTE_DEFAULT_EXPIRATION_SECS")? {
			self.remote.default_expiration_secs = Some(secs);
		}
		if let Some(topic) = env.opt_str("INVALIDATION_TOPIC")? {
			self.invalidation.topic = topic;
		}

		self.validate()?;
		Ok(self)
	}

	/// Check cross-field constraints
	pub fn validate(&self) -> Result<(), SettingsError> {
		if self.local.max_entries == Some(0) {
			return Err(invalid("local.max_entries", "must be greater than zero"));
		}
		if self.local.cleanup_interval_secs == Some(0) {
			return Err(invalid(
				"local.cleanup_interval_secs",
				"must be greater than zero",
			));
		}
		if self.remote.pool_max_size == 0 {
			return Err(invalid("remote.pool_max_size", "must be greater than zero"));
		}
		if self.invalidation.topic.trim().is_empty() {
			return Err(invalid("invalidation.topic", "must not be empty"));
		}
		Ok(())
	}
}

fn platform_size(field: &str, value: u64) -> Result<usize, SettingsError> {
	usize::try_from(value).map_err(|_| invalid(field, "too large for this platform"))
}

fn invalid(field: &str, message: &str) -> SettingsError {
	SettingsError::Invalid {
		field: field.to_string(),
		message: message.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_defaults() {
		let settings = CacheSettings::default();
		assert_eq!(settings.local.max_entries, None);
		assert_eq!(settings.local.default_expiration(), None);
		assert_eq!(settings.invalidation.topic, DEFAULT_INVALIDATION_TOPIC);
		assert_eq!(settings.remote.pool_max_size, 16);
		assert!(settings.validate().is_ok());
	}

	#[test]
	fn test_parse_full_document() {
		let settings = CacheSettings::from_toml_str(
			r#"
			[local]
			max_entries = 250
			default_expiration_secs = 60

			[remote]
			url = "redis://cache.internal:6380"
			key_prefix = "tenant-a"

			[invalidation]
			topic = "tenant-a-cache"
			"#,
		)
		.unwrap();

		assert_eq!(settings.local.max_entries, Some(250));
		assert_eq!(
			settings.local.default_expiration(),
			Some(Duration::from_secs(60))
		);
		assert_eq!(settings.remote.url, "redis://cache.internal:6380");
		assert_eq!(settings.remote.key_prefix.as_deref(), Some("tenant-a"));
		assert_eq!(settings.invalidation.topic, "tenant-a-cache");
	}

	#[test]
	fn test_zero_bound_rejected() {
		let err = CacheSettings::from_toml_str("[local]\nmax_entries = 0\n").unwrap_err();
		assert!(matches!(err, SettingsError::Invalid { ref field, .. } if field == "local.max_entries"));
	}

	#[test]
	fn test_env_overrides_file_values() {
		let env = Env::from_vars([
			("TIERCACHE_LOCAL_MAX_ENTRIES", "42"),
			("TIERCACHE_INVALIDATION_TOPIC", "override"),
			("TIERCACHE_REMOTE_KEY_PREFIX", ""),
		])
		.with_prefix(DEFAULT_ENV_PREFIX);

		let base = CacheSettings::from_toml_str("[remote]\nkey_prefix = \"a\"\n").unwrap();
		let settings = base.with_env(&env).unwrap();

		assert_eq!(settings.local.max_entries, Some(42));
		assert_eq!(settings.invalidation.topic, "override");
		assert_eq!(settings.remote.key_prefix, None);
	}

	#[test]
	fn test_oversized_env_counts_not_truncated() {
		let env = Env::from_vars([
			("TIERCACHE_LOCAL_MAX_ENTRIES", "18446744073709551615"),
			("TIERCACHE_REMOTE_POOL_MAX_SIZE", "4294967296"),
		])
		.with_prefix(DEFAULT_ENV_PREFIX);
		let result = CacheSettings::default().with_env(&env);

		if usize::BITS >= 64 {
			let settings = result.unwrap();
			assert_eq!(settings.local.max_entries, Some(usize::MAX));
			assert_eq!(settings.remote.pool_max_size as u64, 4_294_967_296);
		} else {
			assert!(matches!(
				result,
				Err(SettingsError::Invalid { ref field, .. }) if field == "local.max_entries"
			));
		}
	}

	#[test]
	fn test_platform_size_rejects_overflow() {
		match usize::try_from(u64::MAX) {
			Ok(max) => assert_eq!(platform_size("f", u64::MAX).unwrap(), max),
			Err(_) => assert!(platform_size("f", u64::MAX).is_err()),
		}
		assert_eq!(platform_size("f", 16).unwrap(), 16);
	}

	#[test]
	fn test_empty_topic_from_env_rejected() {
		let env = Env::from_vars([("TIERCACHE_INVALIDATION_TOPIC", "  ")])
			.with_prefix(DEFAULT_ENV_PREFIX);
		assert!(CacheSettings::default().with_env(&env).is_err());
	}

	#[test]
	fn test_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[local]\ncleanup_interval_secs = 30").unwrap();

		let settings = CacheSettings::from_file(file.path()).unwrap();
		assert_eq!(
			settings.local.cleanup_interval(),
			Some(Duration::from_secs(30))
		);
	}

	#[test]
	fn test_missing_file_uses_defaults() {
		let settings = CacheSettings::from_file("/nonexistent/tiercache.toml").unwrap();
		assert_eq!(settings, CacheSettings::default());
	}
}
