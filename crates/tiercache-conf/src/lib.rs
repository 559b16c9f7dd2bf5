//! Configuration for tiercache
//!
//! Exposes the settings consumed by the cache tiers: the local entry bound,
//! default expiration policies, the remote store connection and the
//! invalidation topic name.

pub mod env;
pub mod settings;

pub use env::{Env, EnvError};
pub use settings::{
	CacheSettings, DEFAULT_ENV_PREFIX, DEFAULT_INVALIDATION_TOPIC, InvalidationSettings,
	LocalSettings, RemoteSettings, SettingsError,
};
