//! Error types for tiercache
//!
//! Cache misses and failed add/replace preconditions are not errors: they surface
//! as `Ok(None)` and `Ok(false)`. This crate only covers failures that callers must
//! see, which are passed through from the backing store, the invalidation bus or
//! the serialization layer.

use thiserror::Error;

/// Errors produced by cache operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
	/// A value could not be serialized or deserialized.
	#[error("Serialization error: {0}")]
	Serialization(String),

	/// The backing store rejected or failed an operation.
	#[error("Backend error: {0}")]
	Backend(String),

	/// A connection to the backing store or bus could not be obtained.
	#[error("Connection error: {0}")]
	Connection(String),

	/// An argument was invalid for the stored data (e.g. incrementing a non-integer).
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// The cache was configured with invalid settings.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Serialization(err.to_string())
	}
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
