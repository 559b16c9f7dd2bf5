//! Environment variable handling
//!
//! Reads typed values from environment variables with an optional prefix.
//! An explicit variable map can be supplied instead of the process
//! environment, which keeps settings resolution testable without touching
//! global state.

use indexmap::IndexMap;
use std::env;

/// Environment variable reader with prefix support
#[derive(Debug, Clone, Default)]
pub struct Env {
	/// Optional prefix for environment variables (e.g., "TIERCACHE_")
	pub prefix: Option<String>,

	/// Variables to read instead of the process environment
	vars: Option<IndexMap<String, String>>,
}

impl Env {
	/// Create a reader over the process environment
	pub fn new() -> Self {
		Self {
			prefix: None,
			vars: None,
		}
	}

	/// Create a reader over an explicit set of variables
	///
	/// # Examples
	///
	/// ```
	/// use tiercache_conf::Env;
	///
	/// let env = Env::from_vars([("APP_TOPIC", "cache")]).with_prefix("APP_");
	/// assert_eq!(env.opt_str("TOPIC").unwrap(), Some("cache".to_string()));
	/// ```
	pub fn from_vars<I, K, V>(vars: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			prefix: None,
			vars: Some(
				vars.into_iter()
					.map(|(k, v)| (k.into(), v.into()))
					.collect(),
			),
		}
	}

	/// Set a prefix for all environment variable lookups
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = Some(prefix.into());
		self
	}

	fn get_key_name(&self, key: &str) -> String {
		match &self.prefix {
			Some(prefix) => format!("{}{}", prefix, key),
			None => key.to_string(),
		}
	}

	fn lookup(&self, full_key: &str) -> Option<String> {
		match &self.vars {
			Some(vars) => vars.get(full_key).cloned(),
			None => env::var(full_key).ok(),
		}
	}

	/// Read an optional string value
	pub fn opt_str(&self, key: &str) -> Result<Option<String>, EnvError> {
		let full_key = self.get_key_name(key);
		validate_env_var_name(&full_key)?;
		Ok(self.lookup(&full_key))
	}

	/// Read an optional unsigned integer value
	pub fn opt_u64(&self, key: &str) -> Result<Option<u64>, EnvError> {
		let full_key = self.get_key_name(key);
		validate_env_var_name(&full_key)?;

		match self.lookup(&full_key) {
			Some(val) => val
				.trim()
				.parse::<u64>()
				.map(Some)
				.map_err(|e| EnvError::ParseError {
					key: full_key,
					value_len: val.len(),
					error: e.to_string(),
				}),
			None => Ok(None),
		}
	}

	/// Read an optional boolean value
	pub fn opt_bool(&self, key: &str) -> Result<Option<bool>, EnvError> {
		let full_key = self.get_key_name(key);
		validate_env_var_name(&full_key)?;

		match self.lookup(&full_key) {
			Some(val) => parse_bool(&val)
				.map(Some)
				.map_err(|error| EnvError::ParseError {
					key: full_key,
					value_len: val.len(),
					error,
				}),
			None => Ok(None),
		}
	}
}

/// Parse a boolean the way environment variables usually spell them
pub fn parse_bool(value: &str) -> Result<bool, String> {
	match value.trim().to_lowercase().as_str() {
		"true" | "1" | "yes" | "on" => Ok(true),
		"false" | "0" | "no" | "off" | "" => Ok(false),
		other => Err(format!("invalid boolean value: {}", other)),
	}
}

/// Reject names the platform cannot represent
pub fn validate_env_var_name(name: &str) -> Result<(), EnvError> {
	if name.is_empty() {
		return Err(EnvError::InvalidVariableName {
			name: name.to_string(),
			reason: "environment variable name must not be empty".to_string(),
		});
	}

	if let Some(pos) = name.find(|c: char| c.is_control()) {
		return Err(EnvError::InvalidVariableName {
			name: name.to_string(),
			reason: format!(
				"environment variable name contains control character at position {}",
				pos
			),
		});
	}

	if name.contains('=') {
		return Err(EnvError::InvalidVariableName {
			name: name.to_string(),
			reason: "environment variable name must not contain '='".to_string(),
		});
	}

	Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
	#[error("Failed to parse environment variable '{key}' (value length: {value_len}): {error}")]
	ParseError {
		key: String,
		/// Length of the original value (stored instead of the raw value to prevent secret leakage)
		value_len: usize,
		error: String,
	},

	#[error("Invalid environment variable name '{name}': {reason}")]
	InvalidVariableName { name: String, reason: String },
}
