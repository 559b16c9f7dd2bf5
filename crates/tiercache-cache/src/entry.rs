//! Internal cache entry structure

use chrono::{DateTime, Utc};

/// Cache entry with expiration and last-modified version
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
	pub(crate) value: Vec<u8>,
	pub(crate) expires_at: Option<DateTime<Utc>>,
	pub(crate) version: u64,
}

impl CacheEntry {
	pub(crate) fn new(value: Vec<u8>, expires_at: Option<DateTime<Utc>>, version: u64) -> Self {
		Self {
			value,
			expires_at,
			version,
		}
	}

	pub(crate) fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at <= now)
	}
}
