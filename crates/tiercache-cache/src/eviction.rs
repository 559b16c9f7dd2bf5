//! Ordered index over local entries for capacity eviction
//!
//! Entries are indexed by write version (least recently set first) and by
//! deadline (soonest expiry first), so the cache can pick the next victim
//! without scanning the whole map.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub(crate) struct EvictionIndex {
	by_version: BTreeMap<u64, (String, Option<DateTime<Utc>>)>,
	by_deadline: BTreeMap<(DateTime<Utc>, u64), String>,
}

impl EvictionIndex {
	pub(crate) fn track(&mut self, key: &str, version: u64, expires_at: Option<DateTime<Utc>>) {
		self.by_version.insert(version, (key.to_string(), expires_at));
		if let Some(deadline) = expires_at {
			self.by_deadline.insert((deadline, version), key.to_string());
		}
	}

	pub(crate) fn forget(&mut self, version: u64) {
		if let Some((_, Some(deadline))) = self.by_version.remove(&version) {
			self.by_deadline.remove(&(deadline, version));
		}
	}

	/// Next entry whose deadline has passed at `now`
	pub(crate) fn pop_expired(&mut self, now: DateTime<Utc>) -> Option<(String, u64)> {
		let (&(deadline, version), _) = self.by_deadline.first_key_value()?;
		if deadline > now {
			return None;
		}
		let key = self.by_deadline.remove(&(deadline, version))?;
		self.by_version.remove(&version);
		Some((key, version))
	}

	/// Least recently set entry other than `keep`
	pub(crate) fn pop_oldest(&mut self, keep: &str) -> Option<(String, u64)> {
		let version = self
			.by_version
			.iter()
			.find(|(_, (key, _))| key.as_str() != keep)
			.map(|(version, _)| *version)?;
		let (key, expires_at) = self.by_version.remove(&version)?;
		if let Some(deadline) = expires_at {
			self.by_deadline.remove(&(deadline, version));
		}
		Some((key, version))
	}

	pub(crate) fn len(&self) -> usize {
		self.by_version.len()
	}

	pub(crate) fn clear(&mut self) {
		self.by_version.clear();
		self.by_deadline.clear();
	}
}
