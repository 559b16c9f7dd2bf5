//! Cache statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of local cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatistics {
	/// Number of cache hits
	pub hits: u64,
	/// Number of cache misses (including expired entries)
	pub misses: u64,
	/// Total number of reads
	pub total_requests: u64,
	/// Entries removed to stay within the configured bound
	pub evictions: u64,
	/// Current number of entries, expired ones not yet swept included
	pub entry_count: u64,
}

impl CacheStatistics {
	/// Calculate hit rate (0.0 to 1.0)
	///
	/// # Examples
	///
	/// ```
	/// use tiercache_cache::CacheStatistics;
	///
	/// let mut stats = CacheStatistics::default();
	/// stats.hits = 75;
	/// stats.misses = 25;
	/// stats.total_requests = 100;
	///
	/// assert_eq!(stats.hit_rate(), 0.75);
	/// ```
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.hits as f64 / self.total_requests as f64
		}
	}

	/// Calculate miss rate (0.0 to 1.0)
	pub fn miss_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.misses as f64 / self.total_requests as f64
		}
	}
}

/// Snapshot of hybrid cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HybridStatistics {
	/// Statistics of the local tier
	pub local: CacheStatistics,
	/// Reads answered by the remote tier after a local miss
	pub remote_hits: u64,
	/// Reads that missed both tiers
	pub misses: u64,
	/// Invalidation messages applied from other instances
	pub invalidations_received: u64,
	/// Invalidation messages published by this instance
	pub invalidations_published: u64,
	/// Invalidation messages that could not be published
	pub publish_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counter(AtomicU64);

impl Counter {
	pub(crate) fn incr(&self) {
		self.0.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn get(&self) -> u64 {
		self.0.load(Ordering::Relaxed)
	}
}
