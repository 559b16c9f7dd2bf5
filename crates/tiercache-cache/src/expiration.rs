//! Expiration policy
//!
//! Every expiration is normalized to an absolute UTC instant before it is stored
//! or compared, so callers may pass relative durations or timestamps in any time
//! zone without clock-kind mismatches.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::time::Duration;

/// When a cache entry stops being visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
	/// The entry lives until removed or evicted
	Never,
	/// The entry expires after the given duration, measured from the write
	In(Duration),
	/// The entry expires at the given instant
	At(DateTime<Utc>),
}

/// Remaining lifetime of an entry at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifetime {
	Unbounded,
	For(Duration),
	Elapsed,
}

impl Expiration {
	/// Build an absolute expiration from a timestamp in any time zone
	///
	/// # Examples
	///
	/// ```
	/// use chrono::{FixedOffset, TimeZone, Utc};
	/// use tiercache_cache::Expiration;
	///
	/// let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
	/// let local = tokyo.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
	/// let utc = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
	///
	/// assert_eq!(Expiration::at(local), Expiration::At(utc));
	/// ```
	pub fn at<Tz: TimeZone>(instant: DateTime<Tz>) -> Self {
		Expiration::At(instant.with_timezone(&Utc))
	}

	/// Absolute deadline relative to `now`; `None` means the entry never expires
	///
	/// Durations too large to represent are treated as never expiring.
	pub fn deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
		match self {
			Expiration::Never => None,
			Expiration::In(duration) => TimeDelta::from_std(*duration)
				.ok()
				.and_then(|delta| now.checked_add_signed(delta)),
			Expiration::At(instant) => Some(*instant),
		}
	}

	/// Whether an entry written at `now` with this expiration is already absent
	pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
		self.deadline(now).is_some_and(|deadline| deadline <= now)
	}

	pub(crate) fn lifetime(&self, now: DateTime<Utc>) -> Lifetime {
		match self.deadline(now) {
			None => Lifetime::Unbounded,
			Some(deadline) if deadline <= now => Lifetime::Elapsed,
			Some(deadline) => match (deadline - now).to_std() {
				Ok(remaining) => Lifetime::For(remaining),
				Err(_) => Lifetime::Elapsed,
			},
		}
	}

	/// Pick the explicit expiration, falling back to a default duration
	pub(crate) fn or_default(explicit: Option<Expiration>, default: Option<Duration>) -> Self {
		explicit
			.or(default.map(Expiration::In))
			.unwrap_or(Expiration::Never)
	}
}

impl From<Duration> for Expiration {
	fn from(duration: Duration) -> Self {
		Expiration::In(duration)
	}
}

impl From<DateTime<Utc>> for Expiration {
	fn from(instant: DateTime<Utc>) -> Self {
		Expiration::At(instant)
	}
}
