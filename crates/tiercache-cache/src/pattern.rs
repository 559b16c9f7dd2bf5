//! Key patterns for bulk removal

use regex::Regex;
use tiercache_exception::{Error, Result};

/// A compiled key pattern
///
/// Glob patterns support `*` (any run of characters) and `?` (exactly one
/// character); every other character matches literally. Patterns always
/// match the whole key.
#[derive(Debug, Clone)]
pub struct KeyPattern {
	regex: Regex,
}

impl KeyPattern {
	/// Compile a glob pattern
	///
	/// # Examples
	///
	/// ```
	/// use tiercache_cache::KeyPattern;
	///
	/// let pattern = KeyPattern::glob("user:*:profile").unwrap();
	/// assert!(pattern.matches("user:42:profile"));
	/// assert!(!pattern.matches("user:42:settings"));
	/// ```
	pub fn glob(pattern: &str) -> Result<Self> {
		let mut source = String::with_capacity(pattern.len() + 8);
		source.push('^');
		for ch in pattern.chars() {
			match ch {
				'*' => source.push_str(".*"),
				'?' => source.push('.'),
				other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
			}
		}
		source.push('$');
		Self::compile(&source)
	}

	/// Compile a regular expression, anchored to the whole key
	pub fn regex(pattern: &str) -> Result<Self> {
		Self::compile(&format!("^(?:{})$", pattern))
	}

	fn compile(source: &str) -> Result<Self> {
		let regex = Regex::new(source)
			.map_err(|e| Error::InvalidArgument(format!("invalid key pattern: {}", e)))?;
		Ok(Self { regex })
	}

	/// Whether `key` matches this pattern
	pub fn matches(&self, key: &str) -> bool {
		self.regex.is_match(key)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("user:*", "user:1", true)]
	#[case("user:*", "user:", true)]
	#[case("user:*", "account:1", false)]
	#[case("user:?", "user:1", true)]
	#[case("user:?", "user:12", false)]
	#[case("a.b", "a.b", true)]
	#[case("a.b", "axb", false)]
	#[case("*:session", "tenant:session", true)]
	fn test_glob(#[case] pattern: &str, #[case] key: &str, #[case] expected: bool) {
		assert_eq!(KeyPattern::glob(pattern).unwrap().matches(key), expected);
	}

	#[test]
	fn test_regex_is_anchored() {
		let pattern = KeyPattern::regex(r"order:\d+").unwrap();
		assert!(pattern.matches("order:17"));
		assert!(!pattern.matches("order:17:items"));
		assert!(!pattern.matches("my-order:17"));
	}

	#[test]
	fn test_invalid_regex() {
		assert!(matches!(
			KeyPattern::regex("(unclosed"),
			Err(Error::InvalidArgument(_))
		));
	}
}
