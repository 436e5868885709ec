use std::fmt;

use crate::coding::{Decode, DecodeError, Encode};

/// A broadcast path with segment-aware prefix matching.
///
/// A path is an ordered sequence of `/`-separated segments. Leading and
/// trailing slashes are trimmed on creation and runs of slashes are
/// collapsed, so `"/foo//bar/"` and `"foo/bar"` are the same path.
/// The empty path is valid and is a prefix of every path.
///
/// Prefix operations respect segment boundaries: `"foo"` is a prefix of
/// `"foo/bar"` but not of `"foobar"`.
///
/// # Examples
/// ```
/// use moq_sub::Path;
///
/// let path = Path::new("/foo/bar/");
/// assert_eq!(path.as_str(), "foo/bar");
/// assert!(path.has_prefix("foo"));
/// assert!(!path.has_prefix("fo"));
///
/// let joined = Path::new("foo").join("bar");
/// assert_eq!(joined, path);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Path(String);

impl Path {
	/// Create a new path, normalizing slashes.
	pub fn new<S: AsRef<str>>(path: S) -> Self {
		let trimmed = path.as_ref().trim_matches('/');

		if trimmed.contains("//") {
			let normalized = trimmed.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("/");
			Self(normalized)
		} else {
			Self(trimmed.to_string())
		}
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Check if this path starts with the given prefix, respecting segment boundaries.
	pub fn has_prefix<S: AsRef<str>>(&self, prefix: S) -> bool {
		self.strip_prefix(prefix).is_some()
	}

	/// Remove the given prefix, returning the remaining suffix.
	///
	/// Returns `None` if the prefix doesn't match on a segment boundary.
	pub fn strip_prefix<S: AsRef<str>>(&self, prefix: S) -> Option<Path> {
		let prefix = Path::new(prefix);
		if prefix.is_empty() {
			return Some(self.clone());
		}

		let rest = self.0.strip_prefix(prefix.as_str())?;
		match rest.strip_prefix('/') {
			Some(suffix) => Some(Path(suffix.to_string())),
			None if rest.is_empty() => Some(Path::default()),
			None => None,
		}
	}

	/// Append a suffix, inserting a separator as needed.
	pub fn join<S: AsRef<str>>(&self, suffix: S) -> Path {
		let suffix = Path::new(suffix);
		if self.is_empty() {
			return suffix;
		}
		if suffix.is_empty() {
			return self.clone();
		}

		Path(format!("{}/{}", self.0, suffix.0))
	}
}

impl From<&str> for Path {
	fn from(path: &str) -> Self {
		Self::new(path)
	}
}

impl From<String> for Path {
	fn from(path: String) -> Self {
		Self::new(path)
	}
}

impl From<&String> for Path {
	fn from(path: &String) -> Self {
		Self::new(path)
	}
}

impl AsRef<str> for Path {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Path {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Decode for Path {
	fn decode<B: bytes::Buf>(r: &mut B) -> Result<Self, DecodeError> {
		Ok(Self::new(String::decode(r)?))
	}
}

impl Encode for Path {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.0.encode(w)
	}
}
