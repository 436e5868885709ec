use std::sync::Arc;

/// Error types for the playback pipeline.
#[derive(Debug, thiserror::Error, Clone)]
#[non_exhaustive]
pub enum Error {
	/// An error from the underlying MoQ transport layer.
	#[error("transport error: {0}")]
	Moq(#[from] moq_sub::Error),

	/// The catalog failed to parse; the previous catalog is kept.
	#[error("json error: {0}")]
	Json(Arc<serde_json::Error>),

	/// A group payload that doesn't follow its container format.
	#[error("malformed container: {0}")]
	MalformedContainer(&'static str),

	/// The timestamp is too large.
	#[error("timestamp overflow")]
	TimestampOverflow,

	/// The track must start with a keyframe.
	#[error("must start with a keyframe")]
	MissingKeyframe,

	/// No rendition in the catalog is decodable on this platform.
	#[error("no supported rendition")]
	Unsupported,

	/// The platform decoder surfaced an error mid-stream.
	#[error("decoder error: {0}")]
	Decoder(Arc<str>),

	/// The operation was cancelled; the waiter should drop the frame.
	#[error("cancelled")]
	Cancelled,
}

impl PartialEq for Error {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Error::Moq(a), Error::Moq(b)) => a == b,
			(Error::Json(a), Error::Json(b)) => Arc::ptr_eq(a, b),
			(Error::MalformedContainer(a), Error::MalformedContainer(b)) => a == b,
			(Error::TimestampOverflow, Error::TimestampOverflow) => true,
			(Error::MissingKeyframe, Error::MissingKeyframe) => true,
			(Error::Unsupported, Error::Unsupported) => true,
			(Error::Decoder(a), Error::Decoder(b)) => a == b,
			(Error::Cancelled, Error::Cancelled) => true,
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;

// Wrap in an Arc so it is Clone
impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Json(Arc::new(err))
	}
}

impl Error {
	pub fn decoder<E: std::fmt::Display>(err: E) -> Self {
		Error::Decoder(err.to_string().into())
	}
}
