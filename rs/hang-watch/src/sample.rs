use bytes::Bytes;

use crate::Timestamp;

/// A codec sample extracted from a container payload.
///
/// This is the unit handed to the platform decoder: a presentation
/// timestamp, whether the sample can be decoded independently, and the raw
/// codec bitstream. The payload owns its bytes; it does not borrow from the
/// group buffer it was parsed out of.
#[derive(Clone)]
pub struct Sample {
	pub timestamp: Timestamp,

	/// Whether this sample is a keyframe (can be decoded independently).
	pub keyframe: bool,

	pub payload: Bytes,
}

impl std::fmt::Debug for Sample {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Sample")
			.field("timestamp", &self.timestamp)
			.field("keyframe", &self.keyframe)
			.field("payload", &format_args!("{} bytes", self.payload.len()))
			.finish()
	}
}
