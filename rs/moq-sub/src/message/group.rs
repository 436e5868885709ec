use crate::coding::{Decode, DecodeError, Encode};

/// The first message on every group data stream.
///
/// Frames follow as a varint size plus that many payload bytes, until the
/// stream is finished (clean end) or reset (group abandoned).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupHeader {
	/// The subscription this group belongs to.
	pub subscribe: u64,

	/// The sequence number within the track.
	pub sequence: u64,
}

impl Decode for GroupHeader {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe: u64::decode(r)?,
			sequence: u64::decode(r)?,
		})
	}
}

impl Encode for GroupHeader {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.subscribe.encode(w);
		self.sequence.encode(w);
	}
}
