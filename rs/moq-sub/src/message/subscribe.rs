use crate::{
	coding::{Decode, DecodeError, Encode},
	Path,
};

/// Sent by the subscriber to request all future groups for the given track.
///
/// Groups will use the provided ID instead of the full track name, to save bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscribe {
	pub id: u64,
	pub broadcast: Path,
	pub track: String,
	pub priority: u8,
}

impl Decode for Subscribe {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			id: u64::decode(r)?,
			broadcast: Path::decode(r)?,
			track: String::decode(r)?,
			priority: u8::decode(r)?,
		})
	}
}

impl Encode for Subscribe {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.id.encode(w);
		self.broadcast.encode(w);
		self.track.encode(w);
		self.priority.encode(w);
	}
}

/// Sent by the publisher to accept a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeOk {
	/// The priority the publisher actually uses for this track.
	pub priority: u8,
}

impl Decode for SubscribeOk {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			priority: u8::decode(r)?,
		})
	}
}

impl Encode for SubscribeOk {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.priority.encode(w);
	}
}
