use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
	coding::{Decode, DecodeError, Encode},
	Path,
};

/// Sent by the subscriber to request ANNOUNCE messages for a prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnouncePlease {
	pub prefix: Path,
}

impl Decode for AnnouncePlease {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			prefix: Path::decode(r)?,
		})
	}
}

impl Encode for AnnouncePlease {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.prefix.encode(w)
	}
}

/// Sent by the publisher when a broadcast becomes (un)available.
/// The suffix is relative to the requested prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Announce {
	Active { suffix: Path },
	Ended { suffix: Path },
}

/// Used to determine the message that follows.
#[derive(Clone, Copy, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
enum AnnounceStatus {
	Ended = 0,
	Active = 1,
}

impl Decode for Announce {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let status: AnnounceStatus = u8::decode(r)?.try_into().map_err(|_| DecodeError::InvalidValue)?;
		let suffix = Path::decode(r)?;

		Ok(match status {
			AnnounceStatus::Active => Self::Active { suffix },
			AnnounceStatus::Ended => Self::Ended { suffix },
		})
	}
}

impl Encode for Announce {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		match self {
			Self::Active { suffix } => {
				(AnnounceStatus::Active as u8).encode(w);
				suffix.encode(w);
			}
			Self::Ended { suffix } => {
				(AnnounceStatus::Ended as u8).encode(w);
				suffix.encode(w);
			}
		}
	}
}
