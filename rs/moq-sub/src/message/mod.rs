//! Wire messages for the subscription protocol.
//!
//! Control streams are bidirectional and start with a [ControlType].
//! Data streams are unidirectional and start with a [DataType].

mod announce;
mod group;
mod session;
mod subscribe;

pub use announce::*;
pub use group::*;
pub use session::*;
pub use subscribe::*;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::coding::{Decode, DecodeError, Encode};

/// The single protocol version this crate speaks.
pub const VERSION: u64 = 0xff0bad00;

#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum ControlType {
	Session = 0,
	Announce = 1,
	Subscribe = 2,
}

impl Decode for ControlType {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let t = u64::decode(r)?;
		t.try_into().map_err(|_| DecodeError::InvalidMessage(t))
	}
}

impl Encode for ControlType {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		let v: u64 = (*self).into();
		v.encode(w)
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum DataType {
	Group = 0,
}

impl Decode for DataType {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let t = u64::decode(r)?;
		t.try_into().map_err(|_| DecodeError::InvalidMessage(t))
	}
}

impl Encode for DataType {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		let v: u64 = (*self).into();
		v.encode(w)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Path;

	fn roundtrip<T: Encode + Decode + std::fmt::Debug + PartialEq>(msg: T) {
		let mut buf = Vec::new();
		msg.encode(&mut buf);
		let mut slice = buf.as_slice();
		assert_eq!(T::decode(&mut slice).unwrap(), msg);
		assert!(slice.is_empty(), "trailing bytes after decode");
	}

	#[test]
	fn setup() {
		roundtrip(ClientSetup {
			versions: vec![VERSION, 17],
		});
		roundtrip(ServerSetup { version: VERSION });
	}

	#[test]
	fn announce() {
		roundtrip(AnnouncePlease {
			prefix: Path::new("room/alice"),
		});
		roundtrip(Announce::Active {
			suffix: Path::new("camera"),
		});
		roundtrip(Announce::Ended {
			suffix: Path::default(),
		});
	}

	#[test]
	fn subscribe() {
		roundtrip(Subscribe {
			id: 7,
			broadcast: Path::new("room/alice/camera"),
			track: "video0".to_string(),
			priority: 1,
		});
		roundtrip(SubscribeOk { priority: 1 });
	}

	#[test]
	fn group() {
		roundtrip(GroupHeader {
			subscribe: 7,
			sequence: 42,
		});
	}
}
