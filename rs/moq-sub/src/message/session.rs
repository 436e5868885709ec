use crate::coding::{Decode, DecodeError, Encode};

/// Sent by the client on the session stream to negotiate a version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSetup {
	/// The versions the client supports, in preference order.
	pub versions: Vec<u64>,
}

impl Decode for ClientSetup {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let count = u64::decode(r)?;

		// Don't allocate more than 1024 elements upfront
		let mut versions = Vec::with_capacity(count.min(1024) as usize);
		for _ in 0..count {
			versions.push(u64::decode(r)?);
		}

		Ok(Self { versions })
	}
}

impl Encode for ClientSetup {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		(self.versions.len() as u64).encode(w);
		for version in &self.versions {
			version.encode(w);
		}
	}
}

/// Sent by the server in response, selecting a version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSetup {
	pub version: u64,
}

impl Decode for ServerSetup {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			version: u64::decode(r)?,
		})
	}
}

impl Encode for ServerSetup {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.version.encode(w);
	}
}
