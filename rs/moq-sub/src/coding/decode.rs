use bytes::{Buf, Bytes};

#[derive(thiserror::Error, Debug, Clone)]
pub enum DecodeError {
	/// More data is needed before the value can be decoded.
	#[error("short buffer")]
	Short,

	#[error("invalid value")]
	InvalidValue,

	#[error("invalid message type: {0}")]
	InvalidMessage(u64),

	#[error("invalid string: {0}")]
	InvalidString(#[from] std::string::FromUtf8Error),

	#[error("bounds exceeded")]
	BoundsExceeded,
}

pub trait Decode: Sized {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError>;
}

impl Decode for u8 {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		if !buf.has_remaining() {
			return Err(DecodeError::Short);
		}
		Ok(buf.get_u8())
	}
}

// QUIC variable-length integer: the two high bits of the first byte encode
// the total length (1, 2, 4, or 8 bytes).
impl Decode for u64 {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		if !buf.has_remaining() {
			return Err(DecodeError::Short);
		}

		let first = buf.chunk()[0];
		let size = 1usize << (first >> 6);
		if buf.remaining() < size {
			return Err(DecodeError::Short);
		}

		let mut value = (buf.get_u8() & 0b0011_1111) as u64;
		for _ in 1..size {
			value = (value << 8) | buf.get_u8() as u64;
		}

		Ok(value)
	}
}

impl Decode for usize {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let value = u64::decode(buf)?;
		value.try_into().map_err(|_| DecodeError::BoundsExceeded)
	}
}

impl Decode for String {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let size = usize::decode(buf)?;
		if buf.remaining() < size {
			return Err(DecodeError::Short);
		}

		let data = buf.copy_to_bytes(size);
		Ok(String::from_utf8(data.to_vec())?)
	}
}

impl Decode for Bytes {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let size = usize::decode(buf)?;
		if buf.remaining() < size {
			return Err(DecodeError::Short);
		}

		Ok(buf.copy_to_bytes(size))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::coding::Encode;

	fn roundtrip(value: u64) {
		let mut buf = Vec::new();
		value.encode(&mut buf);
		let mut slice = buf.as_slice();
		assert_eq!(u64::decode(&mut slice).unwrap(), value);
		assert!(slice.is_empty());
	}

	#[test]
	fn varint_sizes() {
		// One test value per encoded size class, plus the boundaries.
		for value in [0, 63, 64, 16383, 16384, 1_073_741_823, 1_073_741_824, (1 << 62) - 1] {
			roundtrip(value);
		}
	}

	#[test]
	fn varint_short() {
		// A 4-byte length prefix with only 2 bytes available.
		let mut buf: &[u8] = &[0b1000_0000, 0x01];
		assert!(matches!(u64::decode(&mut buf), Err(DecodeError::Short)));
	}

	#[test]
	fn string() {
		let mut buf = Vec::new();
		"hello".encode(&mut buf);
		let mut slice = buf.as_slice();
		assert_eq!(String::decode(&mut slice).unwrap(), "hello");
	}
}
