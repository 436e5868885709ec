//! The legacy framed container.
//!
//! Each frame payload is a varint timestamp in microseconds followed by the
//! raw codec bitstream. The first frame of a group is the keyframe;
//! everything after it is a delta frame.

use bytes::{Buf, Bytes, BytesMut};
use moq_sub::coding::{Decode, Encode};

use crate::{Error, Result, Sample, Timestamp};

/// Decode a single frame payload.
///
/// `index` is the frame's position within its group; position zero is the
/// keyframe.
pub fn decode_frame(index: usize, payload: Bytes) -> Result<Sample> {
	let mut payload = payload;
	let micros = u64::decode(&mut payload).map_err(|_| Error::MalformedContainer("truncated timestamp"))?;

	Ok(Sample {
		timestamp: Timestamp::from_micros(micros),
		keyframe: index == 0,
		// The remainder of the buffer is the codec payload; no copy.
		payload,
	})
}

/// Encode a sample into a frame payload.
///
/// The keyframe flag is carried by group position, not by the payload, so it
/// is the caller's job to start a new group on a keyframe.
pub fn encode_frame(sample: &Sample) -> Bytes {
	let mut buf = BytesMut::with_capacity(8 + sample.payload.len());
	sample.timestamp.as_micros().encode(&mut buf);
	buf.extend_from_slice(&sample.payload);
	buf.freeze()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrip() {
		let sample = Sample {
			timestamp: Timestamp::from_micros(33_333),
			keyframe: true,
			payload: Bytes::from_static(b"keyframe NAL data"),
		};

		let encoded = encode_frame(&sample);
		let decoded = decode_frame(0, encoded).unwrap();

		assert_eq!(decoded.timestamp, sample.timestamp);
		assert_eq!(decoded.keyframe, sample.keyframe);
		assert_eq!(decoded.payload, sample.payload);
	}

	#[test]
	fn delta() {
		let sample = Sample {
			timestamp: Timestamp::from_micros(66_666),
			keyframe: false,
			payload: Bytes::from_static(b"delta NAL data"),
		};

		let decoded = decode_frame(1, encode_frame(&sample)).unwrap();
		assert!(!decoded.keyframe);
		assert_eq!(decoded.payload, sample.payload);
	}

	#[test]
	fn empty_payload() {
		let sample = Sample {
			timestamp: Timestamp::ZERO,
			keyframe: true,
			payload: Bytes::new(),
		};

		let decoded = decode_frame(0, encode_frame(&sample)).unwrap();
		assert!(decoded.payload.is_empty());
	}

	#[test]
	fn truncated() {
		assert!(decode_frame(0, Bytes::new()).is_err());
		// A multi-byte varint cut short.
		assert!(decode_frame(0, Bytes::from_static(&[0b1100_0000])).is_err());
	}

	#[test]
	fn remaining_is_payload() {
		// Make sure the varint length is accounted for exactly.
		let mut buf = BytesMut::new();
		16_384u64.encode(&mut buf); // 4-byte varint
		buf.extend_from_slice(&[1, 2, 3]);

		let sample = decode_frame(0, buf.freeze()).unwrap();
		assert_eq!(sample.timestamp.as_micros(), 16_384);
		assert_eq!(sample.payload.as_ref(), &[1, 2, 3]);
	}
}
