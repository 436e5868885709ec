use bytes::BufMut;

pub trait Encode {
	// Encode the value to the given writer.
	// Panics if the value doesn't fit in a QUIC varint; lengths never do.
	fn encode<W: BufMut>(&self, w: &mut W);
}

impl Encode for u8 {
	fn encode<W: BufMut>(&self, w: &mut W) {
		w.put_u8(*self);
	}
}

impl Encode for u64 {
	fn encode<W: BufMut>(&self, w: &mut W) {
		let value = *self;
		if value < (1 << 6) {
			w.put_u8(value as u8);
		} else if value < (1 << 14) {
			w.put_u16(value as u16 | (0b01 << 14));
		} else if value < (1 << 30) {
			w.put_u32(value as u32 | (0b10 << 30));
		} else if value < (1 << 62) {
			w.put_u64(value | (0b11 << 62));
		} else {
			panic!("varint bounds exceeded");
		}
	}
}

impl Encode for usize {
	fn encode<W: BufMut>(&self, w: &mut W) {
		(*self as u64).encode(w);
	}
}

impl Encode for &str {
	fn encode<W: BufMut>(&self, w: &mut W) {
		self.len().encode(w);
		w.put(self.as_bytes());
	}
}

impl Encode for String {
	fn encode<W: BufMut>(&self, w: &mut W) {
		self.as_str().encode(w)
	}
}

impl Encode for bytes::Bytes {
	fn encode<W: BufMut>(&self, w: &mut W) {
		self.len().encode(w);
		w.put_slice(self);
	}
}
