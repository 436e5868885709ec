use std::ops::Deref;

use bytes::{Bytes, BytesMut};

use super::{Consumer, Produce, Producer};
use crate::{Error, Result};

/// A unit of data within a group, delivered in one piece.
///
/// The payload is opaque to the transport; any media timestamp lives inside
/// the payload and is the container's business.
///
/// The size must be known upfront so readers can allocate and the writer is
/// kept honest.
#[derive(Clone, Debug)]
pub struct Frame {
	/// The size of the frame in bytes.
	pub size: usize,
}

impl Frame {
	/// Create a new producer and consumer for the frame.
	pub fn produce(self) -> Produce<FrameProducer, FrameConsumer> {
		let producer = FrameProducer::new(self);
		let consumer = producer.consume();
		Produce { producer, consumer }
	}
}

impl From<usize> for Frame {
	fn from(size: usize) -> Self {
		Self { size }
	}
}

#[derive(Default, Debug)]
struct FrameState {
	// The chunks that have been written thus far
	chunks: Vec<Bytes>,

	// Sanity check to ensure we don't write more than the frame size.
	remaining: usize,
}

impl FrameState {
	fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
		self.remaining = self.remaining.checked_sub(chunk.len()).ok_or(Error::WrongSize)?;
		self.chunks.push(chunk);
		Ok(())
	}
}

/// Used to write a frame's worth of data in chunks.
#[derive(Clone, Debug)]
pub struct FrameProducer {
	info: Frame,

	// Mutable stream state.
	state: Producer<FrameState>,
}

impl FrameProducer {
	pub fn new(info: Frame) -> Self {
		Self {
			state: Producer::new(FrameState {
				chunks: Vec::new(),
				remaining: info.size,
			}),
			info,
		}
	}

	pub fn info(&self) -> &Frame {
		&self.info
	}

	pub fn write_chunk<B: Into<Bytes>>(&mut self, chunk: B) -> Result<()> {
		self.state.modify(|state| state.write_chunk(chunk.into()))?
	}

	pub fn close(&mut self) -> Result<()> {
		if self.state.borrow().remaining != 0 {
			return Err(Error::WrongSize);
		}
		self.state.close()
	}

	pub fn abort(&mut self, err: Error) -> Result<()> {
		self.state.abort(err)
	}

	/// Create a new consumer for the frame.
	pub fn consume(&self) -> FrameConsumer {
		FrameConsumer {
			info: self.info.clone(),
			state: self.state.consume(),
			index: 0,
		}
	}
}

impl From<Frame> for FrameProducer {
	fn from(info: Frame) -> Self {
		FrameProducer::new(info)
	}
}

impl Deref for FrameProducer {
	type Target = Frame;

	fn deref(&self) -> &Self::Target {
		&self.info
	}
}

/// Used to consume a frame's worth of data in chunks.
///
/// If the consumer is cloned, it will receive a copy of all unread chunks.
#[derive(Clone, Debug)]
pub struct FrameConsumer {
	// Immutable stream state.
	info: Frame,

	// Modify the stream state.
	state: Consumer<FrameState>,

	// The number of chunks we've read.
	// NOTE: Cloned readers inherit this offset, but then run in parallel.
	index: usize,
}

impl FrameConsumer {
	pub fn info(&self) -> &Frame {
		&self.info
	}

	/// Return the next chunk.
	pub async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
		let state = self
			.state
			.wait_for(|state| state.chunks.get(self.index).is_some())
			.await?;

		if let Some(chunk) = state.chunks.get(self.index).cloned() {
			self.index += 1;
			Ok(Some(chunk))
		} else {
			Ok(None)
		}
	}

	/// Return all of the remaining chunks concatenated together.
	pub async fn read_all(&mut self) -> Result<Bytes> {
		// Wait until the writer is done before even attempting to read.
		// That way this function can be cancelled without consuming half of the frame.
		self.state.closed().await?;

		// Get all of the remaining chunks.
		let state = self.state.borrow();
		let chunks = &state.chunks[self.index..];
		self.index = state.chunks.len();

		// Common case: a frame written in one chunk can be returned without a copy.
		if chunks.len() == 1 {
			return Ok(chunks[0].clone());
		}

		// We know the final size so we can allocate the buffer upfront.
		let size = chunks.iter().map(Bytes::len).sum();
		let mut buf = BytesMut::with_capacity(size);

		for chunk in chunks {
			buf.extend_from_slice(chunk);
		}

		Ok(buf.freeze())
	}
}

impl Deref for FrameConsumer {
	type Target = Frame;

	fn deref(&self) -> &Self::Target {
		&self.info
	}
}
