//! A group is a stream of frames, split into a [GroupProducer] and [GroupConsumer] handle.
//!
//! A [GroupProducer] writes an ordered stream of frames.
//! Frames can be written all at once, or in chunks.
//!
//! A [GroupConsumer] reads an ordered stream of frames.
//! The consumer can be cloned, in which case each clone receives a copy of each frame. (fanout)
use std::ops::Deref;

use bytes::Bytes;

use super::{Consumer, Frame, FrameConsumer, FrameProducer, Producer};
use crate::{Error, Result};

/// A group contains a sequence number because they can arrive out of order.
///
/// You can use [crate::TrackProducer::append_group] if you just want to +1 the sequence number.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
	pub sequence: u64,
}

impl From<u64> for Group {
	fn from(sequence: u64) -> Self {
		Self { sequence }
	}
}

#[derive(Default, Debug)]
struct GroupState {
	// The frames that have been written thus far
	frames: Vec<FrameProducer>,
}

/// Create a group, frame-by-frame.
#[derive(Clone, Debug)]
pub struct GroupProducer {
	// Mutable stream state.
	state: Producer<GroupState>,
	info: Group,
}

impl GroupProducer {
	pub fn new(info: Group) -> Self {
		Self {
			info,
			state: Default::default(),
		}
	}

	pub fn info(&self) -> &Group {
		&self.info
	}

	/// A helper method to write a frame from a single byte buffer.
	///
	/// If you want to write multiple chunks, use [Self::create_frame].
	pub fn write_frame<B: Into<Bytes>>(&mut self, payload: B) -> Result<()> {
		let data = payload.into();
		let mut frame = self.create_frame(Frame { size: data.len() })?;
		frame.write_chunk(data)?;
		frame.close()?;

		Ok(())
	}

	/// Create a frame with an upfront size.
	pub fn create_frame(&mut self, info: Frame) -> Result<FrameProducer> {
		let frame = FrameProducer::new(info);
		self.state.modify(|state| state.frames.push(frame.clone()))?;
		Ok(frame)
	}

	// Clean termination of the group.
	pub fn close(&mut self) -> Result<()> {
		self.state.close()
	}

	pub fn abort(&mut self, err: Error) -> Result<()> {
		self.state.abort(err)
	}

	/// Create a new consumer for the group.
	pub fn consume(&self) -> GroupConsumer {
		GroupConsumer {
			info: self.info.clone(),
			state: self.state.consume(),
			index: 0,
			active: None,
		}
	}

	// We don't use the `async` keyword so we don't borrow &self across the await.
	pub async fn unused(&self) {
		self.state.unused().await
	}
}

impl Deref for GroupProducer {
	type Target = Group;

	fn deref(&self) -> &Self::Target {
		&self.info
	}
}

/// Consume a group, frame-by-frame.
///
/// If the consumer is cloned, it will receive a copy of all unread frames.
#[derive(Clone, Debug)]
pub struct GroupConsumer {
	// Modify the stream state.
	state: Consumer<GroupState>,

	// Immutable stream state.
	info: Group,

	// The number of frames we've read.
	// NOTE: Cloned readers inherit this offset, but then run in parallel.
	index: usize,

	// Used to make read_frame cancel safe.
	active: Option<FrameConsumer>,
}

impl GroupConsumer {
	pub fn info(&self) -> &Group {
		&self.info
	}

	/// Read the next frame, or None if the group ended cleanly.
	pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
		// In order to be cancel safe, we need to save the active frame.
		// That way if this method gets cancelled, we can resume where we left off.
		if self.active.is_none() {
			self.active = self.next_frame().await?;
		};

		// Read the frame in one go, which is cancel safe.
		let frame = match self.active.as_mut() {
			Some(frame) => frame.read_all().await?,
			None => return Ok(None),
		};

		self.active = None;

		Ok(Some(frame))
	}

	/// Return a reader for the next frame.
	pub async fn next_frame(&mut self) -> Result<Option<FrameConsumer>> {
		// Just in case someone called read_frame, cancelled it, then called next_frame.
		if let Some(frame) = self.active.take() {
			return Ok(Some(frame));
		}

		// Errors if the group was aborted; a clean close falls through below.
		let state = self.state.wait_for(|state| self.index < state.frames.len()).await?;

		if let Some(frame) = state.frames.get(self.index) {
			let frame = frame.consume();
			self.index += 1;
			return Ok(Some(frame));
		}

		Ok(None)
	}

	pub async fn closed(&self) -> Result<()> {
		self.state.closed().await
	}
}

impl Deref for GroupConsumer {
	type Target = Group;

	fn deref(&self) -> &Self::Target {
		&self.info
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn write_read() {
		let mut producer = GroupProducer::new(Group { sequence: 0 });
		let mut consumer = producer.consume();

		producer.write_frame(Bytes::from("hello")).unwrap();
		producer.close().unwrap();

		let data = consumer.read_frame().await.unwrap().unwrap();
		assert_eq!(data, Bytes::from("hello"));

		// No more frames
		assert!(consumer.read_frame().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn multiple_frames() {
		let mut producer = GroupProducer::new(Group { sequence: 5 });
		let mut consumer = producer.consume();

		producer.write_frame(Bytes::from("frame1")).unwrap();
		producer.write_frame(Bytes::from("frame2")).unwrap();
		producer.write_frame(Bytes::from("frame3")).unwrap();
		producer.close().unwrap();

		assert_eq!(consumer.read_frame().await.unwrap().unwrap(), Bytes::from("frame1"));
		assert_eq!(consumer.read_frame().await.unwrap().unwrap(), Bytes::from("frame2"));
		assert_eq!(consumer.read_frame().await.unwrap().unwrap(), Bytes::from("frame3"));
		assert!(consumer.read_frame().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn chunked() {
		let mut producer = GroupProducer::new(Group { sequence: 0 });
		let mut consumer = producer.consume();

		let mut frame = producer.create_frame(Frame { size: 10 }).unwrap();
		frame.write_chunk(Bytes::from("hello")).unwrap();
		frame.write_chunk(Bytes::from("world")).unwrap();
		frame.close().unwrap();
		producer.close().unwrap();

		let data = consumer.read_frame().await.unwrap().unwrap();
		assert_eq!(data, Bytes::from("helloworld"));
	}

	#[tokio::test]
	async fn wrong_size() {
		let mut producer = GroupProducer::new(Group { sequence: 0 });

		let mut frame = producer.create_frame(Frame { size: 4 }).unwrap();
		assert_eq!(frame.write_chunk(Bytes::from("hello")), Err(Error::WrongSize));

		let mut frame = producer.create_frame(Frame { size: 6 }).unwrap();
		frame.write_chunk(Bytes::from("hello")).unwrap();
		assert_eq!(frame.close(), Err(Error::WrongSize));
	}

	#[tokio::test]
	async fn fanout() {
		let mut producer = GroupProducer::new(Group { sequence: 0 });
		let mut consumer1 = producer.consume();
		let mut consumer2 = producer.consume();

		producer.write_frame(Bytes::from("data")).unwrap();
		producer.close().unwrap();

		assert_eq!(consumer1.read_frame().await.unwrap().unwrap(), Bytes::from("data"));
		assert_eq!(consumer2.read_frame().await.unwrap().unwrap(), Bytes::from("data"));
	}

	#[tokio::test]
	async fn abort() {
		let mut producer = GroupProducer::new(Group { sequence: 0 });
		let mut consumer = producer.consume();

		producer.write_frame(Bytes::from("data")).unwrap();
		producer.abort(Error::Cancel).unwrap();

		// The frame itself was closed before the abort, so it's still readable.
		let _ = consumer.read_frame().await;

		// But the group is in an error state.
		assert_eq!(consumer.closed().await, Err(Error::Cancel));
	}
}
