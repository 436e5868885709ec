//! A track is a collection of semi-reliable and semi-ordered groups, split into a [TrackProducer] and [TrackConsumer] handle.
//!
//! A [TrackProducer] creates groups with a sequence number.
//! Groups arrive over independent transport streams, so they may be created
//! slightly out of order and may never finish.
//!
//! A [TrackConsumer] returns groups in arrival order.
//! Only a bounded window of groups is cached; once the window is exceeded the
//! oldest group is aborted with [Error::Old] and a slow consumer skips it.
//! A cloned consumer receives a copy of all unread groups going forward.

use std::{
	collections::VecDeque,
	fmt,
	future::Future,
	ops::Deref,
	sync::Arc,
};

use super::{Consumer, Group, GroupConsumer, GroupProducer, Produce, Producer};
use crate::{Error, Result};

// The maximum number of live groups buffered per track.
// The transport rarely has more than two in flight; the rest is slack for
// slow consumers.
const GROUP_CACHE: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
	/// The name of the track.
	pub name: String,

	/// Higher priority tracks will be served first during congestion.
	pub priority: u8,
}

impl Track {
	pub fn new(name: &str) -> Self {
		Self {
			name: name.to_string(),
			priority: 0,
		}
	}

	pub fn with_priority(mut self, priority: u8) -> Self {
		self.priority = priority;
		self
	}

	pub fn produce(self) -> Produce<TrackProducer, TrackConsumer> {
		let producer = TrackProducer::new(self);
		Produce {
			consumer: producer.consume(),
			producer,
		}
	}
}

impl<T: AsRef<str>> From<T> for Track {
	fn from(name: T) -> Self {
		Self::new(name.as_ref())
	}
}

/// Static information about a track.
///
/// Only used to make accessing the name easy/fast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackInfo {
	pub name: Arc<String>,
	pub priority: u8,
}

#[derive(Debug, Default)]
struct State {
	// Groups in arrival order.
	// If None, the group fell out of the cache window.
	groups: VecDeque<Option<GroupEntry>>,

	// +1 every time we remove a group from the front.
	offset: usize,

	// The highest sequence number received.
	max: Option<u64>,
}

#[derive(Debug)]
struct GroupEntry {
	// We need a producer in order to abort when evicted.
	producer: GroupProducer,

	// If we didn't hold a consumer, `unused()` would fire early.
	consumer: GroupConsumer,
}

impl State {
	fn insert(&mut self, group: GroupProducer) -> Result<()> {
		// As a sanity check, make sure this is not a duplicate.
		if self
			.groups
			.iter()
			.filter_map(|g| g.as_ref())
			.any(|g| g.producer.sequence == group.sequence)
		{
			return Err(Error::Duplicate);
		}

		self.max = Some(self.max.unwrap_or(0).max(group.sequence));

		self.groups.push_back(Some(GroupEntry {
			consumer: group.consume(),
			producer: group,
		}));

		// Evict the oldest group once the cache is full.
		let live = self.groups.iter().filter(|g| g.is_some()).count();
		if live > GROUP_CACHE {
			if let Some(entry) = self.groups.iter_mut().find(|g| g.is_some()) {
				let mut old = entry.take().expect("just matched");
				old.producer.abort(Error::Old).ok();
			}
		}

		// Don't let the front of the queue accumulate tombstones.
		while let Some(None) = self.groups.front() {
			self.groups.pop_front();
			self.offset += 1;
		}

		Ok(())
	}
}

/// A producer for a track, used to create new groups.
#[derive(Clone)]
pub struct TrackProducer {
	info: TrackInfo,
	state: Producer<State>,
}

impl TrackProducer {
	pub fn new<T: Into<Track>>(info: T) -> Self {
		let info = info.into();

		Self {
			state: Default::default(),
			info: TrackInfo {
				name: Arc::new(info.name),
				priority: info.priority,
			},
		}
	}

	pub fn info(&self) -> TrackInfo {
		self.info.clone()
	}

	/// Create a new group with the given sequence number.
	///
	/// Returns an error if the track is closed or the sequence is a duplicate.
	pub fn create_group<T: Into<Group>>(&mut self, info: T) -> Result<GroupProducer> {
		let group = GroupProducer::new(info.into());
		self.state.modify(|state| state.insert(group.clone()))??;
		Ok(group)
	}

	/// Create a new group with the next sequence number.
	pub fn append_group(&mut self) -> Result<GroupProducer> {
		let mut sequence = 0;
		self.state.modify(|state| {
			sequence = state.max.map(|max| max + 1).unwrap_or(0);
		})?;

		self.create_group(Group { sequence })
	}

	pub fn close(&mut self) -> Result<()> {
		self.state.close()
	}

	pub fn abort(&mut self, err: Error) -> Result<()> {
		self.state.abort(err)
	}

	/// Create a new consumer for the track.
	pub fn consume(&self) -> TrackConsumer {
		TrackConsumer {
			info: self.info.clone(),
			state: self.state.consume(),
			index: 0,
		}
	}

	/// Block until there are no active consumers.
	// We don't use the `async` keyword so we don't borrow &self across the await.
	pub fn unused(&self) -> impl Future<Output = ()> {
		self.state.unused()
	}

	/// Return true if this is the same track.
	pub fn is_clone(&self, other: &Self) -> bool {
		self.state.is_clone(&other.state)
	}
}

impl From<Track> for TrackProducer {
	fn from(info: Track) -> Self {
		TrackProducer::new(info)
	}
}

impl Deref for TrackProducer {
	type Target = TrackInfo;

	fn deref(&self) -> &Self::Target {
		&self.info
	}
}

impl fmt::Debug for TrackProducer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TrackProducer")
			.field("name", &self.info.name)
			.field("state", &self.state)
			.finish()
	}
}

/// A consumer for a track, used to read groups.
///
/// If the consumer is cloned, it will receive a copy of all unread groups.
#[derive(Clone)]
pub struct TrackConsumer {
	info: TrackInfo,
	state: Consumer<State>,

	// We last returned this group, factoring in offset.
	index: usize,
}

impl TrackConsumer {
	pub fn info(&self) -> TrackInfo {
		self.info.clone()
	}

	/// Return the next group in arrival order.
	///
	/// NOTE: This can have gaps if the consumer is too slow or there were network slowdowns.
	pub async fn next_group(&mut self) -> Result<Option<GroupConsumer>> {
		loop {
			// Wait until there's a new group or the track is closed.
			let state = self
				.state
				.wait_for(|state| self.index < state.offset + state.groups.len())
				.await?;

			if self.index >= state.offset + state.groups.len() {
				// Clean close with nothing left to read.
				return Ok(None);
			}

			for i in self.index.saturating_sub(state.offset)..state.groups.len() {
				// If None, the group was evicted before we got to it.
				if let Some(group) = &state.groups[i] {
					self.index = state.offset + i + 1;
					return Ok(Some(group.consumer.clone()));
				}
			}

			// Only tombstones remain; catch up and wait for the next group.
			self.index = state.offset + state.groups.len();
		}
	}

	/// Block until the track is closed.
	pub fn closed(&self) -> impl Future<Output = Result<()>> {
		let state = self.state.clone();
		async move { state.closed().await }
	}

	pub fn is_clone(&self, other: &Self) -> bool {
		self.state.is_clone(&other.state)
	}
}

impl Deref for TrackConsumer {
	type Target = TrackInfo;

	fn deref(&self) -> &Self::Target {
		&self.info
	}
}

impl fmt::Debug for TrackConsumer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TrackConsumer")
			.field("name", &self.info.name)
			.field("index", &self.index)
			.finish()
	}
}

#[cfg(test)]
use futures::FutureExt;

#[cfg(test)]
impl TrackConsumer {
	pub fn assert_group(&mut self) -> GroupConsumer {
		self.next_group()
			.now_or_never()
			.expect("group would have blocked")
			.expect("would have errored")
			.expect("track was closed")
	}

	pub fn assert_no_group(&mut self) {
		assert!(
			self.next_group().now_or_never().is_none(),
			"next group would not have blocked"
		);
	}

	pub fn assert_not_closed(&self) {
		assert!(self.closed().now_or_never().is_none(), "should not be closed");
	}

	pub fn assert_closed(&self) {
		assert!(self.closed().now_or_never().is_some(), "should be closed");
	}

	pub fn assert_error(&self) {
		assert!(
			self.closed().now_or_never().expect("should not block").is_err(),
			"should be error"
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn append() {
		let mut track = Track::new("video").produce();

		let group0 = track.producer.append_group().unwrap();
		assert_eq!(group0.sequence, 0);
		let group1 = track.producer.append_group().unwrap();
		assert_eq!(group1.sequence, 1);

		assert_eq!(track.consumer.assert_group().sequence, 0);
		assert_eq!(track.consumer.assert_group().sequence, 1);
		track.consumer.assert_no_group();
	}

	#[tokio::test]
	async fn out_of_order() {
		let mut track = Track::new("video").produce();

		track.producer.create_group(Group { sequence: 2 }).unwrap();
		track.producer.create_group(Group { sequence: 1 }).unwrap();

		// Arrival order, not sequence order.
		assert_eq!(track.consumer.assert_group().sequence, 2);
		assert_eq!(track.consumer.assert_group().sequence, 1);

		// The next append continues after the maximum.
		let group = track.producer.append_group().unwrap();
		assert_eq!(group.sequence, 3);
	}

	#[tokio::test]
	async fn duplicate() {
		let mut track = Track::new("video").produce();

		track.producer.create_group(Group { sequence: 1 }).unwrap();
		assert_eq!(
			track.producer.create_group(Group { sequence: 1 }).err(),
			Some(Error::Duplicate)
		);
	}

	#[tokio::test]
	async fn eviction() {
		let mut track = Track::new("video").produce();

		let first = track.producer.append_group().unwrap();

		for _ in 0..GROUP_CACHE {
			track.producer.append_group().unwrap();
		}

		// The first group fell out of the window.
		assert_eq!(first.consume().closed().await, Err(Error::Old));

		// The consumer skips it and starts at the survivor.
		assert_eq!(track.consumer.assert_group().sequence, 1);
	}

	#[tokio::test]
	async fn close() {
		let mut track = Track::new("video").produce();
		track.producer.append_group().unwrap();
		track.producer.close().unwrap();

		track.consumer.assert_group();
		assert!(track.consumer.next_group().await.unwrap().is_none());
		track.consumer.assert_closed();
	}

	#[tokio::test]
	async fn abort() {
		let mut track = Track::new("video").produce();
		track.producer.abort(Error::Cancel).unwrap();

		assert_eq!(track.consumer.next_group().await.err(), Some(Error::Cancel));
		track.consumer.assert_error();
	}

	#[tokio::test]
	async fn independent_consumers() {
		let mut track = Track::new("video").produce();
		let mut other = track.producer.consume();

		track.producer.append_group().unwrap();

		// Both consumers see the same group independently.
		assert_eq!(track.consumer.assert_group().sequence, 0);
		assert_eq!(other.assert_group().sequence, 0);
		other.assert_no_group();
	}
}
