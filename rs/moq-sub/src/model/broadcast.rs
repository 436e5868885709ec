use std::ops::Deref;

use super::{Consumer, Produce, Producer, Track, TrackConsumer, TrackProducer};
use crate::{Error, Path, Result};

/// A collection of tracks published together under a path.
///
/// Create via [Broadcast::produce] to obtain a [BroadcastProducer] and
/// [BroadcastConsumer] pair. The producer side is normally driven by the
/// session: each subscribed track shows up via
/// [BroadcastProducer::requested_track].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Broadcast {
	/// The path of the broadcast, relative to the session root.
	pub path: Path,
}

impl Broadcast {
	pub fn new<P: Into<Path>>(path: P) -> Self {
		Self { path: path.into() }
	}

	pub fn produce(self) -> Produce<BroadcastProducer, BroadcastConsumer> {
		let producer = BroadcastProducer::new(self);
		Produce {
			consumer: producer.consume(),
			producer,
		}
	}
}

/// Serve track requests for a broadcast.
pub struct BroadcastProducer {
	info: Broadcast,
	state: Producer<()>,
	requested: async_channel::Receiver<TrackProducer>,
	requests: async_channel::Sender<TrackProducer>,
}

impl BroadcastProducer {
	pub fn new(info: Broadcast) -> Self {
		let (requests, requested) = async_channel::unbounded();
		Self {
			info,
			state: Default::default(),
			requested,
			requests,
		}
	}

	pub fn info(&self) -> &Broadcast {
		&self.info
	}

	/// Return the next requested track, or None when all consumers are gone.
	///
	/// The caller is expected to start serving groups on the returned producer,
	/// or abort it if the track cannot be served.
	pub async fn requested_track(&mut self) -> Option<TrackProducer> {
		// We hold a sender ourselves (to mint consumers), so the channel never
		// closes on its own; bail out once the last consumer is gone instead.
		tokio::select! {
			biased;
			res = self.requested.recv() => res.ok(),
			_ = self.state.unused() => None,
		}
	}

	pub fn consume(&self) -> BroadcastConsumer {
		BroadcastConsumer {
			info: self.info.clone(),
			state: self.state.consume(),
			requests: self.requests.clone(),
		}
	}

	pub fn close(&mut self) -> Result<()> {
		self.requested.close();
		self.state.close()
	}

	pub fn abort(&mut self, err: Error) -> Result<()> {
		self.requested.close();
		self.state.abort(err)
	}

	/// Block until there are no more consumers.
	pub async fn unused(&self) {
		self.state.unused().await
	}

	pub fn is_clone(&self, other: &Self) -> bool {
		self.state.is_clone(&other.state)
	}
}

impl Clone for BroadcastProducer {
	fn clone(&self) -> Self {
		Self {
			info: self.info.clone(),
			state: self.state.clone(),
			requested: self.requested.clone(),
			requests: self.requests.clone(),
		}
	}
}

impl Drop for BroadcastProducer {
	fn drop(&mut self) {
		// The last producer handle drains any requests that were never served,
		// so their subscribers observe an error instead of hanging.
		if self.requested.receiver_count() > 1 {
			return;
		}

		self.requested.close();
		while let Ok(track) = self.requested.try_recv() {
			drop(track);
		}
	}
}

impl Deref for BroadcastProducer {
	type Target = Broadcast;

	fn deref(&self) -> &Self::Target {
		&self.info
	}
}

/// Subscribe to tracks within a broadcast.
#[derive(Clone)]
pub struct BroadcastConsumer {
	info: Broadcast,
	state: Consumer<()>,
	requests: async_channel::Sender<TrackProducer>,
}

impl BroadcastConsumer {
	pub fn info(&self) -> &Broadcast {
		&self.info
	}

	/// Subscribe to a track by name and priority.
	///
	/// Subscribing to the same track twice is permitted and yields independent
	/// consumers; each subscription is requested separately.
	pub fn subscribe<T: Into<Track>>(&self, track: T) -> Result<TrackConsumer> {
		let producer = TrackProducer::new(track);
		let consumer = producer.consume();

		// The producer side will serve (or abort) the track.
		self.requests.try_send(producer).map_err(|_| Error::Cancel)?;

		Ok(consumer)
	}

	/// Block until the broadcast is closed.
	pub async fn closed(&self) -> Result<()> {
		self.state.closed().await
	}

	/// Check if this is the exact same instance of a broadcast.
	///
	/// Duplicate paths are allowed in the case of resumption.
	pub fn is_clone(&self, other: &Self) -> bool {
		self.state.is_clone(&other.state)
	}
}

impl Deref for BroadcastConsumer {
	type Target = Broadcast;

	fn deref(&self) -> &Self::Target {
		&self.info
	}
}

#[cfg(test)]
use futures::FutureExt;

#[cfg(test)]
impl BroadcastProducer {
	pub fn assert_used(&self) {
		assert!(self.unused().now_or_never().is_none(), "should be used");
	}

	pub fn assert_unused(&self) {
		assert!(self.unused().now_or_never().is_some(), "should be unused");
	}

	pub fn assert_request(&mut self) -> TrackProducer {
		self.requested_track()
			.now_or_never()
			.expect("request would have blocked")
			.expect("no request")
	}

	pub fn assert_no_request(&mut self) {
		assert!(
			self.requested_track().now_or_never().is_none(),
			"request would not have blocked"
		);
	}
}

#[cfg(test)]
impl BroadcastConsumer {
	pub fn assert_not_closed(&self) {
		assert!(self.closed().now_or_never().is_none(), "should not be closed");
	}

	pub fn assert_closed(&self) {
		assert!(self.closed().now_or_never().is_some(), "should be closed");
	}

	pub fn assert_subscribe<T: Into<Track>>(&self, track: T) -> TrackConsumer {
		self.subscribe(track).expect("subscribe error")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn requests() {
		let mut broadcast = Broadcast::new("room/alice").produce();

		let mut sub = broadcast.consumer.assert_subscribe(Track::new("video").with_priority(1));

		let mut track = broadcast.producer.assert_request();
		assert_eq!(track.name.as_str(), "video");
		assert_eq!(track.priority, 1);
		broadcast.producer.assert_no_request();

		// Served groups reach the subscriber.
		track.append_group().unwrap();
		sub.assert_group();
	}

	#[tokio::test]
	async fn duplicate_subscriptions() {
		let mut broadcast = Broadcast::new("room/alice").produce();

		// Subscribing twice yields independent consumers and two requests.
		let mut sub1 = broadcast.consumer.assert_subscribe("video");
		let mut sub2 = broadcast.consumer.assert_subscribe("video");
		assert!(!sub1.is_clone(&sub2));

		let mut track1 = broadcast.producer.assert_request();
		let mut track2 = broadcast.producer.assert_request();

		track1.append_group().unwrap();
		sub1.assert_group();
		sub2.assert_no_group();

		track2.append_group().unwrap();
		sub2.assert_group();
	}

	#[tokio::test]
	async fn unused() {
		let broadcast = Broadcast::default().produce();
		let producer = broadcast.producer;
		producer.assert_used();

		let consumer2 = broadcast.consumer.clone();
		drop(broadcast.consumer);
		producer.assert_used();

		drop(consumer2);
		producer.assert_unused();
	}

	#[tokio::test]
	async fn closed() {
		let broadcast = Broadcast::default().produce();

		// The pending request dies with the producer.
		let sub = broadcast.consumer.assert_subscribe("video");

		broadcast.consumer.assert_not_closed();
		drop(broadcast.producer);
		broadcast.consumer.assert_closed();

		sub.assert_error();

		// New subscriptions fail immediately.
		assert_eq!(broadcast.consumer.subscribe("audio").err(), Some(Error::Cancel));
	}
}
