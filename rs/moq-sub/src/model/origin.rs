use std::collections::HashMap;

use tokio::sync::mpsc;
use web_async::Lock;

use super::BroadcastConsumer;
use crate::Path;

/// A broadcast that was announced (or un-announced) under a prefix.
#[derive(Clone)]
pub struct Announced {
	/// The path of the broadcast, relative to the requested prefix.
	pub suffix: Path,

	/// The broadcast itself, or None if the announcement ended.
	pub broadcast: Option<BroadcastConsumer>,
}

impl Announced {
	pub fn is_active(&self) -> bool {
		self.broadcast.is_some()
	}
}

#[derive(Default)]
struct ProducerState {
	active: HashMap<Path, BroadcastConsumer>,
	consumers: Vec<ConsumerState>,
}

struct ConsumerState {
	prefix: Path,
	updates: mpsc::UnboundedSender<Announced>,
}

impl ConsumerState {
	// Returns true if the consumer is still alive.
	fn insert(&mut self, path: &Path, broadcast: &BroadcastConsumer) -> bool {
		match path.strip_prefix(&self.prefix) {
			Some(suffix) => self
				.updates
				.send(Announced {
					suffix,
					broadcast: Some(broadcast.clone()),
				})
				.is_ok(),
			None => !self.updates.is_closed(),
		}
	}

	fn remove(&mut self, path: &Path) -> bool {
		match path.strip_prefix(&self.prefix) {
			Some(suffix) => self.updates.send(Announced { suffix, broadcast: None }).is_ok(),
			None => !self.updates.is_closed(),
		}
	}
}

impl Drop for ProducerState {
	fn drop(&mut self) {
		for (path, _) in self.active.drain() {
			retain_mut_unordered(&mut self.consumers, |c| c.remove(&path));
		}
	}
}

// A faster version of retain_mut that doesn't maintain the order.
fn retain_mut_unordered<T, F: FnMut(&mut T) -> bool>(vec: &mut Vec<T>, mut f: F) {
	let mut i = 0;
	while let Some(item) = vec.get_mut(i) {
		if f(item) {
			i += 1;
		} else {
			vec.swap_remove(i);
		}
	}
}

/// Fans announced broadcasts out to any number of prefix listeners.
#[derive(Clone, Default)]
pub struct OriginProducer {
	state: Lock<ProducerState>,
}

impl OriginProducer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Publish a broadcast, announcing it to all consumers.
	///
	/// If there is already a broadcast with the same path it is replaced and
	/// re-announced; announcements are monotonic per path.
	pub fn publish<P: Into<Path>>(&mut self, path: P, broadcast: BroadcastConsumer) {
		let path = path.into();
		let mut state = self.state.lock();

		if state.active.remove(&path).is_some() {
			retain_mut_unordered(&mut state.consumers, |c| c.remove(&path));
		}

		state.active.insert(path.clone(), broadcast.clone());
		retain_mut_unordered(&mut state.consumers, |c| c.insert(&path, &broadcast));
	}

	/// Remove a broadcast, announcing the end to all consumers.
	pub fn unpublish(&mut self, path: &Path) {
		let mut state = self.state.lock();

		if state.active.remove(path).is_some() {
			retain_mut_unordered(&mut state.consumers, |c| c.remove(path));
		}
	}

	/// Get a specific broadcast by path, if it is currently announced.
	pub fn consume(&self, path: &Path) -> Option<BroadcastConsumer> {
		self.state.lock().active.get(path).cloned()
	}

	/// Subscribe to all announced broadcasts matching the prefix.
	///
	/// Broadcasts that are already active are replayed as announcements.
	pub fn announced<P: Into<Path>>(&self, prefix: P) -> OriginConsumer {
		let mut state = self.state.lock();

		let (tx, rx) = mpsc::unbounded_channel();
		let mut consumer = ConsumerState {
			prefix: prefix.into(),
			updates: tx,
		};

		for (path, broadcast) in &state.active {
			consumer.insert(path, broadcast);
		}
		state.consumers.push(consumer);

		OriginConsumer { updates: rx }
	}
}

/// Receives announcements for a path prefix, in order.
///
/// Dropping the consumer cancels the interest.
pub struct OriginConsumer {
	updates: mpsc::UnboundedReceiver<Announced>,
}

impl OriginConsumer {
	/// Return the next announcement, or None if the origin is gone.
	pub async fn next(&mut self) -> Option<Announced> {
		self.updates.recv().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Broadcast;
	use futures::FutureExt;

	fn assert_announced(consumer: &mut OriginConsumer, suffix: &str, active: bool) {
		let announced = consumer
			.next()
			.now_or_never()
			.expect("would have blocked")
			.expect("origin closed");
		assert_eq!(announced.suffix.as_str(), suffix);
		assert_eq!(announced.is_active(), active);
	}

	fn assert_pending(consumer: &mut OriginConsumer) {
		assert!(consumer.next().now_or_never().is_none(), "should have blocked");
	}

	#[tokio::test]
	async fn prefix_filter() {
		let mut origin = OriginProducer::new();
		let alice = Broadcast::new("room/alice").produce();
		let logs = Broadcast::new("logs/server").produce();

		origin.publish("room/alice", alice.consumer.clone());
		origin.publish("logs/server", logs.consumer.clone());

		let mut room = origin.announced("room");
		assert_announced(&mut room, "alice", true);
		assert_pending(&mut room);

		let mut all = origin.announced("");
		// Replayed in hash order; collect both.
		let mut seen = vec![];
		for _ in 0..2 {
			let announced = all.next().now_or_never().unwrap().unwrap();
			seen.push(announced.suffix.as_str().to_string());
		}
		seen.sort();
		assert_eq!(seen, ["logs/server", "room/alice"]);
	}

	#[tokio::test]
	async fn unpublish() {
		let mut origin = OriginProducer::new();
		let alice = Broadcast::new("room/alice").produce();

		let mut room = origin.announced("room");

		origin.publish("room/alice", alice.consumer.clone());
		assert_announced(&mut room, "alice", true);

		origin.unpublish(&Path::new("room/alice"));
		assert_announced(&mut room, "alice", false);
		assert!(origin.consume(&Path::new("room/alice")).is_none());
	}

	#[tokio::test]
	async fn replace() {
		let mut origin = OriginProducer::new();
		let old = Broadcast::new("cam").produce();
		let new = Broadcast::new("cam").produce();

		let mut all = origin.announced("");

		origin.publish("cam", old.consumer.clone());
		origin.publish("cam", new.consumer.clone());

		// The replacement cancels the previous announcement first.
		assert_announced(&mut all, "cam", true);
		assert_announced(&mut all, "cam", false);
		assert_announced(&mut all, "cam", true);

		let current = origin.consume(&Path::new("cam")).unwrap();
		assert!(current.is_clone(&new.consumer));
	}

	#[tokio::test]
	async fn closed() {
		let origin = OriginProducer::new();
		let mut all = origin.announced("");

		drop(origin);
		assert!(all.next().await.is_none());
	}
}
