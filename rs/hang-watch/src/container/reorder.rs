//! Merges frames from concurrently delivered groups in timestamp order.
//!
//! Legacy tracks deliver each group on its own transport stream, so a track
//! switch or a congested link can have two groups in flight at once. The
//! decoder needs samples in timestamp order; this type buffers just long
//! enough to interleave them, bounded by a latency budget.

use std::{cmp::Reverse, collections::VecDeque, time::Duration};

use futures::{stream::FuturesUnordered, StreamExt};
use priority_queue::PriorityQueue;
use tokio::time::Instant;

use super::legacy;
use crate::{Result, Sample, Timestamp};

/// A reorder buffer over a legacy track's groups.
///
/// The policy, per sample:
/// - Hold a sample until every open group has buffered a sample at or past
///   its timestamp (quorum), or until its hold deadline
///   (`arrival + latency`) expires.
/// - Samples older than the last released timestamp are dropped silently.
/// - A group that ends or is lost simply leaves the quorum.
pub struct Reorder {
	track: moq_sub::TrackConsumer,
	latency: Duration,

	// Open groups, in arrival order.
	groups: Vec<GroupReader>,

	// Head sample of each group, keyed by (timestamp, sequence) ascending.
	heads: PriorityQueue<u64, Reverse<(u64, u64)>>,

	// The last released timestamp; anything older is stale.
	released: Option<Timestamp>,

	track_done: bool,
}

impl Reorder {
	pub fn new(track: moq_sub::TrackConsumer, latency: Duration) -> Self {
		Self {
			track,
			latency,
			groups: Vec::new(),
			heads: PriorityQueue::new(),
			released: None,
			track_done: false,
		}
	}

	/// Adjust the latency budget at runtime.
	pub fn set_latency(&mut self, latency: Duration) {
		self.latency = latency;
	}

	/// Return the next sample in presentation order.
	///
	/// Returns `None` once the track has ended and all groups are drained.
	pub async fn next(&mut self) -> Result<Option<Sample>> {
		loop {
			// Drop groups with nothing left to give.
			self.groups.retain(|group| !group.exhausted());

			// Index the head of each group.
			self.heads.clear();
			for group in &self.groups {
				if let Some((sample, _)) = group.buffered.front() {
					self.heads
						.push(group.sequence, Reverse((sample.timestamp.as_micros(), group.sequence)));
				}
			}

			// Quorum: every open group has produced its next sample, so the
			// minimum across heads is safe to release.
			let quorum = !self.heads.is_empty() && self.groups.iter().all(|g| !g.buffered.is_empty() || g.done);

			let mut deadline = None;
			if let Some((&sequence, _)) = self.heads.peek() {
				let group = self
					.groups
					.iter_mut()
					.find(|g| g.sequence == sequence)
					.expect("head without group");
				let (_, arrival) = group.buffered.front().expect("head without sample");
				let due = *arrival + self.latency;

				if quorum || Instant::now() >= due {
					let (sample, _) = group.buffered.pop_front().expect("head without sample");

					if let Some(released) = self.released {
						if sample.timestamp < released {
							// Too late to decode; drop it silently.
							tracing::trace!(?sample, "dropping stale sample");
							continue;
						}
					}

					self.released = Some(sample.timestamp);
					return Ok(Some(sample));
				}

				deadline = Some(due);
			}

			if self.track_done && self.groups.is_empty() {
				return Ok(None);
			}

			// No sample is releasable; wait for a new group, new samples, or
			// the hold deadline.
			let far_future = Instant::now() + Duration::from_secs(3600);

			let mut filling = FuturesUnordered::new();
			for group in self.groups.iter_mut().filter(|g| !g.done) {
				filling.push(group.fill());
			}

			tokio::select! {
				biased;
				res = self.track.next_group(), if !self.track_done => {
					drop(filling);
					match res? {
						Some(group) => self.groups.push(GroupReader::new(group)),
						None => self.track_done = true,
					}
				},
				Some(()) = filling.next() => {
					drop(filling);
				},
				() = tokio::time::sleep_until(deadline.unwrap_or(far_future)), if deadline.is_some() => {
					drop(filling);
				},
				else => {
					drop(filling);
					return Ok(None);
				}
			}
		}
	}
}

/// Reads and buffers the samples of a single group.
struct GroupReader {
	group: moq_sub::GroupConsumer,
	sequence: u64,

	// The frame index within the group; index zero is the keyframe.
	index: usize,

	buffered: VecDeque<(Sample, Instant)>,

	// No more samples will arrive (clean end, loss, or malformed frame).
	done: bool,
}

impl GroupReader {
	fn new(group: moq_sub::GroupConsumer) -> Self {
		Self {
			sequence: group.sequence,
			group,
			index: 0,
			buffered: VecDeque::new(),
			done: false,
		}
	}

	fn exhausted(&self) -> bool {
		self.done && self.buffered.is_empty()
	}

	// Read one more sample into the buffer.
	async fn fill(&mut self) {
		match self.group.read_frame().await {
			Ok(Some(payload)) => match legacy::decode_frame(self.index, payload) {
				Ok(sample) => {
					self.index += 1;
					self.buffered.push_back((sample, Instant::now()));
				}
				Err(err) => {
					// A malformed frame poisons the rest of the group.
					tracing::warn!(%err, group = self.sequence, "malformed frame; dropping group");
					self.done = true;
				}
			},
			Ok(None) => self.done = true,
			Err(err) => {
				// The transport abandoned the group; continue at the next one.
				tracing::debug!(%err, group = self.sequence, "group lost");
				self.done = true;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::Bytes;
	use futures::FutureExt;

	fn frame(micros: u64) -> Bytes {
		legacy::encode_frame(&Sample {
			timestamp: Timestamp::from_micros(micros),
			keyframe: false,
			payload: Bytes::from_static(b"x"),
		})
	}

	fn assert_next(reorder: &mut Reorder, micros: u64) {
		let sample = reorder
			.next()
			.now_or_never()
			.expect("would have blocked")
			.expect("errored")
			.expect("track ended");
		assert_eq!(sample.timestamp.as_micros(), micros);
	}

	fn assert_blocked(reorder: &mut Reorder) {
		assert!(reorder.next().now_or_never().is_none(), "should have blocked");
	}

	#[tokio::test(start_paused = true)]
	async fn single_group_passthrough() {
		let mut track = moq_sub::Track::new("video").produce();
		let mut reorder = Reorder::new(track.consumer, Duration::from_millis(100));

		let mut group = track.producer.append_group().unwrap();
		group.write_frame(frame(0)).unwrap();
		group.write_frame(frame(33_333)).unwrap();

		// With a single open group, quorum is immediate.
		assert_next(&mut reorder, 0);
		assert_next(&mut reorder, 33_333);
		assert_blocked(&mut reorder);
	}

	#[tokio::test(start_paused = true)]
	async fn merges_concurrent_groups() {
		let mut track = moq_sub::Track::new("video").produce();
		let mut reorder = Reorder::new(track.consumer, Duration::from_millis(100));

		let mut g0 = track.producer.append_group().unwrap();
		let mut g1 = track.producer.append_group().unwrap();

		// The old group trails the new one.
		g0.write_frame(frame(0)).unwrap();
		g1.write_frame(frame(66_666)).unwrap();
		g0.write_frame(frame(33_333)).unwrap();

		assert_next(&mut reorder, 0);
		assert_next(&mut reorder, 33_333);

		// g1's head is buffered but g0 hasn't ended; releasing 66_666 would
		// race a late g0 frame, so we hold.
		assert_blocked(&mut reorder);

		g0.close().unwrap();
		assert_next(&mut reorder, 66_666);
	}

	#[tokio::test(start_paused = true)]
	async fn budget_expiry_releases() {
		let mut track = moq_sub::Track::new("video").produce();
		let mut reorder = Reorder::new(track.consumer, Duration::from_millis(100));

		let mut g0 = track.producer.append_group().unwrap();
		let mut g1 = track.producer.append_group().unwrap();

		g1.write_frame(frame(66_666)).unwrap();
		assert_blocked(&mut reorder);

		// g0 stays silent past the budget; g1's sample is released anyway.
		tokio::time::advance(Duration::from_millis(150)).await;
		assert_next(&mut reorder, 66_666);

		// The late g0 frame is now stale and silently dropped.
		g0.write_frame(frame(33_333)).unwrap();
		g0.close().unwrap();
		g1.close().unwrap();
		track.producer.close().unwrap();

		assert!(reorder.next().await.unwrap().is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn lost_group_leaves_quorum() {
		let mut track = moq_sub::Track::new("video").produce();
		let mut reorder = Reorder::new(track.consumer, Duration::from_millis(100));

		let mut g0 = track.producer.append_group().unwrap();
		let mut g1 = track.producer.append_group().unwrap();

		g0.write_frame(frame(0)).unwrap();
		g1.write_frame(frame(33_333)).unwrap();

		assert_next(&mut reorder, 0);
		assert_blocked(&mut reorder);

		// The transport abandons g0; g1 no longer waits on it.
		g0.abort(moq_sub::Error::Cancel).unwrap();
		assert_next(&mut reorder, 33_333);
		g1.close().unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn ends_cleanly() {
		let mut track = moq_sub::Track::new("video").produce();
		let mut reorder = Reorder::new(track.consumer, Duration::from_millis(100));

		let mut group = track.producer.append_group().unwrap();
		group.write_frame(frame(0)).unwrap();
		group.close().unwrap();
		track.producer.close().unwrap();

		assert_next(&mut reorder, 0);
		assert!(reorder.next().await.unwrap().is_none());
	}
}
