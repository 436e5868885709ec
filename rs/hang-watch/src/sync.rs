//! The presentation clock.
//!
//! Producer timestamps and wall-clock time live in different domains; this
//! is the only module allowed to relate them. The clock keeps a reference
//! mapping (producer anchor → wall presentation instant) such that the
//! producer-to-presentation gap converges on the latency target:
//!
//! `present(ts) = anchor_wall + (ts - anchor_producer) / rate`
//!
//! [SyncClock::update] is fed every *received* (not decoded) timestamp and
//! steers the mapping; [SyncClock::wait] suspends until a frame is due.
//! All tracks of a broadcast share one clock, which is what keeps audio and
//! video aligned.

use std::{
	sync::{
		atomic::{self, AtomicUsize},
		Arc,
	},
	time::Duration,
};

use tokio::{sync::watch, time::Instant};

use crate::{Error, Result, Timestamp};

/// The playback rate while catching up after falling behind.
const CATCH_UP_RATE: f64 = 1.1;

/// Whether the clock is presenting or holding frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncStatus {
	#[default]
	Play,
	Wait,
}

#[derive(Debug)]
struct State {
	// (producer anchor, the wall instant it presents at)
	reference: Option<(Timestamp, Instant)>,

	latency: Duration,
	rate: f64,
	status: SyncStatus,
	paused: bool,

	// The highest timestamp received, and when it arrived.
	last_update: Timestamp,
	last_update_at: Option<Instant>,

	// The next update re-seeds the reference (stall recovery, new latency).
	reseed: bool,

	closed: bool,
}

impl State {
	// The scheduled presentation instant for a timestamp.
	// Timestamps older than the anchor are due immediately.
	fn present(&self, timestamp: Timestamp) -> Option<Instant> {
		let (anchor, at) = self.reference?;
		Some(at + timestamp.saturating_sub(anchor).div_f64(self.rate))
	}

	// How long without updates before we consider the producer stalled.
	fn stall_after(&self) -> Duration {
		self.latency + (self.latency / 2).min(Duration::from_secs(1))
	}

	fn playing(&self) -> bool {
		self.status == SyncStatus::Play && !self.paused
	}
}

/// The shared presentation clock.
///
/// Cheap to clone; all clones steer the same mapping. The clock closes when
/// the last handle is dropped, cancelling any pending [SyncClock::wait].
pub struct SyncClock {
	state: watch::Sender<State>,
	status: watch::Sender<SyncStatus>,
	active: Arc<AtomicUsize>,
}

impl SyncClock {
	pub fn new(latency: Duration) -> Self {
		let state = watch::Sender::new(State {
			reference: None,
			latency,
			rate: 1.0,
			status: SyncStatus::Play,
			paused: false,
			last_update: Timestamp::ZERO,
			last_update_at: None,
			reseed: false,
			closed: false,
		});

		let clock = Self {
			status: watch::Sender::new(SyncStatus::Play),
			active: Arc::new(AtomicUsize::new(1)),
			state,
		};

		// The stall detector gets raw handles so it doesn't keep the clock alive.
		web_async::spawn(run_stall(clock.state.clone(), clock.status.clone()));

		clock
	}

	/// Feed the timestamp of a newly *received* frame.
	pub fn update(&self, timestamp: Timestamp) {
		self.state.send_modify(|state| {
			if state.closed {
				return;
			}

			let now = Instant::now();
			state.last_update = state.last_update.max(timestamp);
			state.last_update_at = Some(now);

			if state.reference.is_none() || state.reseed || state.status == SyncStatus::Wait {
				// Seed so this frame presents exactly one latency target out.
				// After a stall this is a deliberate discontinuity; better
				// than carrying the dead air as permanent extra latency.
				state.reference = Some((timestamp, now + state.latency));
				state.rate = 1.0;
				state.reseed = false;
				state.status = SyncStatus::Play;
				return;
			}

			let scheduled = state.present(timestamp).expect("reference exists");
			let target = now + state.latency;

			if state.rate == 1.0 {
				if scheduled > target + state.latency / 2 {
					// We've fallen behind the target; play faster to converge.
					// Re-anchoring at the current mapping keeps presentation
					// continuous and monotone across the rate change.
					state.reference = Some((timestamp, scheduled));
					state.rate = CATCH_UP_RATE;
					tracing::debug!(behind = ?(scheduled - target), "catching up");
				}
			} else if scheduled <= target {
				// Caught up; back to real time.
				state.reference = Some((timestamp, scheduled));
				state.rate = 1.0;
				tracing::debug!("caught up");
			}
		});

		self.publish_status();
	}

	/// The scheduled presentation instant for a timestamp, if seeded.
	pub fn present(&self, timestamp: Timestamp) -> Option<Instant> {
		self.state.borrow().present(timestamp)
	}

	/// Suspend until the timestamp is due for presentation.
	///
	/// Resolves only while the clock is playing; pauses and stalls hold the
	/// frame. Returns [Error::Cancelled] when the clock is closed. Dropping
	/// the future is the way to cancel an individual wait.
	// We don't use the `async` keyword so the future doesn't borrow &self.
	pub fn wait(&self, timestamp: Timestamp) -> impl std::future::Future<Output = Result<()>> + Send + 'static {
		let mut state = self.state.subscribe();

		async move {
			loop {
				let due = {
					let state = state.borrow_and_update();
					if state.closed {
						return Err(Error::Cancelled);
					}

					match state.playing() {
						true => state.present(timestamp),
						false => None,
					}
				};

				match due {
					Some(due) if Instant::now() >= due => return Ok(()),
					Some(due) => {
						tokio::select! {
							// The schedule may have shifted; loop and re-check.
							_ = tokio::time::sleep_until(due) => {}
							res = state.changed() => {
								if res.is_err() {
									return Err(Error::Cancelled);
								}
							}
						}
					}
					None => {
						if state.changed().await.is_err() {
							return Err(Error::Cancelled);
						}
					}
				}
			}
		}
	}

	/// Change the latency target; takes effect at the next update.
	pub fn set_latency(&self, latency: Duration) {
		self.state.send_modify(|state| {
			state.latency = latency;
			state.reseed = true;
		});
	}

	pub fn latency(&self) -> Duration {
		self.state.borrow().latency
	}

	/// Pause or resume presentation.
	///
	/// While paused the clock reports [SyncStatus::Wait] and holds every
	/// frame; resuming re-seeds on the next update.
	pub fn set_paused(&self, paused: bool) {
		self.state.send_modify(|state| {
			state.paused = paused;
			if !paused {
				state.reseed = true;
			}
		});

		self.publish_status();
	}

	/// The current status as a snapshot.
	pub fn status(&self) -> SyncStatus {
		*self.status.borrow()
	}

	/// Observe status transitions.
	pub fn status_changed(&self) -> watch::Receiver<SyncStatus> {
		self.status.subscribe()
	}

	fn publish_status(&self) {
		let current = {
			let state = self.state.borrow();
			match state.playing() {
				true => SyncStatus::Play,
				false => SyncStatus::Wait,
			}
		};

		self.status.send_if_modified(|status| {
			if *status != current {
				*status = current;
				true
			} else {
				false
			}
		});
	}
}

impl Clone for SyncClock {
	fn clone(&self) -> Self {
		self.active.fetch_add(1, atomic::Ordering::Relaxed);
		Self {
			state: self.state.clone(),
			status: self.status.clone(),
			active: self.active.clone(),
		}
	}
}

impl Drop for SyncClock {
	fn drop(&mut self) {
		let active = self.active.fetch_sub(1, atomic::Ordering::Release);
		if active != 1 {
			return;
		}

		atomic::fence(atomic::Ordering::Acquire);

		self.state.send_modify(|state| state.closed = true);
	}
}

// Flip to Wait when updates dry up for longer than the stall window.
async fn run_stall(state: watch::Sender<State>, status: watch::Sender<SyncStatus>) {
	let mut updates = state.subscribe();

	loop {
		let deadline = {
			let state = updates.borrow_and_update();
			if state.closed {
				return;
			}
			state.last_update_at.map(|at| at + state.stall_after())
		};

		match deadline {
			Some(deadline) => {
				tokio::select! {
					_ = tokio::time::sleep_until(deadline) => {
						let mut stalled = false;
						state.send_if_modified(|state| {
							// An update may have raced the timer; re-check.
							let expired = state
								.last_update_at
								.map(|at| Instant::now() >= at + state.stall_after())
								.unwrap_or(false);

							if expired && state.status == SyncStatus::Play {
								tracing::debug!("producer stalled");
								state.status = SyncStatus::Wait;
								state.reseed = true;
								stalled = true;
								true
							} else {
								false
							}
						});

						if stalled {
							status.send_if_modified(|status| {
								if *status != SyncStatus::Wait {
									*status = SyncStatus::Wait;
									true
								} else {
									false
								}
							});
						}
					}
					res = updates.changed() => {
						if res.is_err() {
							return;
						}
					}
				}
			}
			None => {
				if updates.changed().await.is_err() {
					return;
				}
			}
		}
	}
}
