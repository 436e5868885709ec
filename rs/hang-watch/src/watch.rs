use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, time::Instant};

use crate::{
	catalog::{Catalog, CatalogConsumer},
	decode::{AudioDecoder, AudioFrame, VideoDecoder, VideoFrame},
	source::{AudioSource, BufferStatus, SourceStats, VideoSource},
	SyncClock, SyncStatus,
};

use moq_sub::SessionStatus;

/// How long we wait for the broadcast to be announced before reporting it
/// offline. The announcement may still arrive later.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// The default end-to-end latency target.
const DEFAULT_LATENCY: Duration = Duration::from_millis(200);

/// The viewer-facing status, merging session and broadcast state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WatchStatus {
	/// Nothing configured yet.
	#[default]
	NoUrl,
	Disconnected,
	Connecting,
	/// The broadcast is not (or no longer) announced.
	Offline,
	/// Announced, but nothing playable has arrived yet.
	Loading,
	/// Video is rendering.
	Live,
	/// Audio-only playback.
	Connected,
}

/// A selectable rendition, for the UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenditionInfo {
	pub name: String,
	pub width: Option<u32>,
	pub height: Option<u32>,
}

/// A playing broadcast: one sync clock, a video source, and an audio source.
///
/// Everything observable is a watch channel; everything controllable is a
/// setter. Dropping (or [Self::close]-ing) tears the whole pipeline down.
pub struct Watch {
	// Keeps the transport alive for as long as we're watching.
	session: Option<moq_sub::Session>,

	sync: SyncClock,
	video: Arc<VideoSource>,
	audio: Arc<AudioSource>,

	status: watch::Sender<WatchStatus>,
	renditions: watch::Sender<Vec<RenditionInfo>>,

	latency: watch::Sender<Duration>,
	muted: watch::Sender<bool>,
	volume: watch::Sender<f64>,

	alive: watch::Sender<()>,
}

impl Watch {
	/// Watch a broadcast over an established session.
	pub fn new<V: VideoDecoder, A: AudioDecoder>(session: moq_sub::Session, path: moq_sub::Path) -> Self {
		let announced = session.announced(path.clone());
		let broadcast = session.consume(path);
		let status = session.status();

		Self::attach::<V, A>(Some(session), announced, broadcast, status)
	}

	/// Watch from pre-wired parts; useful without a network session.
	pub fn attach<V: VideoDecoder, A: AudioDecoder>(
		session: Option<moq_sub::Session>,
		announced: moq_sub::OriginConsumer,
		broadcast: moq_sub::BroadcastConsumer,
		session_status: watch::Receiver<SessionStatus>,
	) -> Self {
		let sync = SyncClock::new(DEFAULT_LATENCY);

		let video = Arc::new(VideoSource::new::<V>(broadcast.clone(), sync.clone()));
		let audio = Arc::new(AudioSource::new::<A>(broadcast.clone(), sync.clone()));

		let catalog = CatalogConsumer::new(
			broadcast
				.subscribe(Catalog::track())
				.unwrap_or_else(|_| dead_track()),
		);

		let this = Self {
			session,
			sync: sync.clone(),
			video: video.clone(),
			audio: audio.clone(),
			status: watch::Sender::new(WatchStatus::Loading),
			renditions: watch::Sender::new(Vec::new()),
			latency: watch::Sender::new(DEFAULT_LATENCY),
			muted: watch::Sender::new(false),
			volume: watch::Sender::new(1.0),
			alive: watch::Sender::new(()),
		};

		let driver = Driver {
			announced,
			catalog,
			session_status,
			sync,
			video,
			audio,
			video_frame: this.video.frame(),
			audio_frame: this.audio.frame(),
			status: this.status.clone(),
			renditions: this.renditions.clone(),
			latency: this.latency.subscribe(),
			min_buffer: None,
			announced_active: false,
			discovery_expired: false,
			catalog_done: false,
		};

		web_async::spawn(driver.run(this.alive.subscribe()));

		this
	}

	// ── Controls ────────────────────────────────────────────────────

	/// Pause or resume playback; pausing suspends the sync clock.
	pub fn set_paused(&self, paused: bool) {
		self.sync.set_paused(paused);
	}

	/// Change the end-to-end latency target.
	///
	/// The catalog's `minBuffer` hint still applies as a lower bound.
	pub fn set_latency(&self, latency: Duration) {
		self.latency.send_replace(latency);
	}

	pub fn set_muted(&self, muted: bool) {
		self.muted.send_replace(muted);
	}

	pub fn set_volume(&self, volume: f64) {
		self.volume.send_replace(volume.clamp(0.0, 1.0));
	}

	/// Manually pick a rendition; None returns to automatic selection.
	pub fn set_target_rendition(&self, rendition: Option<String>) {
		self.video.set_target_rendition(rendition);
	}

	/// The desired pixel count for automatic selection.
	pub fn set_target_pixels(&self, pixels: Option<u64>) {
		self.video.set_target_pixels(pixels);
	}

	// ── Observables ─────────────────────────────────────────────────

	pub fn status(&self) -> watch::Receiver<WatchStatus> {
		self.status.subscribe()
	}

	/// All renditions offered by the catalog.
	pub fn renditions(&self) -> watch::Receiver<Vec<RenditionInfo>> {
		self.renditions.subscribe()
	}

	/// The rendition currently rendering.
	pub fn active_rendition(&self) -> watch::Receiver<Option<String>> {
		self.video.active()
	}

	pub fn buffer_status(&self) -> watch::Receiver<BufferStatus> {
		self.video.buffer()
	}

	pub fn sync_status(&self) -> watch::Receiver<SyncStatus> {
		self.sync.status_changed()
	}

	/// The latest published video frame, for the renderer.
	pub fn video_frame(&self) -> watch::Receiver<Option<VideoFrame>> {
		self.video.frame()
	}

	/// The latest due chunk of audio, for the output sink.
	pub fn audio_frame(&self) -> watch::Receiver<Option<AudioFrame>> {
		self.audio.frame()
	}

	pub fn video_stats(&self) -> watch::Receiver<SourceStats> {
		self.video.stats()
	}

	pub fn audio_stats(&self) -> watch::Receiver<SourceStats> {
		self.audio.stats()
	}

	pub fn muted(&self) -> watch::Receiver<bool> {
		self.muted.subscribe()
	}

	pub fn volume(&self) -> watch::Receiver<f64> {
		self.volume.subscribe()
	}

	/// Stop playback and release the session.
	pub fn close(&mut self) {
		self.video.close();
		self.audio.close();
		self.alive.send_replace(());

		if let Some(session) = self.session.take() {
			session.close();
		}
	}
}

impl Drop for Watch {
	fn drop(&mut self) {
		self.close();
	}
}

// A closed placeholder so a dead broadcast still yields a CatalogConsumer.
fn dead_track() -> moq_sub::TrackConsumer {
	let track = moq_sub::Track::new(Catalog::TRACK).produce();
	track.consumer
}

struct Driver {
	announced: moq_sub::OriginConsumer,
	catalog: CatalogConsumer,
	session_status: watch::Receiver<SessionStatus>,

	sync: SyncClock,
	video: Arc<VideoSource>,
	audio: Arc<AudioSource>,

	video_frame: watch::Receiver<Option<VideoFrame>>,
	audio_frame: watch::Receiver<Option<AudioFrame>>,

	status: watch::Sender<WatchStatus>,
	renditions: watch::Sender<Vec<RenditionInfo>>,

	latency: watch::Receiver<Duration>,
	min_buffer: Option<Duration>,

	announced_active: bool,
	discovery_expired: bool,
	catalog_done: bool,
}

impl Driver {
	async fn run(mut self, mut alive: watch::Receiver<()>) {
		let discovery_deadline = Instant::now() + DISCOVERY_TIMEOUT;

		loop {
			self.refresh_status();

			let waiting_discovery = !self.announced_active && !self.discovery_expired;

			tokio::select! {
				biased;
				_ = alive.changed() => return,
				res = self.session_status.changed() => {
					if res.is_err() {
						return;
					}
				},
				announced = self.announced.next() => match announced {
					Some(announced) => {
						// Only the broadcast itself, not nested paths.
						if announced.suffix.is_empty() {
							self.announced_active = announced.is_active();
							// Discovery is settled once the relay has spoken.
							self.discovery_expired = true;
						}
					}
					// The origin is gone; session status will flip shortly.
					None => self.announced_active = false,
				},
				catalog = self.catalog.next(), if !self.catalog_done => match catalog {
					Ok(Some(catalog)) => self.apply_catalog(catalog),
					// The catalog ended; keep playing with the last one.
					Ok(None) => self.catalog_done = true,
					Err(err) => {
						tracing::debug!(%err, "catalog track error");
						self.catalog_done = true;
					}
				},
				res = self.latency.changed() => {
					if res.is_ok() {
						self.apply_latency();
					}
				},
				_ = tokio::time::sleep_until(discovery_deadline), if waiting_discovery => {
					self.discovery_expired = true;
				},
				_ = self.video_frame.changed() => {},
				_ = self.audio_frame.changed() => {},
			}
		}
	}

	fn apply_catalog(&mut self, catalog: Catalog) {
		tracing::debug!("catalog updated");

		self.min_buffer = catalog.min_buffer.map(Duration::from_millis);
		self.apply_latency();

		let renditions = catalog
			.video
			.as_ref()
			.map(|video| {
				video
					.renditions
					.iter()
					.map(|(name, config)| RenditionInfo {
						name: name.clone(),
						width: config.coded_width,
						height: config.coded_height,
					})
					.collect()
			})
			.unwrap_or_default();

		self.renditions.send_if_modified(move |current| {
			if *current == renditions {
				false
			} else {
				*current = renditions;
				true
			}
		});

		self.video.set_catalog(catalog.video);
		self.audio.set_catalog(catalog.audio);
	}

	// The user's target, bounded below by the publisher's buffer hint.
	fn apply_latency(&self) {
		let mut latency = *self.latency.borrow();
		if let Some(min) = self.min_buffer {
			latency = latency.max(min);
		}
		self.sync.set_latency(latency);
	}

	fn refresh_status(&mut self) {
		let status = match *self.session_status.borrow() {
			SessionStatus::Connecting => WatchStatus::Connecting,
			SessionStatus::Disconnected => WatchStatus::Disconnected,
			SessionStatus::Connected => {
				if self.announced_active {
					if self.video_frame.borrow_and_update().is_some() {
						WatchStatus::Live
					} else if self.audio_frame.borrow_and_update().is_some() {
						WatchStatus::Connected
					} else {
						WatchStatus::Loading
					}
				} else if self.discovery_expired {
					WatchStatus::Offline
				} else {
					WatchStatus::Loading
				}
			}
		};

		self.status.send_if_modified(|current| {
			if *current != status {
				*current = status;
				true
			} else {
				false
			}
		});
	}
}
