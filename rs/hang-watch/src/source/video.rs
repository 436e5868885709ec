use std::{marker::PhantomData, time::Duration};

use tokio::sync::{mpsc, watch};

use crate::{
	catalog::{self, Container},
	container::{cmaf::Cmaf, Reorder},
	decode::{DecoderConfig, VideoDecoder, VideoFrame},
	Error, Result, SyncClock,
};

use super::{select_rendition, supported_renditions, BufferStatus, SourceStats, Target};

// Grace before resubscribing after a pipeline dies unexpectedly.
const RESTART_DELAY: Duration = Duration::from_millis(100);

/// The video half of a broadcast: rendition selection, decoding, and
/// sync-gated frame publication.
///
/// The source runs as a background task from construction until [Self::close]
/// (or drop). Catalog and target updates are pushed in; everything observable
/// comes back out through watch channels.
pub struct VideoSource {
	catalog: watch::Sender<Option<catalog::Video>>,
	target: watch::Sender<Target>,
	enabled: watch::Sender<bool>,

	supported: watch::Sender<Vec<String>>,
	active: watch::Sender<Option<String>>,
	frame: watch::Sender<Option<VideoFrame>>,
	buffer: watch::Sender<BufferStatus>,
	stats: watch::Sender<SourceStats>,

	alive: watch::Sender<()>,
}

impl VideoSource {
	pub fn new<D: VideoDecoder>(broadcast: moq_sub::BroadcastConsumer, sync: SyncClock) -> Self {
		let this = Self {
			catalog: watch::Sender::new(None),
			target: watch::Sender::new(Target::default()),
			enabled: watch::Sender::new(true),
			supported: watch::Sender::new(Vec::new()),
			active: watch::Sender::new(None),
			frame: watch::Sender::new(None),
			buffer: watch::Sender::new(BufferStatus::Filled),
			stats: watch::Sender::new(SourceStats::default()),
			alive: watch::Sender::new(()),
		};

		let driver = Driver::<D> {
			broadcast,
			sync,
			catalog: this.catalog.subscribe(),
			target: this.target.subscribe(),
			enabled: this.enabled.subscribe(),
			supported: this.supported.clone(),
			active_name: this.active.clone(),
			frame: this.frame.clone(),
			buffer: this.buffer.clone(),
			stats: this.stats.clone(),
			active: None,
			pending: None,
			_decoder: PhantomData,
		};

		web_async::spawn(driver.run(this.alive.subscribe()));

		this
	}

	/// Push the latest catalog; None while loading or after the catalog ends.
	pub fn set_catalog(&self, video: Option<catalog::Video>) {
		self.catalog.send_replace(video);
	}

	/// Manually override the rendition; None returns to automatic selection.
	pub fn set_target_rendition(&self, rendition: Option<String>) {
		self.target.send_modify(|target| target.rendition = rendition);
	}

	/// The desired pixel count; None means "as large as possible".
	pub fn set_target_pixels(&self, pixels: Option<u64>) {
		self.target.send_modify(|target| target.pixels = pixels);
	}

	pub fn set_enabled(&self, enabled: bool) {
		self.enabled.send_replace(enabled);
	}

	/// Rendition names the platform decoder can handle, in catalog order.
	pub fn supported(&self) -> watch::Receiver<Vec<String>> {
		self.supported.subscribe()
	}

	/// The rendition currently rendering.
	pub fn active(&self) -> watch::Receiver<Option<String>> {
		self.active.subscribe()
	}

	/// The most recently published frame.
	pub fn frame(&self) -> watch::Receiver<Option<VideoFrame>> {
		self.frame.subscribe()
	}

	pub fn buffer(&self) -> watch::Receiver<BufferStatus> {
		self.buffer.subscribe()
	}

	pub fn stats(&self) -> watch::Receiver<SourceStats> {
		self.stats.subscribe()
	}

	/// Stop the source; no frame updates occur after this returns.
	pub fn close(&self) {
		self.alive.send_replace(());
	}
}

impl Drop for VideoSource {
	fn drop(&mut self) {
		self.close();
	}
}

// A warmed-up (or warming) subscription + decoder.
struct Pipeline {
	rendition: String,
	config: DecoderConfig,
	frames: mpsc::Receiver<VideoFrame>,
}

struct Driver<D: VideoDecoder> {
	broadcast: moq_sub::BroadcastConsumer,
	sync: SyncClock,

	catalog: watch::Receiver<Option<catalog::Video>>,
	target: watch::Receiver<Target>,
	enabled: watch::Receiver<bool>,

	supported: watch::Sender<Vec<String>>,
	active_name: watch::Sender<Option<String>>,
	frame: watch::Sender<Option<VideoFrame>>,
	buffer: watch::Sender<BufferStatus>,
	stats: watch::Sender<SourceStats>,

	active: Option<Pipeline>,
	pending: Option<Pipeline>,

	_decoder: PhantomData<D>,
}

impl<D: VideoDecoder> Driver<D> {
	async fn run(mut self, mut alive: watch::Receiver<()>) {
		loop {
			self.reconcile();

			tokio::select! {
				// Teardown wins over everything else, so a close is final.
				biased;
				_ = alive.changed() => return,
				_ = self.catalog.changed() => {},
				_ = self.target.changed() => {},
				_ = self.enabled.changed() => {},
				frame = recv(&mut self.pending) => match frame {
					Some(frame) => self.promote(frame),
					None => {
						// Died before its first frame; retried by reconcile.
						self.pending = None;
						tokio::time::sleep(RESTART_DELAY).await;
					}
				},
				frame = recv(&mut self.active) => match frame {
					Some(frame) => self.publish(frame),
					None => {
						// The pipeline died mid-stream (DecoderFatal, track
						// ended). Keep the last frame on screen and re-enter
						// selection.
						self.active = None;
						self.active_name.send_replace(None);
						tokio::time::sleep(RESTART_DELAY).await;
					}
				},
			}
		}
	}

	// Recompute capability filter, selection, and pipelines.
	fn reconcile(&mut self) {
		let enabled = *self.enabled.borrow_and_update();
		let video = self.catalog.borrow_and_update().clone();
		let target = self.target.borrow_and_update().clone();

		let mut supported = Vec::new();
		let mut selection = None;

		if enabled {
			if let Some(video) = &video {
				supported = supported_renditions::<D>(video);

				if supported.is_empty() && !video.renditions.is_empty() {
					tracing::warn!("no playable rendition");
				}

				selection = select_rendition(&video.renditions, &supported, &target).and_then(|name| {
					let config = video.renditions.get(&name)?;
					Some((name, DecoderConfig::video(config), config.container))
				});
			}
		}

		self.supported.send_if_modified(move |current| {
			if *current == supported {
				false
			} else {
				*current = supported;
				true
			}
		});

		let Some((name, config, container)) = selection else {
			// Nothing to play. The last published frame stays latched unless
			// the source was disabled outright.
			self.active = None;
			self.pending = None;
			self.active_name.send_replace(None);

			if !enabled {
				self.frame.send_replace(None);
			}

			self.refresh_buffer();
			return;
		};

		if let Some(active) = &mut self.active {
			if active.rendition == name {
				if active.config == config || active.config.resize_only(&config) {
					// A coded-size-only change; the decoder reads dimensions
					// from the bitstream, so the pipeline keeps running.
					active.config = config;
					self.pending = None;
					self.refresh_buffer();
					return;
				}
			}
		}

		// Drop a pending pipeline that no longer matches the selection.
		if let Some(pending) = &self.pending {
			if pending.rendition != name || pending.config != config {
				self.pending = None;
			}
		}

		if self.pending.is_none() {
			match self.start(name.clone(), config, container) {
				Ok(pipeline) => self.pending = Some(pipeline),
				Err(err) => tracing::warn!(%err, rendition = %name, "failed to subscribe"),
			}
		}

		self.refresh_buffer();
	}

	// Open a subscription + decoder for a rendition.
	fn start(&self, rendition: String, config: DecoderConfig, container: Container) -> Result<Pipeline> {
		tracing::debug!(rendition = %rendition, "starting pipeline");

		let track = self.broadcast.subscribe(moq_sub::Track {
			name: rendition.clone(),
			priority: moq_sub::PRIORITY_VIDEO,
		})?;

		let (out, frames) = mpsc::channel(1);

		let task = PipelineTask::<D> {
			track,
			container,
			config: config.clone(),
			sync: self.sync.clone(),
			last: self.frame.subscribe(),
			out,
			_decoder: PhantomData,
		};
		web_async::spawn(task.run());

		Ok(Pipeline {
			rendition,
			config,
			frames,
		})
	}

	// The pending pipeline delivered its first gated frame; it takes over.
	fn promote(&mut self, frame: VideoFrame) {
		let pipeline = self.pending.take().expect("promoted without a pending pipeline");

		tracing::debug!(rendition = %pipeline.rendition, "rendition active");

		self.active_name.send_replace(Some(pipeline.rendition.clone()));
		self.active = Some(pipeline);
		self.publish(frame);
	}

	fn publish(&mut self, frame: VideoFrame) {
		// The pipeline checked before its sync wait; this is the
		// authoritative check, after it.
		if let Some(last) = self.frame.borrow().as_ref().map(|f| f.timestamp) {
			if frame.timestamp < last {
				tracing::trace!(?frame, "dropping stale frame");
				return;
			}
		}

		self.stats.send_modify(|stats| {
			stats.frame_count += 1;
			stats.bytes_received += frame.encoded_bytes as u64;
			stats.timestamp = Some(frame.timestamp);
		});

		self.frame.send_replace(Some(frame));
		self.refresh_buffer();
	}

	fn refresh_buffer(&self) {
		let empty = *self.enabled.borrow() && self.frame.borrow().is_none();
		let status = match empty {
			true => BufferStatus::Empty,
			false => BufferStatus::Filled,
		};

		self.buffer.send_if_modified(|buffer| {
			if *buffer != status {
				*buffer = status;
				true
			} else {
				false
			}
		});
	}
}

async fn recv(pipeline: &mut Option<Pipeline>) -> Option<VideoFrame> {
	match pipeline {
		Some(pipeline) => pipeline.frames.recv().await,
		None => std::future::pending().await,
	}
}

// Reads one track, decodes, and forwards gated frames to the driver.
struct PipelineTask<D: VideoDecoder> {
	track: moq_sub::TrackConsumer,
	container: Container,
	config: DecoderConfig,
	sync: SyncClock,

	// The most recently published frame, for staleness checks.
	last: watch::Receiver<Option<VideoFrame>>,

	out: mpsc::Sender<VideoFrame>,

	_decoder: PhantomData<D>,
}

impl<D: VideoDecoder> PipelineTask<D> {
	async fn run(self) {
		if let Err(err) = self.run_inner().await {
			match err {
				Error::Cancelled | Error::Moq(moq_sub::Error::Cancel) => {
					tracing::debug!(%err, "pipeline cancelled")
				}
				err => tracing::warn!(%err, "pipeline error"),
			}
		}
		// Dropping `out` tells the driver this pipeline is dead.
	}

	async fn run_inner(mut self) -> Result<()> {
		let mut decoder = D::new(&self.config)?;

		match self.container {
			Container::Cmaf { timescale } => self.run_cmaf(&mut decoder, timescale).await,
			Container::Legacy => self.run_legacy(&mut decoder).await,
		}
	}

	// CMAF groups are already ordered (a single producer per rendition), so
	// samples go straight from the parser into the decoder.
	async fn run_cmaf(&mut self, decoder: &mut D, timescale: u64) -> Result<()> {
		let mut cmaf = Cmaf::new(timescale);

		while let Some(mut group) = self.track.next_group().await? {
			// A group boundary is a resync point; forget any partial fragment.
			cmaf.reset();

			loop {
				let payload = match group.read_frame().await {
					Ok(Some(payload)) => payload,
					Ok(None) => break,
					Err(err) => {
						// A lost group; continue at the next one.
						tracing::debug!(%err, group = group.sequence, "group lost");
						break;
					}
				};

				let samples = match cmaf.decode(payload) {
					Ok(samples) => samples,
					Err(err) => {
						tracing::warn!(%err, group = group.sequence, "malformed group; skipping");
						break;
					}
				};

				for sample in samples {
					self.sync.update(sample.timestamp);

					decoder.decode(&sample)?;
					while let Some(frame) = decoder.poll()? {
						self.emit(frame).await?;
					}
				}
			}
		}

		Ok(())
	}

	// Legacy groups arrive concurrently; merge them through the reorder
	// buffer before decoding.
	async fn run_legacy(&mut self, decoder: &mut D) -> Result<()> {
		let mut reorder = Reorder::new(self.track.clone(), self.sync.latency());

		loop {
			// Track the latency slider.
			reorder.set_latency(self.sync.latency());

			let Some(sample) = reorder.next().await? else {
				return Ok(());
			};

			self.sync.update(sample.timestamp);

			decoder.decode(&sample)?;
			while let Some(frame) = decoder.poll()? {
				self.emit(frame).await?;
			}
		}
	}

	async fn emit(&mut self, frame: VideoFrame) -> Result<()> {
		let last = self.last.borrow().as_ref().map(|f| f.timestamp);

		match last {
			// Too late; a newer frame was already shown.
			Some(last) if frame.timestamp < last => return Ok(()),
			Some(_) => {}
			// Nothing on screen yet; publish immediately so the UI isn't blank.
			None => return self.out.send(frame).await.map_err(|_| Error::Cancelled),
		}

		self.sync.wait(frame.timestamp).await?;

		// Re-check after the wait: another track may have re-seeded the clock
		// or published past us. The driver re-checks once more on publish.
		if let Some(last) = self.last.borrow().as_ref().map(|f| f.timestamp) {
			if frame.timestamp < last {
				return Ok(());
			}
		}

		self.out.send(frame).await.map_err(|_| Error::Cancelled)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{container::legacy, source::fake::FakeVideo, Sample, Timestamp};
	use bytes::Bytes;
	use futures::FutureExt;
	use std::collections::BTreeMap;

	fn assert_no_subscribe(broadcast: &mut moq_sub::BroadcastProducer) {
		assert!(
			broadcast.requested_track().now_or_never().is_none(),
			"unexpected subscription"
		);
	}

	const LATENCY: Duration = Duration::from_millis(200);

	fn rendition(codec: &str, width: u32, height: u32) -> catalog::VideoConfig {
		catalog::VideoConfig {
			codec: codec.to_string(),
			coded_width: Some(width),
			coded_height: Some(height),
			container: Container::Legacy,
			..Default::default()
		}
	}

	fn video(renditions: Vec<(&str, catalog::VideoConfig)>) -> catalog::Video {
		catalog::Video {
			renditions: renditions
				.into_iter()
				.map(|(name, config)| (name.to_string(), config))
				.collect::<BTreeMap<_, _>>(),
			..Default::default()
		}
	}

	fn frame_payload(micros: u64) -> Bytes {
		legacy::encode_frame(&Sample {
			timestamp: Timestamp::from_micros(micros),
			keyframe: true,
			payload: Bytes::from_static(b"nal"),
		})
	}

	// Wait for the driver to subscribe, asserting the track name.
	async fn expect_subscribe(broadcast: &mut moq_sub::BroadcastProducer, name: &str) -> moq_sub::TrackProducer {
		let track = broadcast.requested_track().await.expect("no subscription");
		assert_eq!(track.name.as_str(), name);
		track
	}

	#[tokio::test(start_paused = true)]
	async fn selects_and_publishes() {
		let mut broadcast = moq_sub::Broadcast::new("test").produce();
		let sync = SyncClock::new(LATENCY);
		let source = VideoSource::new::<FakeVideo>(broadcast.consumer.clone(), sync);

		let mut supported = source.supported();
		let mut frames = source.frame();
		let mut buffer = source.buffer();

		source.set_catalog(Some(video(vec![("video", rendition("avc1.640028", 1920, 1080))])));

		let mut track = expect_subscribe(&mut broadcast.producer, "video").await;
		supported.wait_for(|s| s == &["video".to_string()]).await.unwrap();
		buffer.wait_for(|b| *b == BufferStatus::Empty).await.unwrap();

		let mut group = track.append_group().unwrap();
		group.write_frame(frame_payload(0)).unwrap();
		group.write_frame(frame_payload(33_333)).unwrap();

		// The first frame is latched immediately; the second is sync-gated.
		frames
			.wait_for(|f| f.as_ref().map(|f| f.timestamp.as_micros()) == Some(0))
			.await
			.unwrap();
		buffer.wait_for(|b| *b == BufferStatus::Filled).await.unwrap();

		frames
			.wait_for(|f| f.as_ref().map(|f| f.timestamp.as_micros()) == Some(33_333))
			.await
			.unwrap();

		let stats = *source.stats().borrow();
		assert_eq!(stats.frame_count, 2);
		assert!(stats.bytes_received > 0);
		assert_eq!(stats.timestamp, Some(Timestamp::from_micros(33_333)));

		let mut active = source.active();
		active.wait_for(|a| a.as_deref() == Some("video")).await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn cmaf_pipeline() {
		use crate::container::cmaf::fixtures::{fragment, DELTA, KEYFRAME};

		let mut broadcast = moq_sub::Broadcast::new("test").produce();
		let sync = SyncClock::new(LATENCY);
		let source = VideoSource::new::<FakeVideo>(broadcast.consumer.clone(), sync);

		let config = catalog::VideoConfig {
			codec: "avc1.640028".to_string(),
			coded_width: Some(1920),
			coded_height: Some(1080),
			container: Container::Cmaf { timescale: 90_000 },
			..Default::default()
		};
		source.set_catalog(Some(video(vec![("video", config)])));

		let mut track = expect_subscribe(&mut broadcast.producer, "video").await;

		// One group, one fragment: a keyframe plus two deltas at 30fps.
		let mut group = track.append_group().unwrap();
		group
			.write_frame(fragment(0, &[(b"key", KEYFRAME), (b"d1", DELTA), (b"d2", DELTA)]))
			.unwrap();

		let mut frames = source.frame();
		frames
			.wait_for(|f| f.as_ref().map(|f| f.timestamp.as_micros()) == Some(66_666))
			.await
			.unwrap();

		let stats = *source.stats().borrow();
		assert_eq!(stats.frame_count, 3);
	}

	#[tokio::test(start_paused = true)]
	async fn rendition_override_switches() {
		let mut broadcast = moq_sub::Broadcast::new("test").produce();
		let sync = SyncClock::new(LATENCY);
		let source = VideoSource::new::<FakeVideo>(broadcast.consumer.clone(), sync);

		source.set_catalog(Some(video(vec![
			("hd", rendition("avc1.640028", 1920, 1080)),
			("sd", rendition("avc1.42e01e", 640, 360)),
		])));

		// Automatic selection goes for the largest.
		let mut hd = expect_subscribe(&mut broadcast.producer, "hd").await;

		let mut group = hd.append_group().unwrap();
		group.write_frame(frame_payload(0)).unwrap();

		let mut frames = source.frame();
		frames.wait_for(|f| f.is_some()).await.unwrap();

		let mut active = source.active();
		active.wait_for(|a| a.as_deref() == Some("hd")).await.unwrap();

		// Manual override; the active pipeline keeps rendering until the
		// new one produces a frame.
		source.set_target_rendition(Some("sd".to_string()));

		let mut sd = expect_subscribe(&mut broadcast.producer, "sd").await;
		assert_eq!(active.borrow().as_deref(), Some("hd"));

		let mut group = sd.append_group().unwrap();
		group.write_frame(frame_payload(66_666)).unwrap();

		active.wait_for(|a| a.as_deref() == Some("sd")).await.unwrap();

		// No timestamp regression across the switch.
		let stats = *source.stats().borrow();
		assert_eq!(stats.timestamp, Some(Timestamp::from_micros(66_666)));
	}

	#[tokio::test(start_paused = true)]
	async fn catalog_swap_keeps_last_frame() {
		let mut broadcast = moq_sub::Broadcast::new("test").produce();
		let sync = SyncClock::new(LATENCY);
		let source = VideoSource::new::<FakeVideo>(broadcast.consumer.clone(), sync);

		source.set_catalog(Some(video(vec![
			("hd", rendition("avc1.640028", 1920, 1080)),
			("sd", rendition("avc1.42e01e", 640, 360)),
		])));

		let mut hd = expect_subscribe(&mut broadcast.producer, "hd").await;
		let mut group = hd.append_group().unwrap();
		group.write_frame(frame_payload(0)).unwrap();

		let mut frames = source.frame();
		frames.wait_for(|f| f.is_some()).await.unwrap();

		// The publisher drops the hd rendition mid-stream.
		source.set_catalog(Some(video(vec![("sd", rendition("avc1.42e01e", 640, 360))])));

		let mut sd = expect_subscribe(&mut broadcast.producer, "sd").await;

		// The last hd frame stays latched while sd warms up.
		assert!(frames.borrow().is_some());

		let mut group = sd.append_group().unwrap();
		group.write_frame(frame_payload(33_333)).unwrap();

		let mut active = source.active();
		active.wait_for(|a| a.as_deref() == Some("sd")).await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn unsupported_renditions() {
		let mut broadcast = moq_sub::Broadcast::new("test").produce();
		let sync = SyncClock::new(LATENCY);
		let source = VideoSource::new::<FakeVideo>(broadcast.consumer.clone(), sync);

		// The fake decoder rejects "x-" codecs.
		source.set_catalog(Some(video(vec![("weird", rendition("x-codec", 1920, 1080))])));

		tokio::task::yield_now().await;
		tokio::task::yield_now().await;

		assert!(source.supported().borrow().is_empty());
		assert_eq!(*source.active().borrow(), None);

		// No subscription is ever requested.
		assert_no_subscribe(&mut broadcast.producer);
	}

	#[tokio::test(start_paused = true)]
	async fn close_stops_updates() {
		let mut broadcast = moq_sub::Broadcast::new("test").produce();
		let sync = SyncClock::new(LATENCY);
		let source = VideoSource::new::<FakeVideo>(broadcast.consumer.clone(), sync);

		source.set_catalog(Some(video(vec![("video", rendition("avc1.640028", 1920, 1080))])));

		let mut track = expect_subscribe(&mut broadcast.producer, "video").await;
		let mut group = track.append_group().unwrap();
		group.write_frame(frame_payload(0)).unwrap();

		let mut frames = source.frame();
		frames.wait_for(|f| f.is_some()).await.unwrap();

		source.close();
		tokio::task::yield_now().await;

		// Frames written after close never surface.
		group.write_frame(frame_payload(33_333)).unwrap();
		tokio::time::sleep(Duration::from_secs(1)).await;

		assert_eq!(frames.borrow().as_ref().map(|f| f.timestamp.as_micros()), Some(0));
	}

	#[tokio::test(start_paused = true)]
	async fn disabled_publishes_nothing() {
		let mut broadcast = moq_sub::Broadcast::new("test").produce();
		let sync = SyncClock::new(LATENCY);
		let source = VideoSource::new::<FakeVideo>(broadcast.consumer.clone(), sync);

		source.set_enabled(false);
		source.set_catalog(Some(video(vec![("video", rendition("avc1.640028", 1920, 1080))])));

		tokio::task::yield_now().await;
		assert_no_subscribe(&mut broadcast.producer);
		assert_eq!(*source.buffer().borrow(), BufferStatus::Filled);
	}
}
