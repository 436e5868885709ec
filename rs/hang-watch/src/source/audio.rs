use std::{marker::PhantomData, time::Duration};

use tokio::sync::{mpsc, watch};

use crate::{
	catalog::{self, Container},
	container::{cmaf::Cmaf, Reorder},
	decode::{AudioDecoder, AudioFrame},
	Error, Result, SyncClock,
};

use super::SourceStats;

const RESTART_DELAY: Duration = Duration::from_millis(100);

/// The audio half of a broadcast.
///
/// Audio has no rendition ladder; there's one config, one track, and the
/// same sync-gated emission as video. Mute and volume live in the output
/// sink, not here.
pub struct AudioSource {
	catalog: watch::Sender<Option<catalog::Audio>>,
	enabled: watch::Sender<bool>,

	frame: watch::Sender<Option<AudioFrame>>,
	stats: watch::Sender<SourceStats>,

	alive: watch::Sender<()>,
}

impl AudioSource {
	pub fn new<D: AudioDecoder>(broadcast: moq_sub::BroadcastConsumer, sync: SyncClock) -> Self {
		let this = Self {
			catalog: watch::Sender::new(None),
			enabled: watch::Sender::new(true),
			frame: watch::Sender::new(None),
			stats: watch::Sender::new(SourceStats::default()),
			alive: watch::Sender::new(()),
		};

		let driver = Driver::<D> {
			broadcast,
			sync,
			catalog: this.catalog.subscribe(),
			enabled: this.enabled.subscribe(),
			frame: this.frame.clone(),
			stats: this.stats.clone(),
			active: None,
			_decoder: PhantomData,
		};

		web_async::spawn(driver.run(this.alive.subscribe()));

		this
	}

	pub fn set_catalog(&self, audio: Option<catalog::Audio>) {
		self.catalog.send_replace(audio);
	}

	pub fn set_enabled(&self, enabled: bool) {
		self.enabled.send_replace(enabled);
	}

	/// The most recently due chunk of decoded audio.
	pub fn frame(&self) -> watch::Receiver<Option<AudioFrame>> {
		self.frame.subscribe()
	}

	pub fn stats(&self) -> watch::Receiver<SourceStats> {
		self.stats.subscribe()
	}

	pub fn close(&self) {
		self.alive.send_replace(());
	}
}

impl Drop for AudioSource {
	fn drop(&mut self) {
		self.close();
	}
}

struct Active {
	audio: catalog::Audio,
	frames: mpsc::Receiver<AudioFrame>,
}

struct Driver<D: AudioDecoder> {
	broadcast: moq_sub::BroadcastConsumer,
	sync: SyncClock,

	catalog: watch::Receiver<Option<catalog::Audio>>,
	enabled: watch::Receiver<bool>,

	frame: watch::Sender<Option<AudioFrame>>,
	stats: watch::Sender<SourceStats>,

	active: Option<Active>,

	_decoder: PhantomData<D>,
}

impl<D: AudioDecoder> Driver<D> {
	async fn run(mut self, mut alive: watch::Receiver<()>) {
		loop {
			self.reconcile();

			tokio::select! {
				biased;
				_ = alive.changed() => return,
				_ = self.catalog.changed() => {},
				_ = self.enabled.changed() => {},
				frame = recv(&mut self.active) => match frame {
					Some(frame) => self.publish(frame),
					None => {
						self.active = None;
						tokio::time::sleep(RESTART_DELAY).await;
					}
				},
			}
		}
	}

	fn reconcile(&mut self) {
		let enabled = *self.enabled.borrow_and_update();
		let audio = self.catalog.borrow_and_update().clone();

		let audio = match (enabled, audio) {
			(true, Some(audio)) => audio,
			_ => {
				self.active = None;
				self.frame.send_replace(None);
				return;
			}
		};

		if let Some(active) = &self.active {
			if active.audio == audio {
				return;
			}
		}

		if !D::is_supported(&audio.config) {
			tracing::warn!(codec = %audio.config.codec, "unsupported audio codec");
			self.active = None;
			return;
		}

		match self.start(&audio) {
			Ok(frames) => self.active = Some(Active { audio, frames }),
			Err(err) => tracing::warn!(%err, "failed to subscribe audio"),
		}
	}

	fn start(&self, audio: &catalog::Audio) -> Result<mpsc::Receiver<AudioFrame>> {
		tracing::debug!(track = %audio.track, "starting audio pipeline");

		let track = self.broadcast.subscribe(moq_sub::Track {
			name: audio.track.clone(),
			priority: moq_sub::PRIORITY_AUDIO,
		})?;

		let (out, frames) = mpsc::channel(1);

		let task = PipelineTask::<D> {
			track,
			config: audio.config.clone(),
			sync: self.sync.clone(),
			out,
			_decoder: PhantomData,
		};
		web_async::spawn(task.run());

		Ok(frames)
	}

	fn publish(&mut self, frame: AudioFrame) {
		self.stats.send_modify(|stats| {
			stats.frame_count += 1;
			stats.bytes_received += frame.samples.len() as u64;
			stats.timestamp = Some(frame.timestamp);
		});

		self.frame.send_replace(Some(frame));
	}
}

async fn recv(active: &mut Option<Active>) -> Option<AudioFrame> {
	match active {
		Some(active) => active.frames.recv().await,
		None => std::future::pending().await,
	}
}

struct PipelineTask<D: AudioDecoder> {
	track: moq_sub::TrackConsumer,
	config: catalog::AudioConfig,
	sync: SyncClock,
	out: mpsc::Sender<AudioFrame>,
	_decoder: PhantomData<D>,
}

impl<D: AudioDecoder> PipelineTask<D> {
	async fn run(self) {
		if let Err(err) = self.run_inner().await {
			match err {
				Error::Cancelled | Error::Moq(moq_sub::Error::Cancel) => {
					tracing::debug!(%err, "audio pipeline cancelled")
				}
				err => tracing::warn!(%err, "audio pipeline error"),
			}
		}
	}

	async fn run_inner(mut self) -> Result<()> {
		let mut decoder = D::new(&self.config)?;

		match self.config.container {
			Container::Cmaf { timescale } => self.run_cmaf(&mut decoder, timescale).await,
			Container::Legacy => self.run_legacy(&mut decoder).await,
		}
	}

	async fn run_cmaf(&mut self, decoder: &mut D, timescale: u64) -> Result<()> {
		let mut cmaf = Cmaf::new(timescale);

		while let Some(mut group) = self.track.next_group().await? {
			cmaf.reset();

			loop {
				let payload = match group.read_frame().await {
					Ok(Some(payload)) => payload,
					Ok(None) => break,
					Err(err) => {
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

	async fn run_legacy(&mut self, decoder: &mut D) -> Result<()> {
		let mut reorder = Reorder::new(self.track.clone(), self.sync.latency());

		loop {
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

	async fn emit(&mut self, frame: AudioFrame) -> Result<()> {
		self.sync.wait(frame.timestamp).await?;
		self.out.send(frame).await.map_err(|_| Error::Cancelled)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{container::legacy, source::fake::FakeAudio, Sample, Timestamp};
	use bytes::Bytes;

	const LATENCY: Duration = Duration::from_millis(200);

	fn audio(codec: &str) -> catalog::Audio {
		catalog::Audio {
			track: "audio".to_string(),
			config: catalog::AudioConfig {
				codec: codec.to_string(),
				sample_rate: 48_000,
				channel_count: 2,
				description: None,
				container: Container::Legacy,
			},
		}
	}

	fn packet(micros: u64) -> Bytes {
		legacy::encode_frame(&Sample {
			timestamp: Timestamp::from_micros(micros),
			keyframe: true,
			payload: Bytes::from_static(b"opus"),
		})
	}

	#[tokio::test(start_paused = true)]
	async fn decodes_and_publishes() {
		let mut broadcast = moq_sub::Broadcast::new("test").produce();
		let sync = SyncClock::new(LATENCY);
		let source = AudioSource::new::<FakeAudio>(broadcast.consumer.clone(), sync);

		source.set_catalog(Some(audio("opus")));

		let mut track = broadcast.producer.requested_track().await.unwrap();
		assert_eq!(track.name.as_str(), "audio");
		assert_eq!(track.priority, moq_sub::PRIORITY_AUDIO);

		let mut group = track.append_group().unwrap();
		group.write_frame(packet(0)).unwrap();
		group.write_frame(packet(20_000)).unwrap();

		let mut frames = source.frame();
		frames
			.wait_for(|f| f.as_ref().map(|f| f.timestamp.as_micros()) == Some(20_000))
			.await
			.unwrap();

		let stats = *source.stats().borrow();
		assert_eq!(stats.frame_count, 2);
	}

	#[tokio::test(start_paused = true)]
	async fn unsupported_codec_is_idle() {
		let mut broadcast = moq_sub::Broadcast::new("test").produce();
		let sync = SyncClock::new(LATENCY);
		let source = AudioSource::new::<FakeAudio>(broadcast.consumer.clone(), sync);

		source.set_catalog(Some(audio("x-exotic")));

		tokio::task::yield_now().await;
		tokio::task::yield_now().await;

		use futures::FutureExt;
		assert!(broadcast.producer.requested_track().now_or_never().is_none());
	}
}
