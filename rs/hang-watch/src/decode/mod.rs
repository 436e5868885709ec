//! Platform decoder abstraction, modeled on WebCodecs.
//!
//! The pipeline never talks to a codec library directly; it asks a
//! [VideoDecoder] (or [AudioDecoder]) implementation whether a config is
//! supported, feeds it [Sample]s, and polls decoded frames back out.
//!
//! An FFmpeg-backed implementation is available behind the `decode` feature.
//! Tests use in-crate fakes.

use bytes::Bytes;

use crate::{catalog, Sample, Timestamp};

#[cfg(feature = "decode")]
mod ffmpeg;

#[cfg(feature = "decode")]
pub use ffmpeg::*;

/// The subset of a catalog config a decoder needs, WebCodecs-style.
///
/// Built via [Self::video] for decoder construction, or [Self::video_support]
/// for the cheaper capability query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecoderConfig {
	/// The codec string, e.g. "avc1.640028".
	pub codec: String,

	/// Codec-specific initialization data (e.g. avcC for H.264).
	pub description: Option<Bytes>,

	pub coded_width: Option<u32>,
	pub coded_height: Option<u32>,

	/// Prefer low latency over throughput; defaults on for live playback.
	pub optimize_for_latency: bool,
}

impl DecoderConfig {
	/// Build the initialization config for a video rendition.
	///
	/// The description (e.g. avcC with sps/pps) always rides along; a CMAF
	/// decoder has nowhere else to get it since groups carry no `moov`.
	pub fn video(config: &catalog::VideoConfig) -> Self {
		Self {
			codec: config.codec.clone(),
			description: config.description.clone(),
			coded_width: config.coded_width,
			coded_height: config.coded_height,
			optimize_for_latency: config.optimize_for_latency.unwrap_or(true),
		}
	}

	/// Build the capability-query config for a video rendition.
	///
	/// For CMAF we only ask about the codec and latency preference; the
	/// description and dimensions are configured later, at construction.
	/// For legacy containers the full config is the question.
	pub fn video_support(config: &catalog::VideoConfig) -> Self {
		let mut this = Self::video(config);

		if let catalog::Container::Cmaf { .. } = config.container {
			this.description = None;
			this.coded_width = None;
			this.coded_height = None;
		}

		this
	}

	/// True if the two configs differ only in coded dimensions.
	///
	/// Such a change never requires tearing the decoder down.
	pub fn resize_only(&self, other: &Self) -> bool {
		self.codec == other.codec
			&& self.description == other.description
			&& self.optimize_for_latency == other.optimize_for_latency
			&& (self.coded_width != other.coded_width || self.coded_height != other.coded_height)
	}
}

/// A decoded video frame.
///
/// The pixel data is decoder-specific and opaque to the pipeline; the
/// renderer downcasts or copies as needed.
#[derive(Debug, Clone)]
pub struct VideoFrame {
	/// Presentation timestamp in producer microseconds.
	pub timestamp: Timestamp,

	pub width: u32,
	pub height: u32,

	/// The size of the encoded sample this frame came from.
	pub encoded_bytes: usize,
}

/// A decoded chunk of audio samples (interleaved f32).
#[derive(Debug, Clone)]
pub struct AudioFrame {
	pub timestamp: Timestamp,
	pub sample_rate: u32,
	pub channel_count: u32,
	pub samples: std::sync::Arc<Vec<f32>>,
}

/// A video decoder, logically single-owner.
///
/// Implementations are synchronous state machines: [Self::decode] accepts an
/// encoded sample, [Self::poll] drains whatever frames are ready. An `Err`
/// from either is fatal for the instance; the pipeline tears it down and
/// re-enters rendition selection.
pub trait VideoDecoder: Send + 'static {
	/// Can this platform decode the given config?
	fn is_supported(config: &DecoderConfig) -> bool
	where
		Self: Sized;

	fn new(config: &DecoderConfig) -> crate::Result<Self>
	where
		Self: Sized;

	/// Apply a config change that only affects coded dimensions.
	fn reconfigure(&mut self, config: &DecoderConfig) -> crate::Result<()>;

	/// Feed an encoded sample.
	fn decode(&mut self, sample: &Sample) -> crate::Result<()>;

	/// Drain the next decoded frame, if any is ready.
	fn poll(&mut self) -> crate::Result<Option<VideoFrame>>;
}

/// An audio decoder; same contract as [VideoDecoder] minus reconfiguration.
pub trait AudioDecoder: Send + 'static {
	fn is_supported(config: &catalog::AudioConfig) -> bool
	where
		Self: Sized;

	fn new(config: &catalog::AudioConfig) -> crate::Result<Self>
	where
		Self: Sized;

	fn decode(&mut self, sample: &Sample) -> crate::Result<()>;

	fn poll(&mut self) -> crate::Result<Option<AudioFrame>>;
}
