//! In-crate decoder fakes for driving the pipeline in tests.

use std::collections::VecDeque;

use crate::{
	catalog,
	decode::{AudioDecoder, AudioFrame, DecoderConfig, VideoDecoder, VideoFrame},
	Result, Sample,
};

/// A video "decoder" that echoes every sample back as a decoded frame.
///
/// Supports any codec whose string doesn't start with `x-`, so tests can
/// express unsupported renditions.
pub struct FakeVideo {
	config: DecoderConfig,
	frames: VecDeque<VideoFrame>,
}

impl VideoDecoder for FakeVideo {
	fn is_supported(config: &DecoderConfig) -> bool {
		!config.codec.starts_with("x-")
	}

	fn new(config: &DecoderConfig) -> Result<Self> {
		Ok(Self {
			config: config.clone(),
			frames: VecDeque::new(),
		})
	}

	fn reconfigure(&mut self, config: &DecoderConfig) -> Result<()> {
		self.config.coded_width = config.coded_width;
		self.config.coded_height = config.coded_height;
		Ok(())
	}

	fn decode(&mut self, sample: &Sample) -> Result<()> {
		self.frames.push_back(VideoFrame {
			timestamp: sample.timestamp,
			width: self.config.coded_width.unwrap_or(0),
			height: self.config.coded_height.unwrap_or(0),
			encoded_bytes: sample.payload.len(),
		});
		Ok(())
	}

	fn poll(&mut self) -> Result<Option<VideoFrame>> {
		Ok(self.frames.pop_front())
	}
}

/// The audio equivalent of [FakeVideo].
pub struct FakeAudio {
	config: catalog::AudioConfig,
	frames: VecDeque<AudioFrame>,
}

impl AudioDecoder for FakeAudio {
	fn is_supported(config: &catalog::AudioConfig) -> bool {
		!config.codec.starts_with("x-")
	}

	fn new(config: &catalog::AudioConfig) -> Result<Self> {
		Ok(Self {
			config: config.clone(),
			frames: VecDeque::new(),
		})
	}

	fn decode(&mut self, sample: &Sample) -> Result<()> {
		self.frames.push_back(AudioFrame {
			timestamp: sample.timestamp,
			sample_rate: self.config.sample_rate,
			channel_count: self.config.channel_count,
			samples: std::sync::Arc::new(vec![0.0; sample.payload.len()]),
		});
		Ok(())
	}

	fn poll(&mut self) -> Result<Option<AudioFrame>> {
		Ok(self.frames.pop_front())
	}
}
