//! FFmpeg-backed decoders for native playback.

use ffmpeg_next as ffmpeg;

use super::{AudioDecoder, AudioFrame, DecoderConfig, VideoDecoder, VideoFrame};
use crate::{catalog, Error, Result, Sample};

fn video_codec_id(codec: &str) -> Option<ffmpeg::codec::Id> {
	// WebCodecs registry strings, matched on the fourcc prefix.
	let id = match codec.split('.').next()? {
		"avc1" | "avc3" => ffmpeg::codec::Id::H264,
		"hev1" | "hvc1" => ffmpeg::codec::Id::HEVC,
		"vp8" => ffmpeg::codec::Id::VP8,
		"vp09" => ffmpeg::codec::Id::VP9,
		"av01" => ffmpeg::codec::Id::AV1,
		_ => return None,
	};
	Some(id)
}

fn audio_codec_id(codec: &str) -> Option<ffmpeg::codec::Id> {
	let id = match codec.split('.').next()? {
		"opus" => ffmpeg::codec::Id::OPUS,
		"mp4a" => ffmpeg::codec::Id::AAC,
		_ => return None,
	};
	Some(id)
}

/// Video decoding via FFmpeg.
pub struct FfmpegVideo {
	decoder: ffmpeg::decoder::Video,
	config: DecoderConfig,

	// Encoded sizes of in-flight samples, popped as frames come out.
	pending: std::collections::VecDeque<usize>,
}

impl VideoDecoder for FfmpegVideo {
	fn is_supported(config: &DecoderConfig) -> bool {
		match video_codec_id(&config.codec) {
			Some(id) => ffmpeg::codec::decoder::find(id).is_some(),
			None => false,
		}
	}

	fn new(config: &DecoderConfig) -> Result<Self> {
		ffmpeg::init().map_err(Error::decoder)?;

		let id = video_codec_id(&config.codec).ok_or(Error::Unsupported)?;
		let codec = ffmpeg::codec::decoder::find(id).ok_or(Error::Unsupported)?;

		let context = ffmpeg::codec::context::Context::new_with_codec(codec);
		let mut decoder = context.decoder();

		// Set extra data if provided (e.g. avcC for H.264).
		if let Some(description) = &config.description {
			unsafe {
				let raw = decoder.as_mut_ptr();
				(*raw).extradata = ffmpeg::sys::av_malloc(description.len()) as *mut u8;
				(*raw).extradata_size = description.len() as i32;
				std::ptr::copy_nonoverlapping(description.as_ptr(), (*raw).extradata, description.len());
			}
		}

		let decoder = decoder.video().map_err(Error::decoder)?;

		Ok(Self {
			decoder,
			config: config.clone(),
			pending: Default::default(),
		})
	}

	fn reconfigure(&mut self, config: &DecoderConfig) -> Result<()> {
		// Dimensions are read from the bitstream; just remember the hint.
		self.config.coded_width = config.coded_width;
		self.config.coded_height = config.coded_height;
		Ok(())
	}

	fn decode(&mut self, sample: &Sample) -> Result<()> {
		let mut packet = ffmpeg::codec::packet::Packet::copy(sample.payload.as_ref());
		packet.set_pts(Some(sample.timestamp.as_micros() as i64));

		self.decoder.send_packet(&packet).map_err(Error::decoder)?;
		self.pending.push_back(sample.payload.len());

		Ok(())
	}

	fn poll(&mut self) -> Result<Option<VideoFrame>> {
		let mut decoded = ffmpeg::frame::Video::empty();
		match self.decoder.receive_frame(&mut decoded) {
			Ok(()) => Ok(Some(VideoFrame {
				timestamp: crate::Timestamp::from_micros(decoded.pts().unwrap_or(0) as u64),
				width: decoded.width(),
				height: decoded.height(),
				// The codec may buffer, but frames come out one per packet.
				encoded_bytes: self.pending.pop_front().unwrap_or(0),
			})),
			// EAGAIN means no frame is ready; that's not an error.
			Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => Ok(None),
			Err(err) => Err(Error::decoder(err)),
		}
	}
}

/// Audio decoding via FFmpeg.
pub struct FfmpegAudio {
	decoder: ffmpeg::decoder::Audio,
	sample_rate: u32,
	channel_count: u32,
}

impl AudioDecoder for FfmpegAudio {
	fn is_supported(config: &catalog::AudioConfig) -> bool {
		match audio_codec_id(&config.codec) {
			Some(id) => ffmpeg::codec::decoder::find(id).is_some(),
			None => false,
		}
	}

	fn new(config: &catalog::AudioConfig) -> Result<Self> {
		ffmpeg::init().map_err(Error::decoder)?;

		let id = audio_codec_id(&config.codec).ok_or(Error::Unsupported)?;
		let codec = ffmpeg::codec::decoder::find(id).ok_or(Error::Unsupported)?;

		let context = ffmpeg::codec::context::Context::new_with_codec(codec);
		let mut decoder = context.decoder();

		if let Some(description) = &config.description {
			unsafe {
				let raw = decoder.as_mut_ptr();
				(*raw).extradata = ffmpeg::sys::av_malloc(description.len()) as *mut u8;
				(*raw).extradata_size = description.len() as i32;
				std::ptr::copy_nonoverlapping(description.as_ptr(), (*raw).extradata, description.len());
			}
		}

		let decoder = decoder.audio().map_err(Error::decoder)?;

		Ok(Self {
			decoder,
			sample_rate: config.sample_rate,
			channel_count: config.channel_count,
		})
	}

	fn decode(&mut self, sample: &Sample) -> Result<()> {
		let mut packet = ffmpeg::codec::packet::Packet::copy(sample.payload.as_ref());
		packet.set_pts(Some(sample.timestamp.as_micros() as i64));

		self.decoder.send_packet(&packet).map_err(Error::decoder)
	}

	fn poll(&mut self) -> Result<Option<AudioFrame>> {
		let mut decoded = ffmpeg::frame::Audio::empty();
		match self.decoder.receive_frame(&mut decoded) {
			Ok(()) => {
				let plane: &[f32] = decoded.plane(0);
				Ok(Some(AudioFrame {
					timestamp: crate::Timestamp::from_micros(decoded.pts().unwrap_or(0) as u64),
					sample_rate: self.sample_rate,
					channel_count: self.channel_count,
					samples: std::sync::Arc::new(plane.to_vec()),
				}))
			}
			Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => Ok(None),
			Err(err) => Err(Error::decoder(err)),
		}
	}
}
