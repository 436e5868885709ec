use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_with::hex::Hex;

use super::Container;

/// Information about the video renditions in the catalog.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Video {
	/// A map of track name to rendition configuration.
	///
	/// We use a BTreeMap so the iteration order is deterministic; rendition
	/// selection tie-breaks on it.
	pub renditions: BTreeMap<String, VideoConfig>,

	/// Render the video at this size in pixels.
	///
	/// This is separate from the coded size because it does not require
	/// reinitializing the decoder.
	#[serde(default)]
	pub display: Option<Display>,

	/// If true, the renderer should flip the video horizontally.
	#[serde(default)]
	pub flip: Option<bool>,
}

/// Display size for rendering video.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Display {
	pub width: u32,
	pub height: u32,
}

/// Video decoder configuration, modeled on WebCodecs VideoDecoderConfig.
///
/// Reference: <https://w3c.github.io/webcodecs/#video-decoder-config>
#[serde_with::serde_as]
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
	/// The codec string, see the registry for details:
	/// <https://w3c.github.io/webcodecs/codec_registry.html>
	pub codec: String,

	/// Codec-specific initialization data, hex-encoded on the wire.
	///
	/// For H.264 this is the avcC blob (sps/pps). If absent, the information
	/// is expected in-band before each keyframe.
	#[serde(default)]
	#[serde_as(as = "Option<Hex>")]
	pub description: Option<Bytes>,

	/// The encoded width/height of the media.
	///
	/// Optional because some codecs can change it in-band; it's primarily a
	/// hint to allocate the right amount of memory up-front. Changing only
	/// these values never requires a decoder teardown.
	pub coded_width: Option<u32>,
	pub coded_height: Option<u32>,

	/// If true, the decoder should prioritize latency over throughput.
	///
	/// Default: true
	#[serde(default)]
	pub optimize_for_latency: Option<bool>,

	/// Container format for the track's group payloads.
	#[serde(default)]
	pub container: Container,
}

impl VideoConfig {
	/// The number of coded pixels, used for rendition selection.
	pub fn pixels(&self) -> Option<u64> {
		Some(self.coded_width? as u64 * self.coded_height? as u64)
	}
}
