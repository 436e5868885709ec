use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_with::hex::Hex;

/// Information about the audio track in the catalog.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Audio {
	/// The track name carrying the audio, "audio" if absent.
	#[serde(default = "default_track")]
	pub track: String,

	pub config: AudioConfig,
}

fn default_track() -> String {
	"audio".to_string()
}

/// Audio decoder configuration, modeled on WebCodecs AudioDecoderConfig.
#[serde_with::serde_as]
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
	/// The codec string, e.g. "opus" or "mp4a.40.2".
	pub codec: String,

	pub sample_rate: u32,

	pub channel_count: u32,

	/// Codec-specific initialization data, hex-encoded on the wire.
	#[serde(default)]
	#[serde_as(as = "Option<Hex>")]
	pub description: Option<Bytes>,

	/// Container format for the track's group payloads.
	#[serde(default)]
	pub container: super::Container,
}
