//! The catalog describes available media tracks and codecs.
//!
//! This is a JSON blob on a reserved track, replaced wholesale with every
//! group. It describes the available renditions, codec configuration,
//! display geometry, and buffering hints.

mod audio;
mod consumer;
mod container;
mod video;

pub use audio::*;
pub use consumer::*;
pub use container::*;
pub use video::*;

use serde::{Deserialize, Serialize};

use crate::Result;

/// The root catalog document.
///
/// At least one of `video` or `audio` is expected; everything else is
/// optional. Unknown fields are ignored so publishers can extend the format.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
	#[serde(default)]
	pub video: Option<Video>,

	#[serde(default)]
	pub audio: Option<Audio>,

	/// The minimum amount of media the player should buffer, in milliseconds.
	///
	/// A hint from the publisher; the latency target should not go below it.
	#[serde(default)]
	pub min_buffer: Option<u64>,
}

impl Catalog {
	/// The reserved track name carrying the catalog.
	pub const TRACK: &'static str = "catalog.json";

	/// The track handle used to subscribe to the catalog.
	pub fn track() -> moq_sub::Track {
		moq_sub::Track {
			name: Self::TRACK.to_string(),
			priority: moq_sub::PRIORITY_CATALOG,
		}
	}

	pub fn from_slice(data: &[u8]) -> Result<Self> {
		Ok(serde_json::from_slice(data)?)
	}

	pub fn to_string(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse() {
		let json = r#"{
			"video": {
				"renditions": {
					"hd": {
						"codec": "avc1.640028",
						"codedWidth": 1920,
						"codedHeight": 1080,
						"description": "0142c028ffe1",
						"container": { "kind": "cmaf", "timescale": 90000 }
					},
					"sd": {
						"codec": "avc1.42e01e",
						"codedWidth": 640,
						"codedHeight": 360,
						"container": { "kind": "legacy" }
					}
				},
				"display": { "width": 1280, "height": 720 },
				"flip": true
			},
			"audio": {
				"config": {
					"codec": "opus",
					"sampleRate": 48000,
					"channelCount": 2
				}
			},
			"minBuffer": 120
		}"#;

		let catalog = Catalog::from_slice(json.as_bytes()).unwrap();

		let video = catalog.video.as_ref().unwrap();
		assert_eq!(video.renditions.len(), 2);
		assert_eq!(video.flip, Some(true));

		let hd = &video.renditions["hd"];
		assert_eq!(hd.codec, "avc1.640028");
		assert_eq!(hd.coded_width, Some(1920));
		assert_eq!(hd.description.as_ref().unwrap().as_ref(), &[0x01, 0x42, 0xc0, 0x28, 0xff, 0xe1]);
		assert_eq!(hd.container, Container::Cmaf { timescale: 90000 });

		let sd = &video.renditions["sd"];
		assert_eq!(sd.container, Container::Legacy);
		assert!(sd.description.is_none());

		let audio = catalog.audio.as_ref().unwrap();
		assert_eq!(audio.config.sample_rate, 48000);
		assert_eq!(catalog.min_buffer, Some(120));
	}

	#[test]
	fn roundtrip() {
		let catalog = Catalog {
			video: Some(Video {
				renditions: [(
					"hd".to_string(),
					VideoConfig {
						codec: "avc1.640028".to_string(),
						coded_width: Some(1920),
						coded_height: Some(1080),
						container: Container::Cmaf { timescale: 90000 },
						..Default::default()
					},
				)]
				.into(),
				..Default::default()
			}),
			..Default::default()
		};

		let encoded = catalog.to_string().unwrap();
		let decoded = Catalog::from_slice(encoded.as_bytes()).unwrap();
		assert_eq!(catalog, decoded);
	}

	#[test]
	fn malformed() {
		assert!(Catalog::from_slice(b"not json").is_err());
	}

	#[test]
	fn unknown_fields() {
		// Publishers may extend the catalog; we must not choke.
		let json = r#"{ "video": { "renditions": {} }, "futureField": 1 }"#;
		Catalog::from_slice(json.as_bytes()).unwrap();
	}
}
