use serde::{Deserialize, Serialize};

/// The container format used for a track's group payloads.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Container {
	/// Fragmented MP4: each group is a sequence of `moof`/`mdat` pairs.
	Cmaf {
		/// Units per second for `tfdt`/`trun` values.
		timescale: u64,
	},

	/// The legacy framed container: each frame is a varint timestamp in
	/// microseconds followed by the codec payload. The first frame of a
	/// group is the keyframe.
	Legacy,
}

impl Default for Container {
	fn default() -> Self {
		// Tracks published before the container field existed are legacy.
		Self::Legacy
	}
}
