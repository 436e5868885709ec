//! Rendition sources: subscribe, decode, and publish frames.
//!
//! One source exists per media type. A source owns its decoder pipelines,
//! reacts to catalog and target changes, and publishes decoded frames gated
//! on the shared [crate::SyncClock].

mod audio;
mod select;
mod video;

pub use audio::*;
pub use select::*;
pub use video::*;

#[cfg(test)]
pub(crate) mod fake;

use crate::Timestamp;

/// What the viewer wants to watch; the source picks the closest rendition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
	/// A manual rendition override; wins when supported.
	pub rendition: Option<String>,

	/// The desired number of pixels; None means "as large as possible".
	pub pixels: Option<u64>,
}

/// Whether a frame is currently published.
///
/// `Empty` only while enabled with nothing to show; the UI renders a
/// buffering indicator off this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BufferStatus {
	Empty,
	#[default]
	Filled,
}

/// Counters for the UI's stats overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
	pub frame_count: u64,
	pub bytes_received: u64,

	/// The timestamp of the most recently published frame.
	pub timestamp: Option<Timestamp>,
}
