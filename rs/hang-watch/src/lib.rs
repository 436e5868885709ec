//! # hang-watch: live playback for MoQ broadcasts
//!
//! The viewer half of a media stack built on [`moq_sub`]: discover a
//! broadcast, read its catalog, pick a rendition, turn container payloads
//! into codec samples, and present decoded frames against a latency target.
//!
//! ## Pipeline
//!
//! transport groups → container decoder → (reorder for legacy containers) →
//! platform decoder → sync-gated frame publication.
//!
//! - **Catalog**: JSON track describing renditions and codec configs,
//!   replaced wholesale on update.
//! - **Containers**: `cmaf` (fragmented MP4) and a legacy framed container
//!   (varint timestamp + codec payload).
//! - **Sync**: the presentation clock mapping producer timestamps to wall
//!   time under a tunable end-to-end latency target.
//!
//! The platform decoder is abstracted behind the [decode] traits; an
//! FFmpeg-backed implementation is available behind the `decode` feature.

mod error;
mod sample;
mod sync;
mod timestamp;
mod watch;

pub mod catalog;
pub mod container;
pub mod decode;
pub mod source;

pub use error::*;
pub use sample::*;
pub use sync::*;
pub use timestamp::*;
pub use watch::*;

// export the moq-sub version in use
pub use moq_sub;
