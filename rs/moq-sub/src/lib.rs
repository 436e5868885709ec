//! # moq-sub: Media over QUIC subscription transport
//!
//! The consumer half of a MoQ stack: connect to a relay, discover broadcasts,
//! subscribe to tracks, and read groups of frames as they arrive.
//!
//! ## API
//!
//! The API is built around Producer/Consumer pairs, with the hierarchy:
//! - [Session]: A connection to a relay, producing announced [Broadcast]s.
//! - [Broadcast]: A collection of [Track]s, published under a [Path].
//! - [Track]: A collection of [Group]s, delivered out-of-order until dropped.
//! - [Group]: A collection of [Frame]s, delivered in order until cancelled.
//!
//! A typical viewer:
//! - [Session::connect] to establish the session over any WebTransport-like
//!   transport.
//! - [Session::announced] to discover broadcasts under a path prefix.
//! - [Session::consume] + [BroadcastConsumer::subscribe] for each track.
//! - [TrackConsumer::next_group] / [GroupConsumer::read_frame] to read media.
//!
//! Groups are delivered on independent transport streams; a slow group never
//! blocks a newer one. If the transport abandons a group mid-flight the
//! consumer observes an error for that group only and continues at the next.

mod error;
mod model;
mod path;
mod session;

pub mod coding;
pub mod message;

pub use error::*;
pub use model::*;
pub use path::*;
pub use session::*;

/// Subscription priority for video tracks.
pub const PRIORITY_VIDEO: u8 = 1;

/// Subscription priority for audio tracks.
pub const PRIORITY_AUDIO: u8 = 2;

/// Subscription priority for the catalog track.
///
/// Higher values are served first during congestion, so the relay sheds
/// video first and the catalog last.
pub const PRIORITY_CATALOG: u8 = 3;
