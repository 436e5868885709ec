//! Helper library for native MoQ viewers.
//!
//! Establishes a WebTransport (HTTP/3) connection from a URL and performs
//! the MoQ handshake, returning a [moq_sub::Session] ready to consume.
//!
//! URLs follow the viewer convention:
//! - `https://host:port/path` — verified TLS.
//! - `http://host:port/path` — development only; certificate verification
//!   is disabled.
//! - A `?jwt=<token>` query parameter is passed through for the relay to
//!   validate.

mod client;
mod log;

pub use client::*;
pub use log::*;

// Re-export these crates.
pub use moq_sub;
pub use rustls;
pub use web_transport_quinn;
