use crate::coding;

/// A list of possible errors that can occur during the session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
	#[error("transport error")]
	Transport,

	#[error("decode error")]
	Decode,

	#[error("unsupported versions")]
	Version,

	/// An unexpected stream type was received
	#[error("unexpected stream type")]
	UnexpectedStream,

	/// Some VarInt was too large and we were too lazy to handle it
	#[error("varint bounds exceeded")]
	BoundsExceeded,

	/// A duplicate ID was used
	#[error("duplicate")]
	Duplicate,

	// Cancel is returned when the peer is no longer interested.
	#[error("cancelled")]
	Cancel,

	/// It took too long to open or transmit a stream.
	#[error("timeout")]
	Timeout,

	/// The group is older than the delivery window and was dropped.
	#[error("old")]
	Old,

	#[error("not found")]
	NotFound,

	#[error("wrong frame size")]
	WrongSize,

	#[error("protocol violation")]
	ProtocolViolation,

	#[error("unauthorized")]
	Unauthorized,

	/// All handles were dropped without an explicit close.
	#[error("dropped")]
	Dropped,
}

impl Error {
	/// An integer code that is sent over the wire.
	pub fn to_code(&self) -> u32 {
		match self {
			Self::Cancel => 0,
			Self::Old => 2,
			Self::Timeout => 3,
			Self::Transport => 4,
			Self::Decode => 5,
			Self::Unauthorized => 6,
			Self::Version => 9,
			Self::UnexpectedStream => 10,
			Self::BoundsExceeded => 11,
			Self::Duplicate => 12,
			Self::NotFound => 13,
			Self::WrongSize => 14,
			Self::ProtocolViolation => 15,
			Self::Dropped => 16,
		}
	}

	/// Decode an error from a wire code.
	pub fn from_code(code: u32) -> Self {
		match code {
			0 => Self::Cancel,
			2 => Self::Old,
			3 => Self::Timeout,
			4 => Self::Transport,
			5 => Self::Decode,
			6 => Self::Unauthorized,
			9 => Self::Version,
			10 => Self::UnexpectedStream,
			11 => Self::BoundsExceeded,
			12 => Self::Duplicate,
			13 => Self::NotFound,
			14 => Self::WrongSize,
			15 => Self::ProtocolViolation,
			16 => Self::Dropped,
			_ => Self::ProtocolViolation,
		}
	}

	/// Convert a transport error into an [Error].
	///
	/// The transport error types differ per backend, so we only keep the text.
	pub fn from_transport(err: impl std::fmt::Display) -> Self {
		tracing::debug!(%err, "transport error");
		Self::Transport
	}
}

impl From<coding::DecodeError> for Error {
	fn from(err: coding::DecodeError) -> Self {
		tracing::warn!(%err, "decode error");
		Error::Decode
	}
}

pub type Result<T> = std::result::Result<T, Error>;
