use std::time::Duration;

use crate::Error;

/// A presentation timestamp in producer microseconds.
///
/// Timestamps are relative to the start of the track; there is no clock
/// synchronization and no way to recover wall-clock time from one. Only the
/// sync clock is allowed to relate producer time to wall time, which is why
/// this is a distinct type instead of a bare integer or [Duration].
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
	/// The zero timestamp.
	pub const ZERO: Self = Self(0);

	/// The maximum representable timestamp.
	pub const MAX: Self = Self(u64::MAX);

	pub const fn from_micros(micros: u64) -> Self {
		Self(micros)
	}

	pub const fn from_millis(millis: u64) -> Result<Self, Error> {
		match millis.checked_mul(1000) {
			Some(micros) => Ok(Self(micros)),
			None => Err(Error::TimestampOverflow),
		}
	}

	pub const fn from_secs(seconds: u64) -> Result<Self, Error> {
		match seconds.checked_mul(1_000_000) {
			Some(micros) => Ok(Self(micros)),
			None => Err(Error::TimestampOverflow),
		}
	}

	/// Convert a value in the given timescale (units per second) to microseconds.
	pub const fn from_timescale(value: u64, timescale: u64) -> Result<Self, Error> {
		let micros = value as u128 * 1_000_000 / timescale as u128;
		if micros > u64::MAX as u128 {
			return Err(Error::TimestampOverflow);
		}
		Ok(Self(micros as u64))
	}

	pub const fn as_micros(self) -> u64 {
		self.0
	}

	pub const fn as_millis(self) -> u64 {
		self.0 / 1000
	}

	pub const fn as_secs(self) -> u64 {
		self.0 / 1_000_000
	}

	pub fn checked_add(self, rhs: Duration) -> Option<Self> {
		let rhs: u64 = rhs.as_micros().try_into().ok()?;
		Some(Self(self.0.checked_add(rhs)?))
	}

	pub fn saturating_sub(self, rhs: Self) -> Duration {
		Duration::from_micros(self.0.saturating_sub(rhs.0))
	}
}

impl TryFrom<Duration> for Timestamp {
	type Error = Error;

	fn try_from(duration: Duration) -> Result<Self, Self::Error> {
		let micros = duration.as_micros().try_into().map_err(|_| Error::TimestampOverflow)?;
		Ok(Self(micros))
	}
}

impl From<Timestamp> for Duration {
	fn from(timestamp: Timestamp) -> Self {
		Duration::from_micros(timestamp.0)
	}
}

impl std::fmt::Debug for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}µs", self.0)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}µs", self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn timescale() {
		// 90kHz is the common video timescale.
		let ts = Timestamp::from_timescale(90_000, 90_000).unwrap();
		assert_eq!(ts.as_micros(), 1_000_000);

		let ts = Timestamp::from_timescale(3_000, 90_000).unwrap();
		assert_eq!(ts.as_micros(), 33_333);
	}

	#[test]
	fn arithmetic() {
		let ts = Timestamp::from_millis(100).unwrap();
		assert_eq!(ts.checked_add(Duration::from_millis(50)).unwrap().as_millis(), 150);
		assert_eq!(ts.saturating_sub(Timestamp::from_millis(30).unwrap()), Duration::from_millis(70));
		assert_eq!(Timestamp::ZERO.saturating_sub(ts), Duration::ZERO);
	}
}
