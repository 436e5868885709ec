//! The CMAF container: fragmented MP4 `moof`/`mdat` pairs.
//!
//! Unlike a full fMP4 file there is no `moov`; the decoder configuration
//! comes from the catalog (`description`) and the timescale from the
//! catalog's container field. Each group carries complete fragments, so the
//! parser only has to pair a `moof` with the following `mdat` and walk the
//! `trun` entries.

use bytes::{Buf, Bytes, BytesMut};
use mp4_atom::{Any, DecodeMaybe, Moof};

use crate::{Error, Result, Sample, Timestamp};

/// A streaming parser for one track's CMAF payloads.
///
/// Payloads may split atoms at arbitrary boundaries; the parser buffers
/// until a whole atom is available. Call [Self::reset] at a group boundary
/// so a lost group can't leave half a fragment behind.
pub struct Cmaf {
	timescale: u64,

	buffer: BytesMut,

	// The latest moof header, waiting for its mdat.
	moof: Option<Moof>,
	moof_size: usize,
}

impl Cmaf {
	pub fn new(timescale: u64) -> Self {
		Self {
			timescale,
			buffer: BytesMut::new(),
			moof: None,
			moof_size: 0,
		}
	}

	/// Discard any partially buffered fragment, e.g. after a lost group.
	pub fn reset(&mut self) {
		self.buffer.clear();
		self.moof = None;
		self.moof_size = 0;
	}

	/// Feed a payload, returning all samples completed by it.
	pub fn decode<B: Into<Bytes>>(&mut self, payload: B) -> Result<Vec<Sample>> {
		self.buffer.extend_from_slice(&payload.into());

		let mut samples = Vec::new();

		loop {
			let mut cursor = std::io::Cursor::new(self.buffer.as_ref());

			let atom = match Any::decode_maybe(&mut cursor) {
				Ok(Some(atom)) => atom,
				// Not enough data for a whole atom yet.
				Ok(None) => break,
				Err(err) => {
					tracing::debug!(%err, "failed to parse atom");
					return Err(Error::MalformedContainer("invalid atom"));
				}
			};

			let size = cursor.position() as usize;

			match atom {
				Any::Ftyp(_) | Any::Styp(_) => {
					// Compatibility markers; nothing to do.
				}
				Any::Moof(moof) => {
					if self.moof.is_some() {
						return Err(Error::MalformedContainer("duplicate moof"));
					}

					self.moof = Some(moof);
					self.moof_size = size;
				}
				Any::Mdat(mdat) => {
					let data = Bytes::from(mdat.data);
					let header_size = size - data.len();
					self.extract(data, header_size, &mut samples)?;
				}
				atom => {
					// Unknown atoms are legal; skip them.
					tracing::warn!(?atom, "skipping atom");
				}
			}

			self.buffer.advance(size);
		}

		Ok(samples)
	}

	// Extract all samples out of an mdat atom, using the pending moof.
	fn extract(&mut self, mdat: Bytes, header_size: usize, samples: &mut Vec<Sample>) -> Result<()> {
		let moof = self.moof.take().ok_or(Error::MalformedContainer("mdat without moof"))?;
		let moof_size = std::mem::take(&mut self.moof_size);

		for traf in &moof.traf {
			let tfhd = &traf.tfhd;
			let tfdt = traf.tfdt.as_ref().ok_or(Error::MalformedContainer("missing tfdt"))?;

			let mut dts = tfdt.base_media_decode_time;
			let mut offset = tfhd.base_data_offset.unwrap_or_default() as usize;

			if traf.trun.is_empty() {
				return Err(Error::MalformedContainer("missing trun"));
			}

			for trun in &traf.trun {
				if let Some(data_offset) = trun.data_offset {
					let base_offset = tfhd.base_data_offset.unwrap_or_default() as usize;

					// This is relative to the start of the moof, not the mdat.
					// Note: The offset can be negative in theory; not supported here.
					let data_offset: usize = data_offset
						.try_into()
						.map_err(|_| Error::MalformedContainer("negative data offset"))?;
					if data_offset < moof_size {
						return Err(Error::MalformedContainer("invalid data offset"));
					}

					offset = base_offset + data_offset - moof_size - header_size;
				}

				for entry in &trun.entries {
					// Use the tfhd defaults if the sample doesn't have its own values.
					let flags = entry.flags.unwrap_or(tfhd.default_sample_flags.unwrap_or_default());
					let duration = entry.duration.unwrap_or(tfhd.default_sample_duration.unwrap_or_default());
					let size = entry.size.unwrap_or(tfhd.default_sample_size.unwrap_or_default()) as usize;

					// Presentation is dts-based; cts offsets are not applied.
					let timestamp = Timestamp::from_timescale(dts, self.timescale)?;

					if offset + size > mdat.len() {
						return Err(Error::MalformedContainer("sample out of bounds"));
					}

					// https://chromium.googlesource.com/chromium/src/media/+/master/formats/mp4/track_run_iterator.cc#177
					let keyframe = (flags >> 24) & 0x3 == 0x2; // kSampleDependsOnNoOther
					let non_sync = (flags >> 16) & 0x1 == 0x1; // kSampleIsNonSyncSample

					samples.push(Sample {
						timestamp,
						keyframe: keyframe && !non_sync,
						payload: mdat.slice(offset..offset + size),
					});

					dts += duration as u64;
					offset += size;
				}
			}
		}

		Ok(())
	}
}
