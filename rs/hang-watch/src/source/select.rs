use std::collections::BTreeMap;

use crate::{catalog, decode::DecoderConfig, decode::VideoDecoder};

use super::Target;

/// Ask the platform decoder about every rendition, keeping the decodable ones.
///
/// Returned in catalog (name) order, so downstream decisions are stable.
pub fn supported_renditions<D: VideoDecoder>(video: &catalog::Video) -> Vec<String> {
	video
		.renditions
		.iter()
		.filter(|(_, config)| D::is_supported(&DecoderConfig::video_support(config)))
		.map(|(name, _)| name.clone())
		.collect()
}

/// Pick a rendition; deterministic in (renditions, supported, target).
///
/// - A supported `target.rendition` override always wins.
/// - Otherwise pick the smallest rendition at least `target.pixels` large,
///   falling back to the largest one below it. Ties break by name order.
/// - Renditions without coded dimensions only win when none have them.
pub fn select_rendition(
	renditions: &BTreeMap<String, catalog::VideoConfig>,
	supported: &[String],
	target: &Target,
) -> Option<String> {
	if let Some(name) = &target.rendition {
		if supported.contains(name) && renditions.contains_key(name) {
			return Some(name.clone());
		}
	}

	let desired = target.pixels.unwrap_or(u64::MAX);

	// Smallest at or above the target, else largest below it.
	let mut above: Option<(u64, &String)> = None;
	let mut below: Option<(u64, &String)> = None;

	for name in supported {
		let config = match renditions.get(name) {
			Some(config) => config,
			None => continue,
		};

		let area = match config.pixels() {
			Some(area) => area,
			None => continue,
		};

		if area >= desired {
			// Strict comparison keeps the first name on ties.
			if above.map(|(best, _)| area < best).unwrap_or(true) {
				above = Some((area, name));
			}
		} else if below.map(|(best, _)| area > best).unwrap_or(true) {
			below = Some((area, name));
		}
	}

	if let Some((_, name)) = above.or(below) {
		return Some(name.clone());
	}

	// No rendition had dimensions; fall back to the first supported entry.
	supported.first().cloned()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(width: u32, height: u32) -> catalog::VideoConfig {
		catalog::VideoConfig {
			codec: "avc1.640028".to_string(),
			coded_width: Some(width),
			coded_height: Some(height),
			..Default::default()
		}
	}

	fn ladder() -> BTreeMap<String, catalog::VideoConfig> {
		[
			("hd".to_string(), config(1920, 1080)),
			("sd".to_string(), config(640, 360)),
			("tiny".to_string(), config(256, 144)),
		]
		.into()
	}

	fn names(ladder: &BTreeMap<String, catalog::VideoConfig>) -> Vec<String> {
		ladder.keys().cloned().collect()
	}

	#[test]
	fn override_wins() {
		let renditions = ladder();
		let supported = names(&renditions);

		let target = Target {
			rendition: Some("sd".to_string()),
			pixels: Some(1920 * 1080),
		};

		assert_eq!(select_rendition(&renditions, &supported, &target), Some("sd".to_string()));
	}

	#[test]
	fn override_must_be_supported() {
		let renditions = ladder();
		// "hd" exists but the decoder can't handle it.
		let supported = vec!["sd".to_string(), "tiny".to_string()];

		let target = Target {
			rendition: Some("hd".to_string()),
			pixels: None,
		};

		// Falls back to pixel selection: largest available.
		assert_eq!(select_rendition(&renditions, &supported, &target), Some("sd".to_string()));
	}

	#[test]
	fn smallest_at_or_above() {
		let renditions = ladder();
		let supported = names(&renditions);

		let target = Target {
			rendition: None,
			pixels: Some(300 * 200),
		};

		assert_eq!(select_rendition(&renditions, &supported, &target), Some("sd".to_string()));
	}

	#[test]
	fn upgrade_on_target_change() {
		let renditions = ladder();
		let supported = names(&renditions);

		let small = Target {
			rendition: None,
			pixels: Some(200 * 100),
		};
		assert_eq!(select_rendition(&renditions, &supported, &small), Some("tiny".to_string()));

		let large = Target {
			rendition: None,
			pixels: Some(1920 * 1080),
		};
		assert_eq!(select_rendition(&renditions, &supported, &large), Some("hd".to_string()));
	}

	#[test]
	fn largest_below_when_nothing_above() {
		let renditions = ladder();
		let supported = names(&renditions);

		let target = Target {
			rendition: None,
			pixels: Some(4096 * 2160),
		};

		assert_eq!(select_rendition(&renditions, &supported, &target), Some("hd".to_string()));
	}

	#[test]
	fn default_is_largest() {
		let renditions = ladder();
		let supported = names(&renditions);

		assert_eq!(
			select_rendition(&renditions, &supported, &Target::default()),
			Some("hd".to_string())
		);
	}

	#[test]
	fn tie_breaks_by_name() {
		let renditions: BTreeMap<_, _> = [
			("b".to_string(), config(640, 360)),
			("a".to_string(), config(640, 360)),
		]
		.into();
		let supported = names(&renditions);

		assert_eq!(
			select_rendition(&renditions, &supported, &Target::default()),
			Some("a".to_string())
		);
	}

	#[test]
	fn no_dimensions_falls_back_to_first() {
		let mut no_dims = catalog::VideoConfig::default();
		no_dims.codec = "avc1.640028".to_string();

		let renditions: BTreeMap<_, _> = [
			("one".to_string(), no_dims.clone()),
			("two".to_string(), no_dims),
		]
		.into();
		let supported = names(&renditions);

		assert_eq!(
			select_rendition(&renditions, &supported, &Target::default()),
			Some("one".to_string())
		);
	}

	#[test]
	fn empty_supported() {
		let renditions = ladder();
		assert_eq!(select_rendition(&renditions, &[], &Target::default()), None);
	}
}
