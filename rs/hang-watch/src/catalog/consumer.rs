use super::Catalog;
use crate::Result;

/// A catalog consumer, yielding each catalog update in turn.
///
/// This wraps a [moq_sub::TrackConsumer] and deserializes the JSON payload.
/// Each group supersedes the previous one; if groups pile up, only the most
/// recent is parsed.
pub struct CatalogConsumer {
	track: moq_sub::TrackConsumer,
	group: Option<moq_sub::GroupConsumer>,
}

impl CatalogConsumer {
	pub fn new(track: moq_sub::TrackConsumer) -> Self {
		Self { track, group: None }
	}

	/// Get the next catalog update.
	///
	/// Returns `None` when the track ends. A malformed catalog is logged and
	/// skipped; the caller keeps using the previous one.
	pub async fn next(&mut self) -> Result<Option<Catalog>> {
		loop {
			tokio::select! {
				// Always prefer a newer group; the old one is superseded.
				biased;
				res = self.track.next_group() => {
					match res? {
						// Switch to the newer group; any half-read one is stale.
						Some(group) => self.group = Some(group),
						None => return Ok(None),
					}
				},
				Some(frame) = async { self.group.as_mut()?.read_frame().await.transpose() } => {
					// The whole catalog fits in one frame.
					self.group.take();

					match Catalog::from_slice(&frame?) {
						Ok(catalog) => return Ok(Some(catalog)),
						Err(err) => tracing::warn!(%err, "malformed catalog; keeping the previous one"),
					}
				}
			}
		}
	}

	/// Wait until the catalog track is closed.
	pub async fn closed(&self) -> Result<()> {
		Ok(self.track.closed().await?)
	}
}

impl From<moq_sub::TrackConsumer> for CatalogConsumer {
	fn from(track: moq_sub::TrackConsumer) -> Self {
		Self::new(track)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::FutureExt;

	fn publish(track: &mut moq_sub::TrackProducer, json: &str) {
		let mut group = track.append_group().unwrap();
		group.write_frame(json.as_bytes().to_vec()).unwrap();
		group.close().unwrap();
	}

	#[tokio::test]
	async fn latest_wins() {
		let mut track = moq_sub::Track::new(Catalog::TRACK).produce();
		let mut catalog = CatalogConsumer::new(track.consumer);

		publish(&mut track.producer, r#"{ "minBuffer": 1 }"#);
		publish(&mut track.producer, r#"{ "minBuffer": 2 }"#);

		// Both groups were buffered before we read; only the newest is parsed.
		let parsed = catalog.next().await.unwrap().unwrap();
		assert_eq!(parsed.min_buffer, Some(2));

		publish(&mut track.producer, r#"{ "minBuffer": 3 }"#);
		let parsed = catalog.next().await.unwrap().unwrap();
		assert_eq!(parsed.min_buffer, Some(3));
	}

	#[tokio::test]
	async fn malformed_keeps_previous() {
		let mut track = moq_sub::Track::new(Catalog::TRACK).produce();
		let mut catalog = CatalogConsumer::new(track.consumer);

		publish(&mut track.producer, "not json");

		// The malformed group is consumed and skipped; no update surfaces.
		assert!(catalog.next().now_or_never().is_none());

		publish(&mut track.producer, r#"{ "minBuffer": 3 }"#);
		let parsed = catalog.next().await.unwrap().unwrap();
		assert_eq!(parsed.min_buffer, Some(3));
	}

	#[tokio::test]
	async fn ended() {
		let mut track = moq_sub::Track::new(Catalog::TRACK).produce();
		let mut catalog = CatalogConsumer::new(track.consumer);

		track.producer.close().unwrap();
		assert!(catalog.next().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn pending() {
		let track = moq_sub::Track::new(Catalog::TRACK).produce();
		let mut catalog = CatalogConsumer::new(track.consumer);

		assert!(catalog.next().now_or_never().is_none());
	}
}
