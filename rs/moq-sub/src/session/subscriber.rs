use std::{
	collections::HashMap,
	sync::{atomic, Arc},
};

use web_async::Lock;

use super::Stream;
use crate::{
	coding::Reader, message, Broadcast, BroadcastProducer, Error, Frame, GroupProducer, OriginProducer, Path, Result,
	TrackProducer,
};

/// Drives the subscription half of a session.
///
/// One announce stream discovers broadcasts, one subscribe stream is opened
/// per requested track, and group data arrives on unidirectional streams.
pub(super) struct Subscriber<S: web_transport_trait::Session> {
	session: S,

	// Active subscriptions by id, so group streams can be routed.
	subscribes: Lock<HashMap<u64, TrackProducer>>,
	next_id: Arc<atomic::AtomicU64>,
}

impl<S: web_transport_trait::Session> Clone for Subscriber<S> {
	fn clone(&self) -> Self {
		Self {
			session: self.session.clone(),
			subscribes: self.subscribes.clone(),
			next_id: self.next_id.clone(),
		}
	}
}

impl<S: web_transport_trait::Session> Subscriber<S> {
	pub fn new(session: S) -> Self {
		Self {
			session,
			subscribes: Default::default(),
			next_id: Default::default(),
		}
	}

	pub async fn run(
		self,
		origin: OriginProducer,
		requested: async_channel::Receiver<BroadcastProducer>,
	) -> Result<()> {
		// A single announce stream covers the whole session root; prefixes are
		// filtered locally by the origin.
		let mut announced = Stream::open(&self.session, message::ControlType::Announce).await?;
		announced
			.writer
			.encode(&message::AnnouncePlease {
				prefix: Path::default(),
			})
			.await?;

		let res = tokio::select! {
			res = self.clone().run_announced(announced, origin) => res,
			res = self.clone().run_requested(requested) => res,
			res = self.clone().run_groups() => res,
		};

		// Tear down every subscription so no further frames surface.
		for (_, mut track) in self.subscribes.lock().drain() {
			track.abort(Error::Transport).ok();
		}

		res
	}

	async fn run_announced(self, mut stream: Stream<S>, mut origin: OriginProducer) -> Result<()> {
		let mut producers: HashMap<Path, BroadcastProducer> = HashMap::new();

		while let Some(announce) = stream.reader.decode_maybe::<message::Announce>().await? {
			match announce {
				message::Announce::Active { suffix } => {
					tracing::debug!(broadcast = %suffix, "received announce");

					let broadcast = Broadcast::new(suffix.clone()).produce();
					origin.publish(suffix.clone(), broadcast.consumer);

					if producers.insert(suffix, broadcast.producer.clone()).is_some() {
						// Re-announced without an end; the origin already re-announced it.
						tracing::warn!("duplicate announce");
					}

					web_async::spawn(self.clone().run_broadcast(broadcast.producer));
				}
				message::Announce::Ended { suffix } => {
					tracing::debug!(broadcast = %suffix, "received unannounce");

					// The broadcast goes offline but existing subscriptions continue.
					producers.remove(&suffix).ok_or(Error::ProtocolViolation)?;
					origin.unpublish(&suffix);
				}
			}
		}

		// The server is done announcing, but the session stays up; existing
		// and future subscriptions continue to be served.
		std::future::pending().await
	}

	// Serve broadcasts created by Session::consume for paths that were never announced.
	async fn run_requested(self, requested: async_channel::Receiver<BroadcastProducer>) -> Result<()> {
		while let Ok(broadcast) = requested.recv().await {
			web_async::spawn(self.clone().run_broadcast(broadcast));
		}

		// The session handle is gone but the driver keeps serving.
		std::future::pending().await
	}

	async fn run_broadcast(self, mut broadcast: BroadcastProducer) {
		let path = broadcast.path.clone();

		while let Some(track) = broadcast.requested_track().await {
			let id = self.next_id.fetch_add(1, atomic::Ordering::Relaxed);
			let this = self.clone();
			let path = path.clone();

			web_async::spawn(async move {
				this.run_subscribe(id, path, track).await;
			});
		}
	}

	async fn run_subscribe(self, id: u64, broadcast: Path, mut track: TrackProducer) {
		self.subscribes.lock().insert(id, track.clone());

		let msg = message::Subscribe {
			id,
			broadcast: broadcast.clone(),
			track: track.name.to_string(),
			priority: track.priority,
		};

		tracing::debug!(%broadcast, track = %track.name, id, "subscribe started");

		let res = tokio::select! {
			_ = track.unused() => Err(Error::Cancel),
			res = self.run_track(msg) => res,
		};

		match res {
			Err(Error::Cancel) | Err(Error::Transport) => {
				tracing::debug!(%broadcast, track = %track.name, id, "subscribe cancelled");
				track.abort(Error::Cancel).ok();
			}
			Err(err) => {
				tracing::warn!(%err, %broadcast, track = %track.name, id, "subscribe error");
				track.abort(err).ok();
			}
			Ok(()) => {
				tracing::debug!(%broadcast, track = %track.name, id, "subscribe complete");
				track.close().ok();
			}
		}

		self.subscribes.lock().remove(&id);
	}

	async fn run_track(&self, msg: message::Subscribe) -> Result<()> {
		let mut stream = Stream::open(&self.session, message::ControlType::Subscribe).await?;
		stream.writer.encode(&msg).await?;

		let _ok: message::SubscribeOk = stream.reader.decode().await?;

		// The subscription lives until either side closes the stream.
		stream.reader.closed().await?;
		stream.writer.finish()?;

		Ok(())
	}

	async fn run_groups(self) -> Result<()> {
		loop {
			let stream = self.session.accept_uni().await.map_err(Error::from_transport)?;
			let this = self.clone();

			web_async::spawn(async move {
				let mut reader = Reader::new(stream);
				if let Err(err) = this.recv_group(&mut reader).await {
					reader.abort(&err);
				}
			});
		}
	}

	async fn recv_group(&self, stream: &mut Reader<S::RecvStream>) -> Result<()> {
		let typ: message::DataType = stream.decode().await?;
		if typ != message::DataType::Group {
			return Err(Error::UnexpectedStream);
		}

		let header: message::GroupHeader = stream.decode().await?;

		let group = {
			let mut subscribes = self.subscribes.lock();
			let track = subscribes.get_mut(&header.subscribe).ok_or(Error::Cancel)?;
			track.create_group(header.sequence)?
		};

		tracing::trace!(group = %group.sequence, "received group");

		let res = tokio::select! {
			// Nobody is reading this group anymore; tell the relay to stop.
			_ = group.unused() => Err(Error::Cancel),
			res = Self::run_group(stream, group.clone()) => res,
		};

		let mut group = group;
		match res {
			Err(Error::Cancel) | Err(Error::Transport) => {
				// A reset stream is a lost group; the track continues.
				tracing::trace!(group = %group.sequence, "group cancelled");
				group.abort(Error::Cancel).ok();
				Err(Error::Cancel)
			}
			Err(err) => {
				tracing::debug!(%err, group = %group.sequence, "group error");
				group.abort(err.clone()).ok();
				Err(err)
			}
			Ok(()) => {
				tracing::trace!(group = %group.sequence, "group complete");
				group.close().ok();
				Ok(())
			}
		}
	}

	async fn run_group(stream: &mut Reader<S::RecvStream>, mut group: GroupProducer) -> Result<()> {
		while let Some(size) = stream.decode_maybe::<usize>().await? {
			let mut frame = group.create_frame(Frame { size })?;
			let mut remain = size;

			while remain > 0 {
				let chunk = stream.read(remain).await?.ok_or(Error::WrongSize)?;
				remain = remain.checked_sub(chunk.len()).ok_or(Error::WrongSize)?;
				frame.write_chunk(chunk)?;
			}

			frame.close()?;
		}

		Ok(())
	}
}
