mod stream;
mod subscriber;

use stream::*;
use subscriber::*;

use std::sync::Arc;

use tokio::sync::watch;

use crate::{message, Broadcast, BroadcastConsumer, BroadcastProducer, Error, OriginConsumer, Path, Result};

/// The connection state, observable via [Session::status].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStatus {
	#[default]
	Connecting,
	Connected,
	Disconnected,
}

/// A subscription session with a relay.
///
/// Created via [Session::connect]. Everything downstream (broadcasts, tracks,
/// groups) is released when the session disconnects; consumers observe this
/// through [Session::status] and their own error results.
pub struct Session {
	transport: Arc<dyn Transport>,
	status: watch::Sender<SessionStatus>,
	origin: crate::OriginProducer,
	broadcasts: async_channel::Sender<BroadcastProducer>,
}

impl Session {
	/// Perform the handshake as a client and start the session driver.
	pub async fn connect<S: web_transport_trait::Session>(transport: S) -> Result<Self> {
		let mut setup = Stream::open(&transport, message::ControlType::Session).await?;

		let client = message::ClientSetup {
			versions: vec![message::VERSION],
		};

		tracing::trace!(?client, "sending client setup");
		setup.writer.encode(&client).await?;

		let server: message::ServerSetup = setup.reader.decode().await?;
		tracing::trace!(?server, "received server setup");

		if server.version != message::VERSION {
			return Err(Error::Version);
		}

		let status = watch::Sender::new(SessionStatus::Connected);
		let origin = crate::OriginProducer::new();
		let (broadcasts, requested) = async_channel::unbounded();

		let subscriber = Subscriber::new(transport.clone());
		let run = subscriber.run(origin.clone(), requested);

		let notify = status.clone();
		let transport2 = transport.clone();

		web_async::spawn(async move {
			// Keep the setup stream open for the lifetime of the session.
			let _setup = setup;

			let res = tokio::select! {
				res = run => res,
				err = transport2.closed() => Err(Error::from_transport(err)),
			};

			match res {
				Err(Error::Transport) => {
					tracing::info!("session terminated");
					transport2.close(1, "");
				}
				Err(err) => {
					tracing::warn!(%err, "session error");
					transport2.close(err.to_code(), err.to_string().as_ref());
				}
				_ => {
					tracing::info!("session closed");
					transport2.close(0, "");
				}
			}

			notify.send_replace(SessionStatus::Disconnected);
		});

		Ok(Self {
			transport: Arc::new(transport),
			status,
			origin,
			broadcasts,
		})
	}

	/// Observe the connection status.
	pub fn status(&self) -> watch::Receiver<SessionStatus> {
		self.status.subscribe()
	}

	/// Discover broadcasts announced under the given prefix.
	///
	/// Announcements already received are replayed; dropping the consumer
	/// cancels the interest.
	pub fn announced<P: Into<Path>>(&self, prefix: P) -> OriginConsumer {
		self.origin.announced(prefix)
	}

	/// Consume a broadcast by path, whether or not it was announced.
	///
	/// Tracks are subscribed lazily on [BroadcastConsumer::subscribe]; an
	/// unavailable path simply never yields groups.
	pub fn consume<P: Into<Path>>(&self, path: P) -> BroadcastConsumer {
		let path = path.into();

		// Reuse the announced broadcast when we have one.
		if let Some(broadcast) = self.origin.consume(&path) {
			return broadcast;
		}

		let broadcast = Broadcast::new(path).produce();
		if self.broadcasts.try_send(broadcast.producer).is_err() {
			// The driver is gone; the returned consumer will error on subscribe.
			tracing::debug!("session driver gone; broadcast is dead on arrival");
		}

		broadcast.consumer
	}

	/// Close the session and release all subscriptions.
	pub fn close(&self) {
		self.transport.close(Error::Cancel.to_code(), "");
		self.status.send_replace(SessionStatus::Disconnected);
	}

	/// Block until the session is disconnected.
	pub async fn closed(&self) {
		let mut status = self.status.subscribe();
		status
			.wait_for(|status| *status == SessionStatus::Disconnected)
			.await
			.ok();
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.close();
	}
}

// A dyn-compatible wrapper so Session doesn't carry the transport generic.
trait Transport: Send + Sync {
	fn close(&self, code: u32, reason: &str);
}

impl<S: web_transport_trait::Session> Transport for S {
	fn close(&self, code: u32, reason: &str) {
		S::close(self, code, reason);
	}
}
