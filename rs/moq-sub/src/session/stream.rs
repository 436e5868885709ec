use crate::{
	coding::{Reader, Writer},
	message, Error,
};

pub(super) struct Stream<S: web_transport_trait::Session> {
	pub writer: Writer<S::SendStream>,
	pub reader: Reader<S::RecvStream>,
}

impl<S: web_transport_trait::Session> Stream<S> {
	/// Open a control stream, writing its type first.
	pub async fn open(session: &S, typ: message::ControlType) -> Result<Self, Error> {
		let (send, recv) = session.open_bi().await.map_err(Error::from_transport)?;

		let mut writer = Writer::new(send);
		let reader = Reader::new(recv);
		writer.encode(&typ).await?;

		Ok(Stream { writer, reader })
	}
}
