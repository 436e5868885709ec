use crate::{coding::*, Error};

// A wrapper around a SendStream that will reset on Drop.
pub struct Writer<S: web_transport_trait::SendStream> {
	stream: Option<S>,
	buffer: bytes::BytesMut,
}

impl<S: web_transport_trait::SendStream> Writer<S> {
	pub fn new(stream: S) -> Self {
		Self {
			stream: Some(stream),
			buffer: Default::default(),
		}
	}

	pub async fn encode<T: Encode>(&mut self, msg: &T) -> Result<(), Error> {
		self.buffer.clear();
		msg.encode(&mut self.buffer);

		while !self.buffer.is_empty() {
			self.stream
				.as_mut()
				.unwrap()
				.write_buf(&mut self.buffer)
				.await
				.map_err(Error::from_transport)?;
		}

		Ok(())
	}

	// NOTE: We use Buf so we don't perform a copy when using Quinn.
	pub async fn write_all<B: bytes::Buf + Send>(&mut self, buf: &mut B) -> Result<(), Error> {
		while buf.has_remaining() {
			self.stream
				.as_mut()
				.unwrap()
				.write_buf(buf)
				.await
				.map_err(Error::from_transport)?;
		}
		Ok(())
	}

	/// Mark the clean termination of the stream.
	pub fn finish(&mut self) -> Result<(), Error> {
		self.stream.as_mut().unwrap().finish().map_err(Error::from_transport)
	}

	pub fn abort(&mut self, err: &Error) {
		self.stream.as_mut().unwrap().reset(err.to_code());
	}

	pub async fn closed(&mut self) -> Result<(), Error> {
		self.stream
			.as_mut()
			.unwrap()
			.closed()
			.await
			.map_err(Error::from_transport)?;
		Ok(())
	}

	pub fn set_priority(&mut self, priority: u8) {
		self.stream.as_mut().unwrap().set_priority(priority.into());
	}
}

impl<S: web_transport_trait::SendStream> Drop for Writer<S> {
	fn drop(&mut self) {
		if let Some(mut stream) = self.stream.take() {
			// Unlike the Quinn default, we abort the stream on drop.
			stream.reset(Error::Cancel.to_code());
		}
	}
}
