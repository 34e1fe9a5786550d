//! Newline-delimited JSON transport.
//!
//! Each message is one JSON object terminated by `\n`. The transport is
//! split into a sending half (serialize + write + flush) and a receiving
//! half (buffered line reads forwarded over an mpsc channel), so the
//! connection can run reader and writer on independent tasks.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::error::{Error, Result};


/// Sending half of a transport.
pub trait TransportSender: Send {
	/// Writes one message and flushes.
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Receiving half of a transport. [`TransportReceiver::run`] reads until
/// EOF or error, forwarding each parsed message over the channel handed
/// out at construction.
pub trait TransportReceiver: Send {
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// The pieces a [`Connection`](crate::Connection) needs to start.
pub struct TransportParts {
	pub sender: Box<dyn TransportSender>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Builds a line-delimited JSON transport over a split byte stream.
pub fn line_transport<R, W>(reader: R, writer: W) -> TransportParts
where
	R: AsyncRead + Send + Unpin + 'static,
	W: AsyncWrite + Send + Unpin + 'static,
{
	let (message_tx, message_rx) = mpsc::unbounded_channel();
	TransportParts {
		sender: Box::new(LineSender { writer }),
		receiver: Box::new(LineReceiver {
			reader: BufReader::new(reader),
			message_tx,
		}),
		message_rx,
	}
}

struct LineSender<W> {
	writer: W,
}

impl<W> TransportSender for LineSender<W>
where
	W: AsyncWrite + Send + Unpin,
{
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let mut payload = serde_json::to_vec(&message)?;
			payload.push(b'\n');
			self.writer
				.write_all(&payload)
				.await
				.map_err(|e| Error::TransportError(format!("write failed: {e}")))?;
			self.writer
				.flush()
				.await
				.map_err(|e| Error::TransportError(format!("flush failed: {e}")))?;
			Ok(())
		})
	}
}

struct LineReceiver<R> {
	reader: BufReader<R>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<R> TransportReceiver for LineReceiver<R>
where
	R: AsyncRead + Send + Unpin + 'static,
{
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			let mut line = String::new();
			loop {
				line.clear();
				let bytes = self
					.reader
					.read_line(&mut line)
					.await
					.map_err(|e| Error::TransportError(format!("read failed: {e}")))?;
				if bytes == 0 {
					// EOF: peer closed the stream.
					return Ok(());
				}

				let trimmed = line.trim_end();
				if trimmed.is_empty() {
					continue;
				}

				match serde_json::from_str::<Value>(trimmed) {
					Ok(message) => {
						if self.message_tx.send(message).is_err() {
							// Receiver side gone, nothing left to do.
							return Ok(());
						}
					}
					Err(e) => {
						// A garbled line cannot be correlated to any request;
						// skip it rather than killing the stream.
						tracing::warn!(target = "px.transport", error = %e, "dropping unparseable line");
					}
				}
			}
		})
	}
}
