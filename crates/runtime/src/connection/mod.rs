//! Client-side connection: request/response correlation over a transport.
//!
//! Each request gets the next id from an atomic counter and a oneshot
//! callback in the pending map. The read loop correlates responses by id
//! and completes the callback. Callers wait behind a local timeout; a
//! response that arrives after its caller gave up is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use proxima_protocol::{IpcRequest, IpcResponse, ProviderId};
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::transport::{TransportParts, TransportReceiver, TransportSender};

#[cfg(test)]
mod tests;

/// Default per-request bound. Generous: generation waits happen on the
/// engine side, host actions themselves are short.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Pending request callbacks keyed by request id.
type CallbackMap = Arc<TokioMutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// RAII guard ensuring callback cleanup when a request future is dropped
/// (caller timeout or cancellation).
struct CancelGuard {
	id: u64,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u64, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		let id = self.id;
		let callbacks = Arc::clone(&self.callbacks);

		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			handle.spawn(async move {
				if callbacks.lock().await.remove(&id).is_some() {
					tracing::debug!(target = "px.ipc", id, "removed abandoned callback");
				}
			});
		}
	}
}

/// Future returned by [`Connection::request`] with automatic cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// IPC connection to the automation host.
///
/// Uses sequential request ids and oneshot channels for correlation.
pub struct Connection {
	/// Sequential request id counter.
	last_id: AtomicU64,
	/// Pending request callbacks keyed by request id.
	callbacks: CallbackMap,
	/// Channel for queueing outbound messages to the writer task.
	outbound_tx: mpsc::UnboundedSender<Value>,
	/// Transport sender (taken by run() to start the writer task).
	transport_sender: TokioMutex<Option<Box<dyn TransportSender>>>,
	/// Receiver half of the transport (taken by run(), needed once).
	transport_receiver: TokioMutex<Option<Box<dyn TransportReceiver>>>,
	/// Receiver for incoming messages from the transport.
	message_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	/// Receiver for outbound messages (taken by run()).
	outbound_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	/// Per-request local bound.
	request_timeout: Duration,
}

impl Connection {
	/// Creates a new Connection over the given transport.
	pub fn new(parts: TransportParts) -> Self {
		Self::with_timeout(parts, DEFAULT_REQUEST_TIMEOUT)
	}

	/// Creates a new Connection with a custom per-request bound.
	pub fn with_timeout(parts: TransportParts, request_timeout: Duration) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		Self {
			last_id: AtomicU64::new(0),
			callbacks: Arc::new(TokioMutex::new(HashMap::new())),
			outbound_tx,
			transport_sender: TokioMutex::new(Some(sender)),
			transport_receiver: TokioMutex::new(Some(receiver)),
			message_rx: TokioMutex::new(Some(message_rx)),
			outbound_rx: TokioMutex::new(Some(outbound_rx)),
			request_timeout,
		}
	}

	/// Sends one request to the host and awaits its response.
	///
	/// Returns [`Error::Timeout`] if nothing arrives within the bound;
	/// a matching response arriving later is dropped by the read loop.
	pub async fn request(&self, action: &str, provider_id: Option<ProviderId>, payload: Value) -> Result<Value> {
		let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;

		tracing::debug!(target = "px.ipc", id, action, provider = ?provider_id, "sending request");

		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().await.insert(id, tx);

		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		let request = IpcRequest {
			request_id: id,
			action: action.to_string(),
			provider_id,
			payload,
		};

		let request_value = serde_json::to_value(&request)?;
		if self.outbound_tx.send(request_value).is_err() {
			return Err(Error::ChannelClosed);
		}

		let response = ResponseFuture { rx, guard };
		match tokio::time::timeout(self.request_timeout, response).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout(format!(
				"no response for request {id} ({action}) within {}ms",
				self.request_timeout.as_millis()
			))),
		}
	}

	/// Runs the message dispatch loop until the transport closes.
	pub async fn run(self: &Arc<Self>) {
		let transport_receiver = self
			.transport_receiver
			.lock()
			.await
			.take()
			.expect("run() can only be called once - transport receiver already taken");

		let mut transport_sender = self
			.transport_sender
			.lock()
			.await
			.take()
			.expect("run() can only be called once - transport sender already taken");

		let mut outbound_rx = self
			.outbound_rx
			.lock()
			.await
			.take()
			.expect("run() can only be called once - outbound receiver already taken");

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = transport_receiver.run().await {
				tracing::error!(target = "px.ipc", error = %e, "transport read error");
			}
		});

		let writer_handle = tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if let Err(e) = transport_sender.send(message).await {
					tracing::error!(target = "px.ipc", error = %e, "transport write error");
					break;
				}
			}
		});

		let mut message_rx = self
			.message_rx
			.lock()
			.await
			.take()
			.expect("run() can only be called once - message receiver already taken");

		while let Some(message_value) = message_rx.recv().await {
			match serde_json::from_value::<IpcResponse>(message_value) {
				Ok(response) => self.dispatch_response(response).await,
				Err(e) => {
					tracing::warn!(target = "px.ipc", error = %e, "unparseable message from host");
				}
			}
		}

		// Unblock every caller still waiting once the stream is gone.
		for (_, tx) in self.callbacks.lock().await.drain() {
			let _ = tx.send(Err(Error::ChannelClosed));
		}

		let _ = reader_handle.await;
		let _ = writer_handle.await;
	}

	async fn dispatch_response(&self, response: IpcResponse) {
		let Some(callback) = self.callbacks.lock().await.remove(&response.request_id) else {
			// Caller already timed out; the late response is dropped.
			tracing::debug!(target = "px.ipc", id = response.request_id, "dropping late response");
			return;
		};

		let result = match response.error {
			Some(err) => Err(Error::Host {
				code: err.code,
				message: err.message,
			}),
			None => Ok(response.result.unwrap_or(Value::Null)),
		};

		let _ = callback.send(result);
	}

	#[cfg(test)]
	pub(crate) async fn dispatch_for_test(&self, response: IpcResponse) {
		self.dispatch_response(response).await;
	}

	#[cfg(test)]
	pub(crate) async fn pending_count(&self) -> usize {
		self.callbacks.lock().await.len()
	}
}
