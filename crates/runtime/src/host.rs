//! Host-side serve loop.
//!
//! The automation host owns the browser tabs; this module gives it the
//! socket half of the protocol: read one request per line, hand it to a
//! [`HostHandler`] on its own task, write back exactly one response with
//! the request's id. Requests run concurrently so one provider's slow
//! page action never holds up another provider's request; responses are
//! funneled through a single writer task.

use std::sync::Arc;

use async_trait::async_trait;
use proxima_protocol::{IpcError, IpcRequest, IpcResponse, ProviderId};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::error::Result;

/// Implemented by the embedding host application. One call per request;
/// the returned value (or error) becomes the response payload.
#[async_trait]
pub trait HostHandler: Send + Sync {
	async fn handle(
		&self,
		action: &str,
		provider_id: Option<ProviderId>,
		payload: Value,
	) -> std::result::Result<Value, IpcError>;
}

/// Serves one client connection until EOF.
pub async fn serve<S, H>(stream: S, handler: Arc<H>) -> Result<()>
where
	S: AsyncRead + AsyncWrite + Send + 'static,
	H: HostHandler + 'static,
{
	let (read_half, mut write_half) = tokio::io::split(stream);
	let mut reader = BufReader::new(read_half);

	let (response_tx, mut response_rx) = mpsc::unbounded_channel::<IpcResponse>();

	let writer = tokio::spawn(async move {
		while let Some(response) = response_rx.recv().await {
			let payload = match serde_json::to_string(&response) {
				Ok(payload) => payload,
				Err(e) => {
					tracing::error!(target = "px.host", error = %e, "failed to serialize response");
					continue;
				}
			};
			if write_half.write_all(format!("{payload}\n").as_bytes()).await.is_err() {
				break;
			}
			if write_half.flush().await.is_err() {
				break;
			}
		}
	});

	let mut line = String::new();
	loop {
		line.clear();
		let bytes = reader.read_line(&mut line).await?;
		if bytes == 0 {
			break;
		}

		let trimmed = line.trim_end();
		if trimmed.is_empty() {
			continue;
		}

		let request = match serde_json::from_str::<IpcRequest>(trimmed) {
			Ok(request) => request,
			Err(err) => {
				// Salvage the id if there is one so the caller is not
				// left waiting out its full timeout.
				if let Some(id) = serde_json::from_str::<Value>(trimmed)
					.ok()
					.and_then(|v| v.get("requestId").and_then(Value::as_u64))
				{
					let _ = response_tx.send(IpcResponse::err(id, IpcError::new("invalid_request", err.to_string())));
				} else {
					tracing::warn!(target = "px.host", error = %err, "dropping unparseable request");
				}
				continue;
			}
		};

		let handler = Arc::clone(&handler);
		let response_tx = response_tx.clone();
		tokio::spawn(async move {
			let id = request.request_id;
			let response = match handler.handle(&request.action, request.provider_id, request.payload).await {
				Ok(result) => IpcResponse::ok(id, result),
				Err(error) => IpcResponse::err(id, error),
			};
			let _ = response_tx.send(response);
		});
	}

	drop(response_tx);
	let _ = writer.await;
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

	use super::*;

	struct EchoHandler;

	#[async_trait]
	impl HostHandler for EchoHandler {
		async fn handle(
			&self,
			action: &str,
			_provider_id: Option<ProviderId>,
			payload: Value,
		) -> std::result::Result<Value, IpcError> {
			match action {
				"slow" => {
					tokio::time::sleep(Duration::from_millis(100)).await;
					Ok(serde_json::json!("slow done"))
				}
				"fail" => Err(IpcError::new("boom", "requested failure")),
				_ => Ok(payload),
			}
		}
	}

	#[tokio::test]
	async fn test_one_response_per_request_with_matching_id() {
		let (client, server) = tokio::io::duplex(4096);
		tokio::spawn(serve(server, Arc::new(EchoHandler)));

		let (read, mut write) = tokio::io::split(client);
		write
			.write_all(b"{\"requestId\": 5, \"action\": \"echo\", \"payload\": \"hi\"}\n")
			.await
			.unwrap();

		let mut reader = BufReader::new(read);
		let mut line = String::new();
		reader.read_line(&mut line).await.unwrap();
		let response: Value = serde_json::from_str(line.trim_end()).unwrap();
		assert_eq!(response["requestId"], 5);
		assert_eq!(response["result"], "hi");
	}

	#[tokio::test]
	async fn test_slow_request_does_not_block_fast_one() {
		let (client, server) = tokio::io::duplex(4096);
		tokio::spawn(serve(server, Arc::new(EchoHandler)));

		let (read, mut write) = tokio::io::split(client);
		write
			.write_all(b"{\"requestId\": 1, \"action\": \"slow\"}\n{\"requestId\": 2, \"action\": \"echo\", \"payload\": 2}\n")
			.await
			.unwrap();

		let mut reader = BufReader::new(read);
		let mut line = String::new();
		reader.read_line(&mut line).await.unwrap();
		let first: Value = serde_json::from_str(line.trim_end()).unwrap();
		// The fast request overtakes the slow one.
		assert_eq!(first["requestId"], 2);
	}

	#[tokio::test]
	async fn test_handler_error_becomes_error_response() {
		let (client, server) = tokio::io::duplex(4096);
		tokio::spawn(serve(server, Arc::new(EchoHandler)));

		let (read, mut write) = tokio::io::split(client);
		write
			.write_all(b"{\"requestId\": 3, \"action\": \"fail\"}\n")
			.await
			.unwrap();

		let mut reader = BufReader::new(read);
		let mut line = String::new();
		reader.read_line(&mut line).await.unwrap();
		let response: Value = serde_json::from_str(line.trim_end()).unwrap();
		assert_eq!(response["requestId"], 3);
		assert_eq!(response["error"]["code"], "boom");
		assert!(response.get("result").is_none());
	}

	#[tokio::test]
	async fn test_malformed_request_with_id_gets_invalid_request() {
		let (client, server) = tokio::io::duplex(4096);
		tokio::spawn(serve(server, Arc::new(EchoHandler)));

		let (read, mut write) = tokio::io::split(client);
		// Missing the required "action" field.
		write.write_all(b"{\"requestId\": 11}\n").await.unwrap();

		let mut reader = BufReader::new(read);
		let mut line = String::new();
		reader.read_line(&mut line).await.unwrap();
		let response: Value = serde_json::from_str(line.trim_end()).unwrap();
		assert_eq!(response["requestId"], 11);
		assert_eq!(response["error"]["code"], "invalid_request");
	}
}
