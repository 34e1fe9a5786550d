use std::sync::Arc;
use std::time::Duration;

use proxima_protocol::{IpcError, IpcResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::*;
use crate::transport::line_transport;

fn test_connection(timeout: Duration) -> (Arc<Connection>, tokio::io::DuplexStream, tokio::io::DuplexStream) {
	let (host_read, engine_write) = tokio::io::duplex(4096);
	let (engine_read, host_write) = tokio::io::duplex(4096);

	let parts = line_transport(engine_read, engine_write);
	let connection = Arc::new(Connection::with_timeout(parts, timeout));
	(connection, host_read, host_write)
}

#[tokio::test]
async fn test_out_of_order_responses_resolve_matching_callers() {
	let (connection, _host_read, _host_write) = test_connection(Duration::from_secs(5));

	// Register three pending requests by hand, then answer 2, 1, 3.
	let mut receivers = Vec::new();
	for id in 1..=3u64 {
		let (tx, rx) = tokio::sync::oneshot::channel();
		connection.callbacks.lock().await.insert(id, tx);
		receivers.push((id, rx));
	}

	for id in [2u64, 1, 3] {
		connection
			.dispatch_for_test(IpcResponse::ok(id, serde_json::json!({ "answer": id })))
			.await;
	}

	for (id, rx) in receivers {
		let value = rx.await.unwrap().unwrap();
		assert_eq!(value["answer"], id);
	}
}

#[tokio::test]
async fn test_host_error_surfaces_with_code() {
	let (connection, _host_read, _host_write) = test_connection(Duration::from_secs(5));

	let (tx, rx) = tokio::sync::oneshot::channel();
	connection.callbacks.lock().await.insert(1, tx);

	connection
		.dispatch_for_test(IpcResponse::err(1, IpcError::new("provider_unavailable", "tab closed")))
		.await;

	let err = rx.await.unwrap().unwrap_err();
	assert_eq!(err.host_code(), Some("provider_unavailable"));
}

#[tokio::test]
async fn test_late_response_is_dropped_without_disturbing_others() {
	let (connection, _host_read, _host_write) = test_connection(Duration::from_secs(5));

	let (tx, rx) = tokio::sync::oneshot::channel();
	connection.callbacks.lock().await.insert(7, tx);

	// Id 99 has no pending caller (it timed out earlier).
	connection
		.dispatch_for_test(IpcResponse::ok(99, serde_json::json!("stale")))
		.await;
	connection
		.dispatch_for_test(IpcResponse::ok(7, serde_json::json!("fresh")))
		.await;

	assert_eq!(rx.await.unwrap().unwrap(), serde_json::json!("fresh"));
	assert_eq!(connection.pending_count().await, 0);
}

#[tokio::test]
async fn test_request_times_out_and_cleans_pending_entry() {
	let (connection, _host_read, _host_write) = test_connection(Duration::from_millis(50));

	let run_conn = Arc::clone(&connection);
	tokio::spawn(async move { run_conn.run().await });

	let err = connection
		.request("page.isReady", None, serde_json::Value::Null)
		.await
		.unwrap_err();
	assert!(err.is_timeout());

	// The CancelGuard cleanup runs on a spawned task; give it a beat.
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(connection.pending_count().await, 0);
}

#[tokio::test]
async fn test_request_round_trip_over_transport() {
	let (connection, host_read, mut host_write) = test_connection(Duration::from_secs(5));

	let run_conn = Arc::clone(&connection);
	tokio::spawn(async move { run_conn.run().await });

	// Fake host: read one request line, answer it with the same id.
	let host = tokio::spawn(async move {
		let mut reader = BufReader::new(host_read);
		let mut line = String::new();
		reader.read_line(&mut line).await.unwrap();
		let request: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
		assert_eq!(request["action"], "page.isReady");

		let response = serde_json::json!({
			"requestId": request["requestId"],
			"result": true
		});
		host_write
			.write_all(format!("{response}\n").as_bytes())
			.await
			.unwrap();
	});

	let value = connection
		.request("page.isReady", None, serde_json::Value::Null)
		.await
		.unwrap();
	assert_eq!(value, serde_json::json!(true));

	host.await.unwrap();
}

#[tokio::test]
async fn test_request_ids_increase_monotonically() {
	let (connection, host_read, mut host_write) = test_connection(Duration::from_secs(5));

	let run_conn = Arc::clone(&connection);
	tokio::spawn(async move { run_conn.run().await });

	let echo_host = tokio::spawn(async move {
		let mut reader = BufReader::new(host_read);
		let mut seen = Vec::new();
		let mut line = String::new();
		for _ in 0..3 {
			line.clear();
			reader.read_line(&mut line).await.unwrap();
			let request: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
			let id = request["requestId"].as_u64().unwrap();
			seen.push(id);
			let response = serde_json::json!({ "requestId": id, "result": id });
			host_write
				.write_all(format!("{response}\n").as_bytes())
				.await
				.unwrap();
		}
		seen
	});

	for _ in 0..3 {
		connection
			.request("page.isReady", None, serde_json::Value::Null)
			.await
			.unwrap();
	}

	let seen = echo_host.await.unwrap();
	assert_eq!(seen, vec![1, 2, 3]);
}
