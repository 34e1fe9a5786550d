//! IPC message envelopes.
//!
//! One JSON object per line on the host socket. A request carries a
//! caller-assigned monotonically increasing id; the host answers with
//! exactly one response carrying the same id and either `result` or
//! `error`, never both.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ProviderId;

/// Action names understood by the automation host.
pub mod actions {
	/// Run a script in the provider's page context, returns its value.
	pub const EXECUTE_SCRIPT: &str = "page.executeScript";
	/// Deliver a synthetic key event to the provider's page.
	pub const SEND_KEY: &str = "page.sendKey";
	/// Navigate the provider's page to a URL.
	pub const NAVIGATE: &str = "page.navigate";
	/// Whether the provider's session is initialized and usable.
	pub const IS_READY: &str = "page.isReady";
	/// Attach a local file to the provider's composer (host-side mechanics).
	pub const ATTACH_FILE: &str = "page.attachFile";
}

/// Request from the engine to the automation host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpcRequest {
	/// Caller-assigned id, strictly increasing per connection.
	pub request_id: u64,
	/// Action name, see [`actions`].
	pub action: String,
	/// Target provider, absent for host-global actions.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub provider_id: Option<ProviderId>,
	/// Action-specific payload.
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub payload: Value,
}

/// Response from the automation host. Exactly one per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpcResponse {
	/// Id of the request this answers.
	pub request_id: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<IpcError>,
}

impl IpcResponse {
	pub fn ok(request_id: u64, result: Value) -> Self {
		Self {
			request_id,
			result: Some(result),
			error: None,
		}
	}

	pub fn err(request_id: u64, error: IpcError) -> Self {
		Self {
			request_id,
			result: None,
			error: Some(error),
		}
	}
}

/// Host-reported action failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcError {
	/// Stable machine-readable code (e.g. `provider_unavailable`).
	pub code: String,
	pub message: String,
}

impl IpcError {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			code: code.into(),
			message: message.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_request_wire_shape() {
		let request = IpcRequest {
			request_id: 7,
			action: actions::EXECUTE_SCRIPT.to_string(),
			provider_id: Some(ProviderId::Claude),
			payload: serde_json::json!({ "script": "1 + 1" }),
		};

		let value = serde_json::to_value(&request).unwrap();
		assert_eq!(value["requestId"], 7);
		assert_eq!(value["action"], "page.executeScript");
		assert_eq!(value["providerId"], "claude");
		assert_eq!(value["payload"]["script"], "1 + 1");
	}

	#[test]
	fn test_request_payload_defaults_to_null() {
		let parsed: IpcRequest =
			serde_json::from_str(r#"{"requestId": 1, "action": "page.isReady", "providerId": "gemini"}"#).unwrap();
		assert!(parsed.payload.is_null());
		assert_eq!(parsed.provider_id, Some(ProviderId::Gemini));
	}

	#[test]
	fn test_response_result_and_error_are_exclusive() {
		let ok = IpcResponse::ok(3, serde_json::json!("done"));
		let value = serde_json::to_value(&ok).unwrap();
		assert!(value.get("error").is_none());

		let err = IpcResponse::err(4, IpcError::new("provider_unavailable", "no session"));
		let value = serde_json::to_value(&err).unwrap();
		assert!(value.get("result").is_none());
		assert_eq!(value["error"]["code"], "provider_unavailable");
	}
}
