//! ChatGPT strategy.
//!
//! The conversation endpoint streams SSE `data:` lines whose payloads
//! carry the full message text so far (cumulative snapshots, not
//! deltas).

use proxima_protocol::ProviderId;
use serde_json::Value;

use super::{BusySignals, ChunkPayload, EndpointRule, ProviderStrategy, sse_field};

pub struct ChatGpt {
	endpoints: Vec<EndpointRule>,
}

static BUSY: BusySignals = BusySignals {
	stop_selectors: &[
		"button[data-testid='stop-button']",
		"button[aria-label='Stop generating']",
	],
	progress_selectors: &[".result-streaming", ".text-token-text-streaming"],
	main_scope: "main",
	excluded_scopes: &["nav", "aside"],
	status_markers: &[],
};

impl ChatGpt {
	pub fn new() -> Self {
		Self {
			endpoints: vec![
				EndpointRule::new("**/backend-api/**/conversation").with_method("POST"),
				EndpointRule::new("**/backend-api/conversation").with_method("POST"),
			],
		}
	}
}

impl Default for ChatGpt {
	fn default() -> Self {
		Self::new()
	}
}

impl ProviderStrategy for ChatGpt {
	fn id(&self) -> ProviderId {
		ProviderId::ChatGpt
	}

	fn new_conversation_url(&self) -> &'static str {
		"https://chatgpt.com/"
	}

	fn stream_endpoints(&self) -> &[EndpointRule] {
		&self.endpoints
	}

	fn parse_chunk_line(&self, line: &str) -> Option<ChunkPayload> {
		let ("data", payload) = sse_field(line)? else {
			return None;
		};
		if payload == "[DONE]" {
			return None;
		}

		let value: Value = serde_json::from_str(payload).ok()?;
		// Delta frames: {"v": "text"} appends to the current part.
		if let Some(delta) = value.get("v").and_then(Value::as_str) {
			return Some(ChunkPayload::Delta(delta.to_string()));
		}
		// Snapshot frames carry the whole message body so far.
		let parts = value.get("message")?.get("content")?.get("parts")?.as_array()?;
		let text = parts.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("");
		(!text.is_empty()).then(|| ChunkPayload::Snapshot(text))
	}

	fn extraction_selectors(&self) -> &'static [&'static str] {
		&[
			"div[data-message-author-role='assistant'] .markdown",
			"div[data-message-author-role='assistant']",
			".agent-turn .markdown",
		]
	}

	fn answer_block_selector(&self) -> &'static str {
		"div[data-message-author-role='assistant']"
	}

	fn input_selectors(&self) -> &'static [&'static str] {
		&[
			"#prompt-textarea",
			"textarea[data-testid='prompt-textarea']",
			"div[contenteditable='true']",
		]
	}

	fn submit_selectors(&self) -> &'static [&'static str] {
		&["button[data-testid='send-button']", "button[aria-label='Send prompt']"]
	}

	fn busy_signals(&self) -> &BusySignals {
		&BUSY
	}

	fn counts_answer_blocks(&self) -> bool {
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_snapshot_frame() {
		let strategy = ChatGpt::new();
		let line = r#"data: {"message": {"content": {"parts": ["Hello, wor"]}}}"#;
		assert_eq!(
			strategy.parse_chunk_line(line),
			Some(ChunkPayload::Snapshot("Hello, wor".to_string()))
		);
	}

	#[test]
	fn test_delta_frame() {
		let strategy = ChatGpt::new();
		assert_eq!(
			strategy.parse_chunk_line(r#"data: {"v": "ld!"}"#),
			Some(ChunkPayload::Delta("ld!".to_string()))
		);
	}

	#[test]
	fn test_done_and_noise_lines_are_ignored() {
		let strategy = ChatGpt::new();
		assert_eq!(strategy.parse_chunk_line("data: [DONE]"), None);
		assert_eq!(strategy.parse_chunk_line("event: delta"), None);
		assert_eq!(strategy.parse_chunk_line("data: {not json"), None);
		assert_eq!(strategy.parse_chunk_line(""), None);
	}
}
