//! Claude strategy.
//!
//! Streams SSE with typed events and text deltas, and is the one
//! provider with an explicit end-of-message event in the body. Also the
//! one with a secondary artifact panel whose code belongs in the
//! transcript.

use proxima_protocol::ProviderId;
use serde_json::Value;

use super::{ArtifactPanel, BusySignals, ChunkPayload, EndpointRule, ProviderStrategy, sse_field};

pub struct Claude {
	endpoints: Vec<EndpointRule>,
}

static BUSY: BusySignals = BusySignals {
	stop_selectors: &["button[aria-label='Stop response']"],
	progress_selectors: &["div[data-is-streaming='true']"],
	main_scope: "main",
	excluded_scopes: &["nav", "aside"],
	status_markers: &[],
};

static ARTIFACTS: ArtifactPanel = ArtifactPanel {
	panel_selector: "div[data-testid='artifact-panel']",
	title_selector: "div[data-testid='artifact-title']",
	code_selector: "pre code",
};

impl Claude {
	pub fn new() -> Self {
		Self {
			endpoints: vec![
				EndpointRule::new("**/api/organizations/*/chat_conversations/*/completion").with_method("POST"),
				EndpointRule::new("**/api/append_message").with_method("POST"),
			],
		}
	}
}

impl Default for Claude {
	fn default() -> Self {
		Self::new()
	}
}

impl ProviderStrategy for Claude {
	fn id(&self) -> ProviderId {
		ProviderId::Claude
	}

	fn new_conversation_url(&self) -> &'static str {
		"https://claude.ai/new"
	}

	fn stream_endpoints(&self) -> &[EndpointRule] {
		&self.endpoints
	}

	fn stream_end_marker(&self) -> Option<&'static str> {
		Some("message_stop")
	}

	fn parse_chunk_line(&self, line: &str) -> Option<ChunkPayload> {
		let ("data", payload) = sse_field(line)? else {
			return None;
		};

		let value: Value = serde_json::from_str(payload).ok()?;
		match value.get("type").and_then(Value::as_str) {
			// Legacy completion framing: cumulative-free text deltas.
			Some("completion") => value
				.get("completion")
				.and_then(Value::as_str)
				.map(|s| ChunkPayload::Delta(s.to_string())),
			Some("content_block_delta") => value
				.get("delta")
				.and_then(|d| d.get("text"))
				.and_then(Value::as_str)
				.map(|s| ChunkPayload::Delta(s.to_string())),
			_ => None,
		}
	}

	fn extraction_selectors(&self) -> &'static [&'static str] {
		&[
			"div[data-is-streaming='false'] .font-claude-message",
			".font-claude-message",
			"div[data-testid='chat-message-content']",
		]
	}

	fn answer_block_selector(&self) -> &'static str {
		".font-claude-message"
	}

	fn input_selectors(&self) -> &'static [&'static str] {
		&["div[contenteditable='true'].ProseMirror", "div[contenteditable='true']"]
	}

	fn submit_selectors(&self) -> &'static [&'static str] {
		&["button[aria-label='Send message']", "button[type='submit']"]
	}

	fn busy_signals(&self) -> &BusySignals {
		&BUSY
	}

	fn counts_answer_blocks(&self) -> bool {
		true
	}

	fn artifact_panel(&self) -> Option<&ArtifactPanel> {
		Some(&ARTIFACTS)
	}
}
