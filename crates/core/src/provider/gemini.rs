//! Gemini strategy.
//!
//! Streams length-prefixed JSON envelopes (batchexecute framing) rather
//! than SSE. Each useful line is a JSON array whose inner payload is
//! itself a JSON string; the answer text sits a few levels deep and each
//! envelope carries the full text so far.

use proxima_protocol::ProviderId;
use serde_json::Value;

use super::{BusySignals, ChunkPayload, EndpointRule, InsertMode, ProviderStrategy};

pub struct Gemini {
	endpoints: Vec<EndpointRule>,
}

static BUSY: BusySignals = BusySignals {
	stop_selectors: &["button[aria-label='Stop response']", "button.stop-button"],
	progress_selectors: &["progress", ".loading-indicator", ".blue-circle"],
	main_scope: "main",
	excluded_scopes: &["nav", "aside", ".sidenav"],
	status_markers: &["Just a sec"],
};

impl Gemini {
	pub fn new() -> Self {
		Self {
			endpoints: vec![EndpointRule::new("**/StreamGenerate*").with_method("POST")],
		}
	}
}

impl Default for Gemini {
	fn default() -> Self {
		Self::new()
	}
}

impl ProviderStrategy for Gemini {
	fn id(&self) -> ProviderId {
		ProviderId::Gemini
	}

	fn new_conversation_url(&self) -> &'static str {
		"https://gemini.google.com/app"
	}

	fn stream_endpoints(&self) -> &[EndpointRule] {
		&self.endpoints
	}

	fn parse_chunk_line(&self, line: &str) -> Option<ChunkPayload> {
		let envelope: Value = serde_json::from_str(line.trim()).ok()?;
		// Envelope: [["wrb.fr", null, "<inner json string>", ...], ...]
		let frame = envelope.as_array()?.first()?.as_array()?;
		if frame.first()?.as_str()? != "wrb.fr" {
			return None;
		}
		let inner: Value = serde_json::from_str(frame.get(2)?.as_str()?).ok()?;
		// Inner: candidate list at [4], first candidate text at [1][0].
		let text = inner.get(4)?.get(0)?.get(1)?.get(0)?.as_str()?;
		(!text.is_empty()).then(|| ChunkPayload::Snapshot(text.to_string()))
	}

	fn extraction_selectors(&self) -> &'static [&'static str] {
		&[
			"message-content.model-response-text",
			"model-response .markdown",
			".model-response-text",
		]
	}

	fn answer_block_selector(&self) -> &'static str {
		"model-response"
	}

	fn input_selectors(&self) -> &'static [&'static str] {
		&[".ql-editor[contenteditable='true']", "rich-textarea .ql-editor"]
	}

	fn submit_selectors(&self) -> &'static [&'static str] {
		&["button[aria-label='Send message']", "button.send-button"]
	}

	fn busy_signals(&self) -> &BusySignals {
		&BUSY
	}

	// The Quill editor drops synthetic paste events; direct value
	// assignment with an input event is the reliable path.
	fn insert_mode(&self) -> InsertMode {
		InsertMode::DirectValue
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_batchexecute_envelope() {
		let strategy = Gemini::new();
		let inner = serde_json::json!([null, null, null, null, [[null, ["The answer is 4."]]]]);
		let line = serde_json::json!([["wrb.fr", null, inner.to_string()]]).to_string();
		assert_eq!(
			strategy.parse_chunk_line(&line),
			Some(ChunkPayload::Snapshot("The answer is 4.".to_string()))
		);
	}

	#[test]
	fn test_non_wrb_frames_ignored() {
		let strategy = Gemini::new();
		assert_eq!(strategy.parse_chunk_line(r#"[["di", 42]]"#), None);
		assert_eq!(strategy.parse_chunk_line(")]}'"), None);
		assert_eq!(strategy.parse_chunk_line("257"), None);
	}
}
