//! Perplexity strategy.
//!
//! Multi-stage generation (search, then synthesis) makes it the slowest
//! provider to first token, so the fast path gets a longer budget. The
//! transcript interleaves turns in one shared container, so extraction
//! keeps the last timestamp-delimited segment.

use std::time::Duration;

use proxima_protocol::ProviderId;
use serde_json::Value;

use super::{BusySignals, ChunkPayload, EndpointRule, InsertMode, ProviderStrategy, sse_field};

pub struct Perplexity {
	endpoints: Vec<EndpointRule>,
}

static BUSY: BusySignals = BusySignals {
	stop_selectors: &["button[aria-label='Stop generating response']"],
	progress_selectors: &[".animate-pulse", "svg.animate-spin"],
	main_scope: "main",
	excluded_scopes: &["nav", "aside"],
	status_markers: &["Searching", "Thinking"],
};

impl Perplexity {
	pub fn new() -> Self {
		Self {
			endpoints: vec![
				EndpointRule::new("**/rest/sse/perplexity_ask").with_method("POST"),
				EndpointRule::new("**/socket.io/**"),
			],
		}
	}
}

impl Default for Perplexity {
	fn default() -> Self {
		Self::new()
	}
}

impl ProviderStrategy for Perplexity {
	fn id(&self) -> ProviderId {
		ProviderId::Perplexity
	}

	fn new_conversation_url(&self) -> &'static str {
		"https://www.perplexity.ai/"
	}

	fn stream_endpoints(&self) -> &[EndpointRule] {
		&self.endpoints
	}

	fn parse_chunk_line(&self, line: &str) -> Option<ChunkPayload> {
		let ("data", payload) = sse_field(line)? else {
			return None;
		};

		let value: Value = serde_json::from_str(payload).ok()?;
		// The answer field is a JSON-encoded string of blocks; the
		// plain-text answer rides along as "answer" inside it.
		let text = match value.get("text") {
			Some(Value::String(inner)) => serde_json::from_str::<Value>(inner)
				.ok()
				.and_then(|v| v.get("answer").and_then(Value::as_str).map(str::to_string))?,
			_ => value.get("answer").and_then(Value::as_str).map(str::to_string)?,
		};
		(!text.is_empty()).then_some(ChunkPayload::Snapshot(text))
	}

	fn extraction_selectors(&self) -> &'static [&'static str] {
		&["div[dir='auto'] .prose", ".prose.text-pretty", ".prose"]
	}

	fn answer_block_selector(&self) -> &'static str {
		".prose"
	}

	fn input_selectors(&self) -> &'static [&'static str] {
		&["textarea[placeholder*='Ask']", "textarea[autofocus]", "textarea"]
	}

	fn submit_selectors(&self) -> &'static [&'static str] {
		&["button[aria-label='Submit']", "button[type='submit']"]
	}

	fn busy_signals(&self) -> &BusySignals {
		&BUSY
	}

	fn insert_mode(&self) -> InsertMode {
		InsertMode::DirectValue
	}

	fn interleaved_transcript(&self) -> bool {
		true
	}

	// Search + synthesis regularly takes minutes end to end.
	fn fast_path_budget(&self) -> Duration {
		Duration::from_secs(180)
	}

	fn generation_wait_budget(&self) -> Duration {
		Duration::from_secs(240)
	}

	fn stability_threshold(&self) -> u32 {
		4
	}
}
