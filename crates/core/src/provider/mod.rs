//! Per-provider strategies.
//!
//! Everything site-specific lives behind [`ProviderStrategy`]: endpoint
//! allow-lists, stream chunk parsing, extraction and input selectors,
//! busy signals, insertion mode and timing knobs. The orchestration code
//! never branches on a provider id.

mod chatgpt;
mod claude;
mod gemini;
mod perplexity;

use std::sync::Arc;
use std::time::Duration;

use proxima_protocol::ProviderId;

pub use chatgpt::ChatGpt;
pub use claude::Claude;
pub use gemini::Gemini;
pub use perplexity::Perplexity;

/// Default routing priority when no preference applies.
pub const DEFAULT_PRIORITY: [ProviderId; 4] = [
	ProviderId::ChatGpt,
	ProviderId::Claude,
	ProviderId::Gemini,
	ProviderId::Perplexity,
];

/// Compiled URL (and optional method) pattern for the stream endpoint
/// allow-list.
///
/// Compiles once at strategy construction; invalid patterns fall back to
/// literal matching.
#[derive(Clone)]
pub struct EndpointRule {
	pattern: glob::Pattern,
	method: Option<&'static str>,
}

impl EndpointRule {
	/// Matches any request method.
	pub fn new(pattern: &str) -> Self {
		let pattern = glob::Pattern::new(pattern).unwrap_or_else(|_| {
			glob::Pattern::new(&glob::Pattern::escape(pattern)).expect("escaped pattern is always valid")
		});
		Self { pattern, method: None }
	}

	/// Restricts the rule to one request method.
	pub fn with_method(mut self, method: &'static str) -> Self {
		self.method = Some(method);
		self
	}

	/// Returns `true` if the request URL and method match this rule.
	pub fn is_match(&self, url: &str, method: &str) -> bool {
		self.pattern.matches(url) && self.method.is_none_or(|m| m.eq_ignore_ascii_case(method))
	}

	pub fn method(&self) -> Option<&'static str> {
		self.method
	}

	pub fn as_str(&self) -> &str {
		self.pattern.as_str()
	}

	/// JavaScript regex source equivalent to this glob, for embedding in
	/// the interceptor install script.
	pub fn to_js_regex(&self) -> String {
		let mut out = String::with_capacity(self.as_str().len() * 2);
		let mut chars = self.as_str().chars().peekable();
		while let Some(c) = chars.next() {
			match c {
				'*' => {
					if chars.peek() == Some(&'*') {
						chars.next();
						out.push_str(".*");
					} else {
						out.push_str("[^/]*");
					}
				}
				'?' => out.push('.'),
				'.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' | '/' => {
					out.push('\\');
					out.push(c);
				}
				other => out.push(other),
			}
		}
		out
	}
}

/// How one parsed stream line contributes to the accumulated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPayload {
	/// Append to what was accumulated so far.
	Delta(String),
	/// Replace the accumulated text with a full snapshot.
	Snapshot(String),
}

/// How message text gets into the composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
	/// Simulated paste through the clipboard. Requires the engine-wide
	/// clipboard lock.
	Paste,
	/// Direct value assignment plus a synthetic input event.
	DirectValue,
}

/// Locally visible "still generating" signals for one provider.
///
/// Progress indicators are only honored inside `main_scope` so spinners
/// in navigation or sidebars never read as generation.
pub struct BusySignals {
	/// Stop-generation controls.
	pub stop_selectors: &'static [&'static str],
	/// Loading/progress indicators, scoped to the main content area.
	pub progress_selectors: &'static [&'static str],
	/// Scope for progress indicators, e.g. `main`.
	pub main_scope: &'static str,
	/// Regions excluded from progress scanning (navigation, sidebars).
	pub excluded_scopes: &'static [&'static str],
	/// Textual status markers inside the main scope.
	pub status_markers: &'static [&'static str],
}

/// Secondary answer panel holding generated code (one provider).
pub struct ArtifactPanel {
	pub panel_selector: &'static str,
	pub title_selector: &'static str,
	pub code_selector: &'static str,
}

/// Everything the engine needs to know about one provider.
pub trait ProviderStrategy: Send + Sync {
	fn id(&self) -> ProviderId;

	/// URL opened for a fresh conversation.
	fn new_conversation_url(&self) -> &'static str;

	/// Outbound endpoints whose responses carry the streamed answer.
	fn stream_endpoints(&self) -> &[EndpointRule];

	/// Explicit end-of-message marker in the stream body, when the
	/// provider emits one. Providers without a marker complete when the
	/// read loop ends.
	fn stream_end_marker(&self) -> Option<&'static str> {
		None
	}

	/// Parses one decoded body line into answer text. `None` for lines
	/// that carry no text (framing, metadata, garbage); parse failures
	/// are swallowed here, never surfaced.
	fn parse_chunk_line(&self, line: &str) -> Option<ChunkPayload>;

	/// Prioritized selectors for the most recent assistant block.
	fn extraction_selectors(&self) -> &'static [&'static str];

	/// Selector for one assistant answer block, used for block counts.
	fn answer_block_selector(&self) -> &'static str;

	/// Fallback chain for the message composer.
	fn input_selectors(&self) -> &'static [&'static str];

	/// Fallback chain for the send control.
	fn submit_selectors(&self) -> &'static [&'static str];

	fn busy_signals(&self) -> &BusySignals;

	fn insert_mode(&self) -> InsertMode {
		InsertMode::Paste
	}

	/// Whether the freshness check may also compare answer-block counts.
	fn counts_answer_blocks(&self) -> bool {
		false
	}

	/// Whether the transcript interleaves turns in one shared container
	/// (extraction keeps the last timestamp-delimited segment).
	fn interleaved_transcript(&self) -> bool {
		false
	}

	fn artifact_panel(&self) -> Option<&ArtifactPanel> {
		None
	}

	/// How long the fast path may poll the interceptor before falling
	/// back to the DOM. Longer for slow multi-stage generation.
	fn fast_path_budget(&self) -> Duration {
		Duration::from_secs(90)
	}

	/// Upper bound on waiting out a detected "still generating" state.
	fn generation_wait_budget(&self) -> Duration {
		Duration::from_secs(120)
	}

	/// Consecutive identical DOM polls required before text is stable.
	fn stability_threshold(&self) -> u32 {
		3
	}

	/// Maximum DOM extraction polls per turn.
	fn dom_poll_budget(&self) -> u32 {
		40
	}
}

/// Returns the strategy for a provider.
pub fn strategy_for(id: ProviderId) -> Arc<dyn ProviderStrategy> {
	match id {
		ProviderId::ChatGpt => Arc::new(ChatGpt::new()),
		ProviderId::Claude => Arc::new(Claude::new()),
		ProviderId::Gemini => Arc::new(Gemini::new()),
		ProviderId::Perplexity => Arc::new(Perplexity::new()),
	}
}

/// Splits an SSE line into its field name and value, if it is one.
pub(crate) fn sse_field(line: &str) -> Option<(&str, &str)> {
	let (field, value) = line.split_once(':')?;
	Some((field.trim(), value.trim()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_endpoint_rule_glob() {
		let rule = EndpointRule::new("**/backend-api/**/conversation");
		assert!(rule.is_match("https://chatgpt.com/backend-api/f/conversation", "POST"));
		assert!(!rule.is_match("https://chatgpt.com/public-api/models", "POST"));
	}

	#[test]
	fn test_endpoint_rule_method_restriction() {
		let rule = EndpointRule::new("**/completion").with_method("POST");
		assert!(rule.is_match("https://claude.ai/x/completion", "POST"));
		assert!(rule.is_match("https://claude.ai/x/completion", "post"));
		assert!(!rule.is_match("https://claude.ai/x/completion", "GET"));
	}

	#[test]
	fn test_endpoint_rule_js_regex_escaping() {
		let rule = EndpointRule::new("**/api/organizations/*/completion");
		let regex = rule.to_js_regex();
		assert_eq!(regex, ".*\\/api\\/organizations\\/[^/]*\\/completion");
	}

	#[test]
	fn test_every_provider_has_a_strategy() {
		for id in ProviderId::ALL {
			let strategy = strategy_for(id);
			assert_eq!(strategy.id(), id);
			assert!(!strategy.stream_endpoints().is_empty());
			assert!(!strategy.extraction_selectors().is_empty());
			assert!(!strategy.input_selectors().is_empty());
		}
	}

	#[test]
	fn test_exactly_one_provider_has_explicit_end_marker() {
		let with_marker: Vec<_> = ProviderId::ALL
			.into_iter()
			.filter(|id| strategy_for(*id).stream_end_marker().is_some())
			.collect();
		assert_eq!(with_marker, vec![ProviderId::Claude]);
	}

	#[test]
	fn test_sse_field_split() {
		assert_eq!(sse_field("data: {\"a\":1}"), Some(("data", "{\"a\":1}")));
		assert_eq!(sse_field("event: message_stop"), Some(("event", "message_stop")));
		assert_eq!(sse_field("no colon here"), None);
	}
}
