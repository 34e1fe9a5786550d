//! Stream interceptor.
//!
//! A script installed once per page load (idempotent window guard) wraps
//! the page's `fetch`. Responses matching the provider's endpoint
//! allow-list that look like streamed bodies are cloned and read
//! incrementally; decoded lines accumulate in a per-stream buffer. The
//! engine reads the whole state back as one owned snapshot, picks the
//! winning buffer, and parses it with the provider's chunk parser.
//!
//! The page script is provider-generic: only the endpoint regexes and
//! the optional end-of-message marker are substituted in.

use proxima_protocol::{CaptureState, ProviderId, StreamBuffer};

use crate::error::Result;
use crate::page::PageAutomation;
use crate::provider::{ChunkPayload, ProviderStrategy};

/// Window property guarding double-installation.
pub const INSTALL_GUARD: &str = "__pxCapture";

const INSTALL_TEMPLATE: &str = r#"(() => {
	if (window.__pxCapture) { return true; }
	const state = { nextId: 1, activeStreamId: null, isStreaming: false, lastCaptureMs: null, streams: new Map() };
	const ENDPOINTS = [/*ENDPOINTS*/];
	const END_MARKER = /*END_MARKER*/;
	const matches = (url, method) => ENDPOINTS.some((e) => e.re.test(url) && (!e.method || e.method === method));
	const finish = (entry) => {
		entry.done = true;
		if (state.activeStreamId === entry.id) { state.isStreaming = false; }
	};
	const originalFetch = window.fetch;
	window.fetch = async function (...args) {
		const response = await originalFetch.apply(this, args);
		try {
			const url = typeof args[0] === "string" ? args[0] : ((args[0] && args[0].url) || "");
			const method = (((args[1] && args[1].method) || (args[0] && args[0].method) || "GET") + "").toUpperCase();
			const contentType = response.headers.get("content-type") || "";
			const streamed = contentType.includes("stream") || contentType.includes("text/event-stream");
			if (!matches(url, method) || !response.body || !streamed) { return response; }
			const entry = { id: state.nextId++, lines: [], done: false, tail: "" };
			state.streams.set(entry.id, entry);
			state.activeStreamId = entry.id;
			state.isStreaming = true;
			const reader = response.clone().body.getReader();
			const decoder = new TextDecoder();
			(async () => {
				try {
					for (;;) {
						const { value, done } = await reader.read();
						if (done) { break; }
						const chunk = decoder.decode(value, { stream: true });
						const pieces = (entry.tail + chunk).split("\n");
						entry.tail = pieces.pop() || "";
						for (const piece of pieces) {
							if (piece.trim().length > 0) { entry.lines.push(piece); }
						}
						state.lastCaptureMs = Date.now();
						if (END_MARKER && chunk.includes(END_MARKER)) { finish(entry); return; }
					}
					if (entry.tail.trim().length > 0) { entry.lines.push(entry.tail); entry.tail = ""; }
					finish(entry);
				} catch (_) {
					finish(entry);
				}
			})();
		} catch (_) {}
		return response;
	};
	window.__pxCapture = {
		read: () => ({
			installed: true,
			isStreaming: state.isStreaming,
			activeStreamId: state.activeStreamId,
			lastCaptureMs: state.lastCaptureMs,
			streams: Array.from(state.streams.values()).map((s) => ({ id: s.id, lines: s.lines, done: s.done }))
		}),
		reset: () => {
			state.streams.clear();
			state.activeStreamId = null;
			state.isStreaming = false;
			state.lastCaptureMs = null;
		}
	};
	return true;
})()"#;

const READ_SCRIPT: &str = "(() => window.__pxCapture ? window.__pxCapture.read() : { installed: false })()";

const RESET_SCRIPT: &str = "(() => { if (window.__pxCapture) { window.__pxCapture.reset(); } return true; })()";

/// Builds the install script for one provider.
pub fn install_script(strategy: &dyn ProviderStrategy) -> String {
	let regexes = strategy
		.stream_endpoints()
		.iter()
		.map(|rule| {
			let method = match rule.method() {
				Some(method) => format!("\"{method}\""),
				None => "null".to_string(),
			};
			format!(
				"{{ re: new RegExp(\"{}\", \"i\"), method: {method} }}",
				rule.to_js_regex().replace('\\', "\\\\")
			)
		})
		.collect::<Vec<_>>()
		.join(", ");
	let marker = match strategy.stream_end_marker() {
		Some(marker) => serde_json::Value::String(marker.to_string()).to_string(),
		None => "null".to_string(),
	};
	INSTALL_TEMPLATE
		.replace("/*ENDPOINTS*/", &regexes)
		.replace("/*END_MARKER*/", &marker)
}

/// Installs the interceptor. Safe to call before every send: the window
/// guard makes reinstallation a no-op.
pub async fn install(page: &dyn PageAutomation, strategy: &dyn ProviderStrategy) -> Result<()> {
	page.execute_script(strategy.id(), &install_script(strategy)).await?;
	Ok(())
}

/// Reads the page-side capture state as an owned snapshot.
///
/// `installed == false` means the guard is gone (page reloaded) and the
/// interceptor cannot serve this turn.
pub async fn read_state(page: &dyn PageAutomation, provider_id: ProviderId) -> Result<CaptureState> {
	let value = page.execute_script(provider_id, READ_SCRIPT).await?;
	if value.is_null() {
		return Ok(CaptureState::default());
	}
	let state = serde_json::from_value(value)
		.map_err(|e| proxima_runtime::Error::ProtocolError(format!("bad capture state: {e}")))?;
	Ok(state)
}

/// Clears all stream buffers so the next turn starts clean.
pub async fn reset(page: &dyn PageAutomation, provider_id: ProviderId) -> Result<()> {
	page.execute_script(provider_id, RESET_SCRIPT).await?;
	Ok(())
}

/// Folds a raw line buffer into answer text with the provider's parser.
/// Unparseable lines are skipped, never fatal.
pub fn assemble_text(strategy: &dyn ProviderStrategy, buffer: &StreamBuffer) -> String {
	let mut text = String::new();
	for line in &buffer.lines {
		match strategy.parse_chunk_line(line) {
			Some(ChunkPayload::Delta(delta)) => text.push_str(&delta),
			Some(ChunkPayload::Snapshot(snapshot)) => text = snapshot,
			None => {}
		}
	}
	text
}

/// Orchestrator-facing view of one capture-state poll.
#[derive(Debug, Clone, Default)]
pub struct StreamSnapshot {
	pub installed: bool,
	pub is_streaming: bool,
	pub has_active_stream: bool,
	/// Parsed text of the winning buffer.
	pub text: String,
}

/// Reads and distills the capture state in one call.
pub async fn snapshot(page: &dyn PageAutomation, strategy: &dyn ProviderStrategy) -> Result<StreamSnapshot> {
	let state = read_state(page, strategy.id()).await?;
	Ok(distill(strategy, &state))
}

fn distill(strategy: &dyn ProviderStrategy, state: &CaptureState) -> StreamSnapshot {
	let text = state
		.winning_buffer()
		.map(|buffer| assemble_text(strategy, buffer))
		.unwrap_or_default();
	StreamSnapshot {
		installed: state.installed,
		is_streaming: state.is_streaming,
		has_active_stream: state.active_stream_id.is_some(),
		text,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::provider::{Claude, Gemini, strategy_for};
	use proxima_protocol::ProviderId;

	#[test]
	fn test_install_script_is_guarded_and_parameterized() {
		let strategy = Claude::new();
		let script = install_script(&strategy);
		assert!(script.contains("if (window.__pxCapture) { return true; }"));
		assert!(script.contains("completion"));
		assert!(script.contains(r#"method: "POST""#));
		assert!(script.contains(r#"const END_MARKER = "message_stop";"#));

		let gemini = install_script(&Gemini::new());
		assert!(gemini.contains("const END_MARKER = null;"));
	}

	#[test]
	fn test_assemble_text_deltas_and_snapshots() {
		let strategy = strategy_for(ProviderId::Claude);
		let buffer = StreamBuffer {
			id: 1,
			lines: vec![
				r#"data: {"type": "content_block_delta", "delta": {"text": "Hello"}}"#.to_string(),
				"this line is garbage".to_string(),
				r#"data: {"type": "content_block_delta", "delta": {"text": ", world"}}"#.to_string(),
			],
			done: true,
		};
		assert_eq!(assemble_text(&*strategy, &buffer), "Hello, world");

		let strategy = strategy_for(ProviderId::ChatGpt);
		let buffer = StreamBuffer {
			id: 1,
			lines: vec![
				r#"data: {"message": {"content": {"parts": ["Hel"]}}}"#.to_string(),
				r#"data: {"message": {"content": {"parts": ["Hello there"]}}}"#.to_string(),
			],
			done: true,
		};
		// Snapshots replace, so the final state is the last frame.
		assert_eq!(assemble_text(&*strategy, &buffer), "Hello there");
	}

	#[test]
	fn test_distill_prefers_longer_buffer_over_short_active() {
		let strategy = strategy_for(ProviderId::Claude);
		let long_line = r#"data: {"type": "completion", "completion": "a long accumulated answer body"}"#;
		let short_line = r#"data: {"type": "completion", "completion": "hi"}"#;
		let state = CaptureState {
			installed: true,
			is_streaming: true,
			active_stream_id: Some(2),
			last_capture_ms: None,
			streams: vec![
				StreamBuffer {
					id: 1,
					lines: vec![long_line.to_string()],
					done: false,
				},
				StreamBuffer {
					id: 2,
					lines: vec![short_line.to_string()],
					done: false,
				},
			],
		};
		let snapshot = distill(&*strategy, &state);
		assert_eq!(snapshot.text, "a long accumulated answer body");

		// Once the active stream overtakes, it wins and the text never
		// reverts to the shorter buffer.
		let mut state = state;
		state.streams[1]
			.lines
			.push(r#"data: {"type": "completion", "completion": " and then some more text arrives here"}"#.to_string());
		let snapshot = distill(&*strategy, &state);
		assert!(snapshot.text.starts_with("hi and then some more"));
	}

	#[test]
	fn test_uninstalled_state_reads_as_unavailable() {
		let strategy = strategy_for(ProviderId::ChatGpt);
		let snapshot = distill(&*strategy, &CaptureState::default());
		assert!(!snapshot.installed);
		assert!(snapshot.text.is_empty());
	}
}
