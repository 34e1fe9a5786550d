//! Capture state snapshots and per-turn capture results.

use serde::{Deserialize, Serialize};

/// Raw buffer of one intercepted network stream.
///
/// The page script keeps one buffer per outbound call so an overlapping
/// slower request can never clobber a newer one; arbitration between
/// buffers happens engine-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamBuffer {
	/// Unique id assigned when the outbound call was observed.
	pub id: u64,
	/// Decoded body lines accumulated so far, in arrival order.
	#[serde(default)]
	pub lines: Vec<String>,
	/// Whether this stream's read loop has ended.
	#[serde(default)]
	pub done: bool,
}

/// Snapshot of the page-side capture state, read in a single call.
///
/// Owned value: the page keeps the mutable state, the engine only ever
/// sees copies of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureState {
	/// Install guard presence. `false` after a page reload means the
	/// interceptor is unavailable for this turn.
	#[serde(default)]
	pub installed: bool,
	/// Whether any matched stream is still being read.
	#[serde(default)]
	pub is_streaming: bool,
	/// Id of the most recently started matched stream, if any.
	#[serde(default)]
	pub active_stream_id: Option<u64>,
	/// Unix millis of the last chunk appended to any buffer.
	#[serde(default)]
	pub last_capture_ms: Option<u64>,
	/// All stream buffers observed since the last reset.
	#[serde(default)]
	pub streams: Vec<StreamBuffer>,
}

impl CaptureState {
	/// Selects the buffer allowed to back the shared capture text: the
	/// active stream if present, unless a non-active buffer has strictly
	/// more accumulated content. The result never shrinks across polls
	/// for a fixed set of growing buffers.
	pub fn winning_buffer(&self) -> Option<&StreamBuffer> {
		let active = self
			.active_stream_id
			.and_then(|id| self.streams.iter().find(|s| s.id == id));
		let longest = self.streams.iter().max_by_key(|s| s.content_len());

		match (active, longest) {
			(Some(active), Some(longest)) if longest.content_len() > active.content_len() => Some(longest),
			(Some(active), _) => Some(active),
			(None, longest) => longest,
		}
	}
}

impl StreamBuffer {
	/// Total accumulated content length, used for arbitration.
	pub fn content_len(&self) -> usize {
		self.lines.iter().map(|l| l.len()).sum()
	}
}

/// Which extraction strategy produced a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
	/// Extracted from an intercepted response body, pre-render.
	Network,
	/// Extracted from rendered markup.
	Dom,
}

/// One finalized answer for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
	pub text: String,
	pub source_path: CaptureSource,
	pub elapsed_ms: u64,
}
