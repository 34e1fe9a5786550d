//! Response capture orchestrator.
//!
//! One call per turn, two phases. Fast path: poll the interceptor's
//! shared state until the stream finishes with text. Slow path: wait out
//! any detected generation, then poll the DOM extractor gated by the
//! freshness check until the text holds still. Always resolves with a
//! result; transient misses degrade to best-effort text or the
//! no-response sentinel, never an error.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use proxima_protocol::{CaptureResult, CaptureSource};

use crate::fingerprint::ResponseFingerprint;
use crate::page::PageAutomation;
use crate::poll::poll_until;
use crate::provider::ProviderStrategy;
use crate::{detector, extractor, interceptor};

/// Explicit marker returned when the whole poll budget yields nothing.
pub const NO_RESPONSE: &str = "[no response]";

/// Interval between interceptor state polls.
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Interval between DOM extraction polls.
const DOM_POLL_INTERVAL: Duration = Duration::from_millis(750);

/// Interval between busy-state polls while waiting out generation.
const BUSY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Empty fast-path polls (no active stream, no text) before giving the
/// DOM fallback its turn.
const EMPTY_POLL_ABANDON: u32 = 4;

enum FastPoll {
	/// Stream finished with text.
	Done(String),
	/// Install guard missing: page reloaded, interception unavailable.
	Unavailable,
	/// Nothing ever started streaming.
	Abandon,
}

/// Captures one finalized answer for the current turn.
pub async fn capture_turn(
	page: &dyn PageAutomation,
	strategy: &dyn ProviderStrategy,
	fingerprint: &ResponseFingerprint,
) -> CaptureResult {
	let started = Instant::now();

	if let Some(text) = fast_path(page, strategy).await {
		// Leave the buffers clean for the next turn.
		let _ = interceptor::reset(page, strategy.id()).await;
		tracing::debug!(target = "px.capture", provider = %strategy.id(), len = text.len(), "network capture");
		return CaptureResult {
			text,
			source_path: CaptureSource::Network,
			elapsed_ms: started.elapsed().as_millis() as u64,
		};
	}

	let text = slow_path(page, strategy, fingerprint).await;
	tracing::debug!(target = "px.capture", provider = %strategy.id(), len = text.len(), "dom capture");
	CaptureResult {
		text,
		source_path: CaptureSource::Dom,
		elapsed_ms: started.elapsed().as_millis() as u64,
	}
}

fn attempts(budget: Duration, interval: Duration) -> u32 {
	(budget.as_millis() / interval.as_millis()).max(1) as u32
}

async fn fast_path(page: &dyn PageAutomation, strategy: &dyn ProviderStrategy) -> Option<String> {
	let budget = attempts(strategy.fast_path_budget(), STREAM_POLL_INTERVAL);
	let outcome = poll_until(STREAM_POLL_INTERVAL, budget, |attempt| async move {
		let snapshot = match interceptor::snapshot(page, strategy).await {
			Ok(snapshot) => snapshot,
			// A failed poll is "no text yet", not a verdict.
			Err(_) => return None,
		};
		if !snapshot.installed {
			return Some(FastPoll::Unavailable);
		}
		if !snapshot.is_streaming && !snapshot.text.is_empty() {
			return Some(FastPoll::Done(snapshot.text));
		}
		if attempt >= EMPTY_POLL_ABANDON && !snapshot.has_active_stream && snapshot.text.is_empty() {
			return Some(FastPoll::Abandon);
		}
		None
	})
	.await;

	match outcome {
		Ok(FastPoll::Done(text)) => Some(text),
		Ok(FastPoll::Unavailable) => {
			tracing::debug!(target = "px.capture", provider = %strategy.id(), "interceptor unavailable, using dom fallback");
			None
		}
		Ok(FastPoll::Abandon) | Err(_) => None,
	}
}

async fn slow_path(page: &dyn PageAutomation, strategy: &dyn ProviderStrategy, fingerprint: &ResponseFingerprint) -> String {
	// Wait out any detected "still generating" state, bounded. Detector
	// errors read as "not generating".
	let busy_budget = attempts(strategy.generation_wait_budget(), BUSY_POLL_INTERVAL);
	let _ = poll_until(BUSY_POLL_INTERVAL, busy_budget, |_| async move {
		match detector::is_generating(page, strategy).await {
			Ok(true) => None,
			_ => Some(()),
		}
	})
	.await;

	struct DomPollState {
		last: Option<String>,
		stable: u32,
	}

	let stable_target = strategy.stability_threshold().max(1);
	let state = RefCell::new(DomPollState {
		last: None,
		stable: 0,
	});

	let outcome = poll_until(DOM_POLL_INTERVAL, strategy.dom_poll_budget(), |_| {
		let state = &state;
		async move {
			let read = match extractor::extract(page, strategy).await {
				Ok(read) => read,
				Err(_) => return None,
			};
			let mut state = state.borrow_mut();
			let Some(text) = read.text else {
				state.stable = 0;
				return None;
			};
			if fingerprint.is_stale(&text, read.block_count) {
				// Previous turn's leftover: keep waiting for fresh text.
				state.stable = 0;
				return None;
			}
			if state.last.as_deref() == Some(text.as_str()) {
				state.stable += 1;
			} else {
				state.stable = 1;
				state.last = Some(text);
			}
			(state.stable >= stable_target).then(|| state.last.clone().expect("last set above"))
		}
	})
	.await;

	match outcome {
		Ok(text) => text,
		// Budget exhausted: best-effort fresh text beats an error.
		Err(_) => state
			.into_inner()
			.last
			.unwrap_or_else(|| NO_RESPONSE.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use proxima_protocol::ProviderId;
	use serde_json::json;

	use super::*;
	use crate::provider::strategy_for;
	use crate::testing::FakePage;

	fn capture_state(streaming: bool, lines: &[&str]) -> serde_json::Value {
		json!({
			"installed": true,
			"isStreaming": streaming,
			"activeStreamId": 1,
			"lastCaptureMs": 1000,
			"streams": [{ "id": 1, "lines": lines, "done": !streaming }]
		})
	}

	fn dom_payload(html: &str, blocks: usize) -> serde_json::Value {
		json!({
			"candidates": [{ "selector": "x", "html": html }],
			"blockCount": blocks,
			"artifact": null
		})
	}

	#[tokio::test(start_paused = true)]
	async fn test_fast_path_returns_without_dom_fallback() {
		let strategy = strategy_for(ProviderId::Claude);
		let page = FakePage::new();
		page.on(
			"__pxCapture.read()",
			capture_state(false, &[r#"data: {"type": "completion", "completion": "streamed answer"}"#]),
		);

		let fingerprint = ResponseFingerprint::take("", None);
		let result = capture_turn(&page, &*strategy, &fingerprint).await;

		assert_eq!(result.text, "streamed answer");
		assert_eq!(result.source_path, CaptureSource::Network);
		assert_eq!(page.script_count("outerHTML"), 0, "dom fallback must not run");
		// Fast-path success clears the shared buffer for the next turn.
		assert_eq!(page.script_count("__pxCapture.reset()"), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_streaming_state_waits_until_finished() {
		let strategy = strategy_for(ProviderId::Claude);
		let page = FakePage::new();
		page.on_seq(
			"__pxCapture.read()",
			[
				capture_state(true, &[r#"data: {"type": "completion", "completion": "part"}"#]),
				capture_state(true, &[r#"data: {"type": "completion", "completion": "partial answ"}"#]),
				capture_state(false, &[r#"data: {"type": "completion", "completion": "full answer"}"#]),
			],
		);

		let fingerprint = ResponseFingerprint::take("", None);
		let result = capture_turn(&page, &*strategy, &fingerprint).await;
		assert_eq!(result.text, "full answer");
	}

	#[tokio::test(start_paused = true)]
	async fn test_uninstalled_interceptor_skips_to_dom() {
		let strategy = strategy_for(ProviderId::ChatGpt);
		let page = FakePage::new();
		page.on("__pxCapture.read()", json!({ "installed": false }));
		page.on("__pxBusy", json!(false));
		page.on("outerHTML", dom_payload("<p>a rendered answer from the page</p>", 1));

		let fingerprint = ResponseFingerprint::take("", None);
		let result = capture_turn(&page, &*strategy, &fingerprint).await;

		assert_eq!(result.text, "a rendered answer from the page");
		assert_eq!(result.source_path, CaptureSource::Dom);
		// One interceptor poll was enough to see the missing guard.
		assert_eq!(page.script_count("__pxCapture.read()"), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_dom_text_must_hold_still_for_stability_threshold() {
		let strategy = strategy_for(ProviderId::ChatGpt);
		let page = FakePage::new();
		page.on("__pxCapture.read()", json!({ "installed": false }));
		page.on("__pxBusy", json!(false));
		page.on_seq(
			"outerHTML",
			[
				dom_payload("<p>the answer is still growing</p>", 1),
				dom_payload("<p>the answer is still growing longer</p>", 1),
				dom_payload("<p>the final rendered answer text</p>", 1),
				dom_payload("<p>the final rendered answer text</p>", 1),
				dom_payload("<p>the final rendered answer text</p>", 1),
			],
		);

		let fingerprint = ResponseFingerprint::take("", None);
		let result = capture_turn(&page, &*strategy, &fingerprint).await;

		assert_eq!(result.text, "the final rendered answer text");
		// Three consecutive identical reads on top of the two changing
		// ones: never fewer extraction polls than that.
		assert!(page.script_count("outerHTML") >= 5);
	}

	#[tokio::test(start_paused = true)]
	async fn test_stale_fingerprint_text_is_never_returned() {
		let strategy = strategy_for(ProviderId::Gemini);
		let page = FakePage::new();
		page.on("__pxCapture.read()", json!({ "installed": false }));
		page.on("__pxBusy", json!(false));
		// Every read returns the pre-send leftover.
		page.on("outerHTML", dom_payload("<p>the previous answer, unchanged</p>", 1));

		let fingerprint = ResponseFingerprint::take("the previous answer, unchanged", None);
		let result = capture_turn(&page, &*strategy, &fingerprint).await;

		assert_eq!(result.text, NO_RESPONSE);
		assert_eq!(result.source_path, CaptureSource::Dom);
	}

	#[tokio::test(start_paused = true)]
	async fn test_stale_then_fresh_text_resolves_fresh() {
		let strategy = strategy_for(ProviderId::Gemini);
		let page = FakePage::new();
		page.on("__pxCapture.read()", json!({ "installed": false }));
		page.on("__pxBusy", json!(false));
		page.on_seq(
			"outerHTML",
			[
				dom_payload("<p>the previous answer, unchanged</p>", 1),
				dom_payload("<p>the previous answer, unchanged</p>", 1),
				dom_payload("<p>a fresh answer for this turn</p>", 2),
			],
		);

		let fingerprint = ResponseFingerprint::take("the previous answer, unchanged", None);
		let result = capture_turn(&page, &*strategy, &fingerprint).await;
		assert_eq!(result.text, "a fresh answer for this turn");
	}

	#[tokio::test(start_paused = true)]
	async fn test_busy_state_is_waited_out_before_extraction() {
		let strategy = strategy_for(ProviderId::ChatGpt);
		let page = FakePage::new();
		page.on("__pxCapture.read()", json!({ "installed": false }));
		page.on_seq("__pxBusy", [json!(true), json!(true), json!(false)]);
		page.on("outerHTML", dom_payload("<p>done generating at last</p>", 1));

		let fingerprint = ResponseFingerprint::take("", None);
		let result = capture_turn(&page, &*strategy, &fingerprint).await;

		assert_eq!(result.text, "done generating at last");
		assert_eq!(page.script_count("__pxBusy"), 3);
	}
}
