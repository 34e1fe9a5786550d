//! Parallel multi-dispatch.
//!
//! Fans one message out to an explicit provider set concurrently. Every
//! entry resolves on its own; a failing provider contributes an error
//! entry and never cancels or delays the others.

use std::time::Instant;

use futures_util::future::join_all;
use proxima_protocol::{FanoutEntry, FanoutReport, ProviderId};

use crate::dispatch::Engine;

impl Engine {
	/// Sends `message` to every listed provider at once.
	pub async fn dispatch_all(&self, provider_ids: &[ProviderId], message: &str) -> FanoutReport {
		let turns = provider_ids.iter().map(|&provider_id| async move {
			let started = Instant::now();
			let outcome = self.dispatch(provider_id, message).await;
			let elapsed_ms = started.elapsed().as_millis() as u64;
			(provider_id, outcome, elapsed_ms)
		});

		let mut report = FanoutReport::default();
		for (provider_id, outcome, elapsed_ms) in join_all(turns).await {
			let entry = match outcome {
				Ok(reply) => FanoutEntry::Ok { text: reply.text },
				Err(e) => FanoutEntry::Err { error: e.to_string() },
			};
			report.results.insert(provider_id, entry);
			report.timings.insert(provider_id, elapsed_ms);
		}
		report
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use serde_json::json;

	use crate::dispatch::Engine;
	use crate::page::PageAutomation;
	use crate::settings::StaticSettings;
	use crate::testing::FakePage;
	use proxima_protocol::ProviderId;

	#[tokio::test(start_paused = true)]
	async fn test_one_failure_never_sinks_the_others() {
		let page = FakePage::new();
		page.set_ready(ProviderId::ChatGpt, false);
		page.on("__pxBusy", json!(false));
		page.on("outerHTML", json!({ "candidates": [], "blockCount": 0, "artifact": null }));
		page.on("ProseMirror", json!("div.ProseMirror"));
		page.on("__pxVerify", json!("ping"));
		page.on("__pxSubmit", json!(true));
		page.on(
			"__pxCapture.read()",
			json!({
				"installed": true,
				"isStreaming": false,
				"activeStreamId": 1,
				"lastCaptureMs": 1,
				"streams": [{
					"id": 1,
					"lines": [format!("data: {}", json!({ "type": "completion", "completion": "pong" }))],
					"done": true
				}]
			}),
		);

		let page = Arc::new(page);
		let engine = Engine::new(
			Arc::clone(&page) as Arc<dyn PageAutomation>,
			Arc::new(StaticSettings::default()),
		);

		let report = engine
			.dispatch_all(&[ProviderId::ChatGpt, ProviderId::Claude], "ping")
			.await;

		assert_eq!(report.results.len(), 2);
		assert!(report.results[&ProviderId::ChatGpt].is_err());
		assert_eq!(report.results[&ProviderId::Claude].text(), Some("pong"));
		assert!(report.timings.contains_key(&ProviderId::ChatGpt));
		assert!(report.timings.contains_key(&ProviderId::Claude));
	}
}
