//! Generation-completion detector.
//!
//! One idempotent boolean page query per poll. The provider's busy
//! signals are ORed: a stop-generation control, progress indicators
//! scoped to the main content area (navigation and sidebars excluded so
//! their spinners never read as generation), and textual status markers.
//! No single signal is authoritative; any true signal means "still
//! generating".

use serde_json::json;

use crate::error::Result;
use crate::page::PageAutomation;
use crate::provider::ProviderStrategy;

/// Builds the busy-check script for one provider.
fn busy_script(strategy: &dyn ProviderStrategy) -> String {
	let signals = strategy.busy_signals();
	let stop = json!(signals.stop_selectors);
	let progress = json!(signals.progress_selectors);
	let markers = json!(signals.status_markers);
	let scope = json!(signals.main_scope);
	let excluded = json!(signals.excluded_scopes);
	format!(
		r#"(() => {{
	const stop = {stop};
	const progress = {progress};
	const markers = {markers};
	const excluded = {excluded};
	const scope = document.querySelector({scope}) || document.body;
	const inExcluded = (el) => excluded.some((sel) => {{ try {{ return el.closest(sel) !== null; }} catch (_) {{ return false; }} }});
	let __pxBusy = false;
	for (const sel of stop) {{
		try {{
			const el = document.querySelector(sel);
			if (el && !inExcluded(el)) {{ __pxBusy = true; break; }}
		}} catch (_) {{}}
	}}
	if (!__pxBusy && scope) {{
		for (const sel of progress) {{
			try {{
				for (const el of scope.querySelectorAll(sel)) {{
					if (!inExcluded(el)) {{ __pxBusy = true; break; }}
				}}
			}} catch (_) {{}}
			if (__pxBusy) {{ break; }}
		}}
		if (!__pxBusy && markers.length > 0) {{
			const text = scope.innerText || "";
			__pxBusy = markers.some((m) => text.includes(m));
		}}
	}}
	return __pxBusy;
}})()"#
	)
}

/// Whether the provider is still generating. Polled externally; a
/// scripting failure reads as "not generating" at the call sites that
/// poll it.
pub async fn is_generating(page: &dyn PageAutomation, strategy: &dyn ProviderStrategy) -> Result<bool> {
	let value = page.execute_script(strategy.id(), &busy_script(strategy)).await?;
	Ok(value.as_bool().unwrap_or(false))
}

#[cfg(test)]
mod tests {
	use proxima_protocol::ProviderId;

	use super::*;
	use crate::provider::strategy_for;
	use crate::testing::FakePage;

	#[test]
	fn test_script_carries_all_signal_groups() {
		let strategy = strategy_for(ProviderId::Perplexity);
		let script = busy_script(&*strategy);
		assert!(script.contains("Stop generating response"));
		assert!(script.contains("animate-pulse"));
		assert!(script.contains("Searching"));
		assert!(script.contains(r#"document.querySelector("main")"#));
		assert!(script.contains("closest"));
	}

	#[tokio::test]
	async fn test_busy_result_passes_through() {
		let strategy = strategy_for(ProviderId::ChatGpt);
		let page = FakePage::new();
		page.on("__pxBusy", serde_json::json!(true));
		assert!(is_generating(&page, &*strategy).await.unwrap());

		let page = FakePage::new();
		page.on("__pxBusy", serde_json::json!(false));
		assert!(!is_generating(&page, &*strategy).await.unwrap());
	}

	#[tokio::test]
	async fn test_non_boolean_result_reads_as_idle() {
		let strategy = strategy_for(ProviderId::ChatGpt);
		let page = FakePage::new();
		page.on("__pxBusy", serde_json::Value::Null);
		assert!(!is_generating(&page, &*strategy).await.unwrap());
	}
}
