//! Provider dispatch: one full send-and-capture cycle.
//!
//! The [`Engine`] owns the per-provider sessions, the engine-wide
//! clipboard lock and the router statistics. Turns against one provider
//! are serialized by the session lock; different providers run freely in
//! parallel.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use proxima_protocol::{DispatchReply, ProviderId, RouterStats};
use serde_json::json;
use tokio::sync::Mutex as TokioMutex;

use crate::capture;
use crate::error::{Error, Result};
use crate::fingerprint::ResponseFingerprint;
use crate::page::PageAutomation;
use crate::poll::poll_until;
use crate::provider::{InsertMode, ProviderStrategy, strategy_for};
use crate::settings::SettingsSource;
use crate::{detector, extractor, interceptor};

/// Bounded pre-send wait for a previous turn's generation to settle.
const PRE_SEND_IDLE_POLLS: u32 = 30;
const PRE_SEND_IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// One provider's automation context. Created on first use, lives for
/// the process lifetime.
struct ProviderSession {
	/// Serializes turns: at most one in-flight send per provider.
	turn_lock: TokioMutex<()>,
	initialized: AtomicBool,
}

impl ProviderSession {
	fn new() -> Self {
		Self {
			turn_lock: TokioMutex::new(()),
			initialized: AtomicBool::new(false),
		}
	}
}

/// The dispatch engine exposed to callers.
pub struct Engine {
	page: Arc<dyn PageAutomation>,
	settings: Arc<dyn SettingsSource>,
	sessions: Mutex<HashMap<ProviderId, Arc<ProviderSession>>>,
	/// The system clipboard is process-global; paste-simulation swaps it
	/// and must not interleave across sessions.
	clipboard_lock: TokioMutex<()>,
	stats: Mutex<RouterStats>,
}

impl Engine {
	pub fn new(page: Arc<dyn PageAutomation>, settings: Arc<dyn SettingsSource>) -> Self {
		Self {
			page,
			settings,
			sessions: Mutex::new(HashMap::new()),
			clipboard_lock: TokioMutex::new(()),
			stats: Mutex::new(RouterStats::default()),
		}
	}

	pub(crate) fn settings(&self) -> &dyn SettingsSource {
		&*self.settings
	}

	pub(crate) fn stats_mut(&self) -> parking_lot::MutexGuard<'_, RouterStats> {
		self.stats.lock()
	}

	/// Current router statistics.
	pub fn router_stats(&self) -> RouterStats {
		self.stats.lock().clone()
	}

	/// Clears router statistics. Only explicit callers reset them.
	pub fn reset_router_stats(&self) {
		*self.stats.lock() = RouterStats::default();
	}

	fn session(&self, provider_id: ProviderId) -> Arc<ProviderSession> {
		Arc::clone(
			self.sessions
				.lock()
				.entry(provider_id)
				.or_insert_with(|| Arc::new(ProviderSession::new())),
		)
	}

	/// Sends one message and captures the answer.
	pub async fn dispatch(&self, provider_id: ProviderId, message: &str) -> Result<DispatchReply> {
		self.dispatch_inner(provider_id, message, None).await
	}

	/// Like [`Engine::dispatch`], attaching a local file first.
	pub async fn dispatch_with_file(
		&self,
		provider_id: ProviderId,
		message: &str,
		file_path: &Path,
	) -> Result<DispatchReply> {
		self.dispatch_inner(provider_id, message, Some(file_path)).await
	}

	/// Whether the provider is currently generating.
	pub async fn get_typing_status(&self, provider_id: ProviderId) -> Result<bool> {
		let strategy = strategy_for(provider_id);
		detector::is_generating(&*self.page, &*strategy).await
	}

	/// Opens a fresh conversation for the provider.
	pub async fn new_conversation(&self, provider_id: ProviderId) -> Result<()> {
		let strategy = strategy_for(provider_id);
		let session = self.session(provider_id);
		let _turn = session.turn_lock.lock().await;
		self.page.navigate(provider_id, strategy.new_conversation_url()).await?;
		// The page reload dropped the interceptor; next dispatch reinstalls.
		session.initialized.store(false, Ordering::SeqCst);
		Ok(())
	}

	async fn dispatch_inner(&self, provider_id: ProviderId, message: &str, file: Option<&Path>) -> Result<DispatchReply> {
		let strategy = strategy_for(provider_id);
		let session = self.session(provider_id);
		let _turn = session.turn_lock.lock().await;

		let started = Instant::now();

		if !self.page.is_session_ready(provider_id).await? {
			return Err(Error::ProviderUnavailable { provider_id });
		}

		// Idempotent per page load; a reloaded page just gets it again.
		interceptor::install(&*self.page, &*strategy).await?;
		if !session.initialized.swap(true, Ordering::SeqCst) {
			tracing::debug!(target = "px.dispatch", provider = %provider_id, "session initialized");
		}

		// Do not type into a page that is still finishing the previous
		// turn; bounded, then proceed regardless.
		let _ = poll_until(PRE_SEND_IDLE_INTERVAL, PRE_SEND_IDLE_POLLS, |_| {
			let page = &self.page;
			let strategy = &strategy;
			async move {
				match detector::is_generating(&**page, &**strategy).await {
					Ok(true) => None,
					_ => Some(()),
				}
			}
		})
		.await;

		interceptor::reset(&*self.page, provider_id).await?;

		// Snapshot what is on screen before we send anything.
		let pre_send = extractor::extract(&*self.page, &*strategy).await.unwrap_or_default();
		let fingerprint = ResponseFingerprint::take(pre_send.text.as_deref().unwrap_or(""), pre_send.block_count);

		let file_uploaded = match file {
			Some(path) => self.page.attach_file(provider_id, path).await?,
			None => false,
		};

		self.insert_message(&*strategy, message).await?;
		self.submit(&*strategy).await?;

		let captured = capture::capture_turn(&*self.page, &*strategy, &fingerprint).await;

		tracing::info!(
			target = "px.dispatch",
			provider = %provider_id,
			source = ?captured.source_path,
			elapsed_ms = captured.elapsed_ms,
			"turn complete"
		);

		Ok(DispatchReply {
			text: captured.text,
			elapsed_ms: started.elapsed().as_millis() as u64,
			file_uploaded,
		})
	}

	/// Focuses the composer, inserts the message, verifies it landed and
	/// retries once on mismatch. Verification is best-effort: submission
	/// proceeds either way.
	async fn insert_message(&self, strategy: &dyn ProviderStrategy, message: &str) -> Result<()> {
		let provider_id = strategy.id();

		let focused = self
			.page
			.execute_script(provider_id, &focus_script(strategy))
			.await?;
		if focused.is_null() {
			// No composer anywhere in the fallback chain: the page is
			// not in a usable state.
			return Err(Error::ProviderUnavailable { provider_id });
		}

		for attempt in 0..2 {
			match strategy.insert_mode() {
				InsertMode::Paste => self.insert_via_paste(strategy, message).await?,
				InsertMode::DirectValue => {
					self.page
						.execute_script(provider_id, &direct_insert_script(strategy, message))
						.await?;
				}
			}

			let inserted = self
				.page
				.execute_script(provider_id, &verify_script(strategy))
				.await?;
			let inserted = inserted.as_str().unwrap_or("");
			if composer_matches(inserted, message) {
				return Ok(());
			}
			tracing::warn!(
				target = "px.dispatch",
				provider = %provider_id,
				attempt,
				"composer text did not verify"
			);
		}

		Ok(())
	}

	/// Paste-simulation with system clipboard swap and restore, under
	/// the engine-wide clipboard lock.
	async fn insert_via_paste(&self, strategy: &dyn ProviderStrategy, message: &str) -> Result<()> {
		let provider_id = strategy.id();
		let _clipboard = self.clipboard_lock.lock().await;

		let saved = self
			.page
			.execute_script(provider_id, "navigator.clipboard.readText().catch(() => null)")
			.await
			.ok()
			.and_then(|v| v.as_str().map(str::to_string));

		self.page
			.execute_script(
				provider_id,
				&format!("navigator.clipboard.writeText({}).then(() => true)", json!(message)),
			)
			.await?;

		let result = self
			.page
			.execute_script(provider_id, &paste_script(strategy, message))
			.await;

		if let Some(previous) = saved {
			let _ = self
				.page
				.execute_script(
					provider_id,
					&format!("navigator.clipboard.writeText({}).then(() => true)", json!(previous)),
				)
				.await;
		}

		result.map(|_| ())
	}

	/// Clicks the send control, falling back to a synthetic Enter.
	async fn submit(&self, strategy: &dyn ProviderStrategy) -> Result<()> {
		let provider_id = strategy.id();
		let clicked = self
			.page
			.execute_script(provider_id, &submit_script(strategy))
			.await?;
		if clicked.as_bool() != Some(true) {
			self.page.send_key(provider_id, "Enter", &[]).await?;
		}
		Ok(())
	}
}

/// Composer content check, tolerant of editors that normalize trailing
/// whitespace or wrap text in block nodes.
fn composer_matches(inserted: &str, message: &str) -> bool {
	inserted.trim() == message.trim()
}

fn focus_script(strategy: &dyn ProviderStrategy) -> String {
	let selectors = json!(strategy.input_selectors());
	format!(
		r#"(() => {{
	const selectors = {selectors};
	let __pxComposer = null;
	for (const sel of selectors) {{
		try {{
			const el = document.querySelector(sel);
			if (el) {{ el.focus(); __pxComposer = sel; break; }}
		}} catch (_) {{}}
	}}
	return __pxComposer;
}})()"#
	)
}

fn direct_insert_script(strategy: &dyn ProviderStrategy, message: &str) -> String {
	let selectors = json!(strategy.input_selectors());
	let message = json!(message);
	format!(
		r#"(() => {{
	const selectors = {selectors};
	const __pxInsert = {message};
	for (const sel of selectors) {{
		try {{
			const el = document.querySelector(sel);
			if (!el) {{ continue; }}
			if ("value" in el) {{ el.value = __pxInsert; }} else {{ el.innerText = __pxInsert; }}
			el.dispatchEvent(new InputEvent("input", {{ bubbles: true }}));
			return true;
		}} catch (_) {{}}
	}}
	return false;
}})()"#
	)
}

fn paste_script(strategy: &dyn ProviderStrategy, message: &str) -> String {
	let selectors = json!(strategy.input_selectors());
	let message = json!(message);
	format!(
		r#"(() => {{
	const selectors = {selectors};
	const __pxInsert = {message};
	for (const sel of selectors) {{
		try {{
			const el = document.querySelector(sel);
			if (!el) {{ continue; }}
			el.focus();
			const data = new DataTransfer();
			data.setData("text/plain", __pxInsert);
			el.dispatchEvent(new ClipboardEvent("paste", {{ clipboardData: data, bubbles: true, cancelable: true }}));
			return true;
		}} catch (_) {{}}
	}}
	return false;
}})()"#
	)
}

fn verify_script(strategy: &dyn ProviderStrategy) -> String {
	let selectors = json!(strategy.input_selectors());
	format!(
		r#"(() => {{
	const selectors = {selectors};
	let __pxVerify = "";
	for (const sel of selectors) {{
		try {{
			const el = document.querySelector(sel);
			if (el) {{ __pxVerify = ("value" in el) ? el.value : el.innerText; break; }}
		}} catch (_) {{}}
	}}
	return __pxVerify;
}})()"#
	)
}

fn submit_script(strategy: &dyn ProviderStrategy) -> String {
	let selectors = json!(strategy.submit_selectors());
	format!(
		r#"(() => {{
	const selectors = {selectors};
	let __pxSubmit = false;
	for (const sel of selectors) {{
		try {{
			const el = document.querySelector(sel);
			if (el && !el.disabled) {{ el.click(); __pxSubmit = true; break; }}
		}} catch (_) {{}}
	}}
	return __pxSubmit;
}})()"#
	)
}
