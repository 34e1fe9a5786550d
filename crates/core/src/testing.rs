//! Scripted [`PageAutomation`] fake for tests.
//!
//! Tests register responders keyed by a marker substring of the script
//! they answer (`__pxCapture.read()`, `__pxBusy`, `outerHTML`, ...).
//! Each responder replays a queue of values and then sticks on the last
//! one, which matches how polling loops re-read the same page state.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use proxima_protocol::ProviderId;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::page::PageAutomation;

struct Responder {
	marker: String,
	queue: VecDeque<Value>,
	last: Value,
}

#[derive(Default)]
pub struct FakePage {
	responders: Mutex<Vec<Responder>>,
	fail_markers: Mutex<Vec<(String, String)>>,
	scripts: Mutex<Vec<(ProviderId, String)>>,
	keys: Mutex<Vec<(ProviderId, String, Vec<String>)>>,
	navigations: Mutex<Vec<(ProviderId, String)>>,
	attachments: Mutex<Vec<(ProviderId, PathBuf)>>,
	ready: Mutex<HashMap<ProviderId, bool>>,
}

impl FakePage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers one more value for scripts containing `marker`. The
	/// last registered value repeats forever once the queue drains.
	pub fn on(&self, marker: &str, value: Value) {
		let mut responders = self.responders.lock();
		if let Some(responder) = responders.iter_mut().find(|r| r.marker == marker) {
			responder.queue.push_back(value.clone());
			responder.last = value;
		} else {
			responders.push(Responder {
				marker: marker.to_string(),
				queue: VecDeque::from([value.clone()]),
				last: value,
			});
		}
	}

	/// Registers a sequence of values for scripts containing `marker`.
	pub fn on_seq(&self, marker: &str, values: impl IntoIterator<Item = Value>) {
		for value in values {
			self.on(marker, value);
		}
	}

	/// Makes scripts containing `marker` fail with a runtime error.
	pub fn fail_on(&self, marker: &str, message: &str) {
		self.fail_markers.lock().push((marker.to_string(), message.to_string()));
	}

	pub fn set_ready(&self, provider_id: ProviderId, ready: bool) {
		self.ready.lock().insert(provider_id, ready);
	}

	/// Number of executed scripts containing `marker`.
	pub fn script_count(&self, marker: &str) -> usize {
		self.scripts.lock().iter().filter(|(_, s)| s.contains(marker)).count()
	}

	/// Number of executed scripts containing `marker` for one provider.
	pub fn script_count_for(&self, provider_id: ProviderId, marker: &str) -> usize {
		self.scripts
			.lock()
			.iter()
			.filter(|(p, s)| *p == provider_id && s.contains(marker))
			.count()
	}

	pub fn keys_sent(&self) -> Vec<(ProviderId, String, Vec<String>)> {
		self.keys.lock().clone()
	}

	pub fn navigations(&self) -> Vec<(ProviderId, String)> {
		self.navigations.lock().clone()
	}

	pub fn attachments(&self) -> Vec<(ProviderId, PathBuf)> {
		self.attachments.lock().clone()
	}
}

#[async_trait]
impl PageAutomation for FakePage {
	async fn execute_script(&self, provider_id: ProviderId, script: &str) -> Result<Value> {
		self.scripts.lock().push((provider_id, script.to_string()));

		if let Some((_, message)) = self
			.fail_markers
			.lock()
			.iter()
			.find(|(marker, _)| script.contains(marker))
		{
			return Err(Error::Runtime(proxima_runtime::Error::ProtocolError(message.clone())));
		}

		let mut responders = self.responders.lock();
		let Some(responder) = responders.iter_mut().find(|r| script.contains(&r.marker)) else {
			return Ok(Value::Null);
		};
		Ok(responder.queue.pop_front().unwrap_or_else(|| responder.last.clone()))
	}

	async fn send_key(&self, provider_id: ProviderId, key: &str, modifiers: &[&str]) -> Result<()> {
		self.keys.lock().push((
			provider_id,
			key.to_string(),
			modifiers.iter().map(|m| m.to_string()).collect(),
		));
		Ok(())
	}

	async fn navigate(&self, provider_id: ProviderId, url: &str) -> Result<()> {
		self.navigations.lock().push((provider_id, url.to_string()));
		Ok(())
	}

	async fn is_session_ready(&self, provider_id: ProviderId) -> Result<bool> {
		Ok(self.ready.lock().get(&provider_id).copied().unwrap_or(true))
	}

	async fn attach_file(&self, provider_id: ProviderId, path: &Path) -> Result<bool> {
		self.attachments.lock().push((provider_id, path.to_path_buf()));
		Ok(true)
	}
}
