//! The consumed page automation surface.
//!
//! The host process owns the real browser tabs; the engine only ever
//! talks to them through this trait. Keeping the boundary this narrow is
//! what makes the whole engine testable with a scripted fake.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use proxima_protocol::{ProviderId, actions};
use proxima_runtime::Connection;
use serde_json::{Value, json};

use crate::error::{Error, Result};

/// Scriptable browser page surface, one logical page per provider.
#[async_trait]
pub trait PageAutomation: Send + Sync {
	/// Runs a script in the provider's page context and returns its value.
	async fn execute_script(&self, provider_id: ProviderId, script: &str) -> Result<Value>;

	/// Delivers a synthetic key event to the provider's page.
	async fn send_key(&self, provider_id: ProviderId, key: &str, modifiers: &[&str]) -> Result<()>;

	/// Navigates the provider's page.
	async fn navigate(&self, provider_id: ProviderId, url: &str) -> Result<()>;

	/// Whether the provider's session is initialized and usable.
	async fn is_session_ready(&self, provider_id: ProviderId) -> Result<bool>;

	/// Attaches a local file to the provider's composer. Upload
	/// mechanics live host-side; the engine only forwards the path.
	async fn attach_file(&self, provider_id: ProviderId, path: &Path) -> Result<bool>;
}

/// Host error code for a dead or uninitialized provider session.
const PROVIDER_UNAVAILABLE: &str = "provider_unavailable";

/// [`PageAutomation`] backed by the host IPC connection.
pub struct IpcPage {
	connection: Arc<Connection>,
}

impl IpcPage {
	pub fn new(connection: Arc<Connection>) -> Self {
		Self { connection }
	}

	async fn request(&self, action: &str, provider_id: ProviderId, payload: Value) -> Result<Value> {
		match self.connection.request(action, Some(provider_id), payload).await {
			Ok(value) => Ok(value),
			Err(e) if e.host_code() == Some(PROVIDER_UNAVAILABLE) => Err(Error::ProviderUnavailable { provider_id }),
			Err(e) => Err(e.into()),
		}
	}
}

#[async_trait]
impl PageAutomation for IpcPage {
	async fn execute_script(&self, provider_id: ProviderId, script: &str) -> Result<Value> {
		self.request(actions::EXECUTE_SCRIPT, provider_id, json!({ "script": script }))
			.await
	}

	async fn send_key(&self, provider_id: ProviderId, key: &str, modifiers: &[&str]) -> Result<()> {
		self.request(
			actions::SEND_KEY,
			provider_id,
			json!({ "key": key, "modifiers": modifiers }),
		)
		.await?;
		Ok(())
	}

	async fn navigate(&self, provider_id: ProviderId, url: &str) -> Result<()> {
		self.request(actions::NAVIGATE, provider_id, json!({ "url": url })).await?;
		Ok(())
	}

	async fn is_session_ready(&self, provider_id: ProviderId) -> Result<bool> {
		let value = self.request(actions::IS_READY, provider_id, Value::Null).await?;
		Ok(value.as_bool().unwrap_or(false))
	}

	async fn attach_file(&self, provider_id: ProviderId, path: &Path) -> Result<bool> {
		let value = self
			.request(actions::ATTACH_FILE, provider_id, json!({ "path": path }))
			.await?;
		Ok(value.as_bool().unwrap_or(false))
	}
}
