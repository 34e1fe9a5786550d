//! Error types for the engine.

use proxima_protocol::ProviderId;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// One provider's failure inside an exhausted routing attempt.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
	pub provider_id: ProviderId,
	pub attempts: u32,
	pub cause: String,
}

impl std::fmt::Display for ProviderFailure {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ({} attempts): {}", self.provider_id, self.attempts, self.cause)
	}
}

/// Errors surfaced to engine callers.
///
/// Transient capture misses and stale-fingerprint rejections are handled
/// inside the capture orchestrator and never appear here.
#[derive(Debug, Error)]
pub enum Error {
	/// Session uninitialized or the page is gone. Hard error; retried
	/// only through the router's provider-level fallback.
	#[error("provider unavailable: {provider_id}")]
	ProviderUnavailable { provider_id: ProviderId },

	/// Every routing candidate was exhausted.
	#[error("all providers failed: [{}]", .failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
	AllProvidersFailed { failures: Vec<ProviderFailure> },

	/// No enabled provider to route to.
	#[error("no providers enabled")]
	NoProvidersEnabled,

	/// Provider settings could not be read at a decision point.
	#[error("settings error: {0}")]
	Settings(String),

	/// IPC/runtime failure talking to the automation host.
	#[error(transparent)]
	Runtime(#[from] proxima_runtime::Error),
}

impl Error {
	/// Returns true when the underlying cause was an IPC timeout.
	pub fn is_ipc_timeout(&self) -> bool {
		matches!(self, Error::Runtime(e) if e.is_timeout())
	}
}
