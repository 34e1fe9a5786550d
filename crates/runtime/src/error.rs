//! Error types for the proxima runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the IPC runtime.
#[derive(Debug, Error)]
pub enum Error {
	/// Transport-level error (socket/pipe communication).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Protocol-level error (malformed or unexpected message).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Host-reported action failure with a stable code.
	#[error("{code}: {message}")]
	Host { code: String, message: String },

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// No response within the local bound. Says nothing about whether
	/// the host-side action failed.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Channel closed unexpectedly (connection shut down).
	#[error("Channel closed unexpectedly")]
	ChannelClosed,
}

impl Error {
	/// Returns the host error code if this is a host-reported failure.
	pub fn host_code(&self) -> Option<&str> {
		match self {
			Error::Host { code, .. } => Some(code),
			_ => None,
		}
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}
}
