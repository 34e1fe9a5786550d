//! The one wait-then-recheck loop.
//!
//! Every polling wait in the engine (stream snapshots, busy checks, DOM
//! stability) goes through [`poll_until`] so interval/budget handling is
//! written once.

use std::future::Future;
use std::time::Duration;

/// The probe never produced a value within its attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
	pub attempts: u32,
}

impl std::fmt::Display for PollTimeout {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "condition not met after {} attempts", self.attempts)
	}
}

impl std::error::Error for PollTimeout {}

/// Runs `probe` up to `max_attempts` times, sleeping `interval` between
/// attempts, until it yields `Some`. The probe receives the 0-based
/// attempt number. Always resolves: success or [`PollTimeout`], never
/// cancellation from outside.
pub async fn poll_until<T, F, Fut>(interval: Duration, max_attempts: u32, mut probe: F) -> Result<T, PollTimeout>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Option<T>>,
{
	for attempt in 0..max_attempts {
		if let Some(value) = probe(attempt).await {
			return Ok(value);
		}
		if attempt + 1 < max_attempts {
			tokio::time::sleep(interval).await;
		}
	}
	Err(PollTimeout {
		attempts: max_attempts,
	})
}
