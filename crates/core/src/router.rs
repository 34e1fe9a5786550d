//! Smart router: priority-ordered, retrying, single-best-provider
//! selection.
//!
//! Priority is the preferred provider (if enabled) followed by the fixed
//! default order, filtered to the enabled set and de-duplicated. Each
//! candidate gets two attempts with a short fixed delay between them;
//! a provider that failed twice is abandoned for this call.

use std::time::Duration;

use proxima_protocol::{ProviderId, RouteOutcome};

use crate::dispatch::Engine;
use crate::error::{Error, ProviderFailure, Result};
use crate::provider::DEFAULT_PRIORITY;
use crate::settings::ProviderSettings;

const ATTEMPTS_PER_PROVIDER: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Builds the attempt order for one routing call.
pub fn priority_order(settings: &ProviderSettings, preferred: Option<ProviderId>) -> Vec<ProviderId> {
	let mut order = Vec::with_capacity(DEFAULT_PRIORITY.len());
	let preferred = preferred.or(settings.preferred);

	if let Some(id) = preferred {
		if settings.is_enabled(id) {
			order.push(id);
		}
	}
	for id in DEFAULT_PRIORITY {
		if settings.is_enabled(id) && !order.contains(&id) {
			order.push(id);
		}
	}
	order
}

impl Engine {
	/// Dispatches to the best available provider.
	///
	/// The enabled set is re-read from the settings source on every
	/// call. Fails only once every candidate is exhausted, with one
	/// aggregate error naming each per-provider cause.
	pub async fn route_smart(&self, message: &str, preferred: Option<ProviderId>) -> Result<RouteOutcome> {
		let settings = self.settings().snapshot()?;
		let order = priority_order(&settings, preferred);
		if order.is_empty() {
			return Err(Error::NoProvidersEnabled);
		}

		tracing::debug!(target = "px.router", ?order, "routing");

		let mut failures = Vec::new();
		for provider_id in order {
			let mut last_cause = String::new();
			for attempt in 1..=ATTEMPTS_PER_PROVIDER {
				match self.dispatch(provider_id, message).await {
					Ok(reply) => {
						let mut stats = self.stats_mut();
						let entry = stats.providers.entry(provider_id).or_default();
						entry.successes += 1;
						entry.total_elapsed_ms += reply.elapsed_ms;
						return Ok(RouteOutcome {
							provider_id,
							text: reply.text,
							attempts: attempt,
						});
					}
					Err(e) => {
						tracing::warn!(
							target = "px.router",
							provider = %provider_id,
							attempt,
							error = %e,
							"dispatch attempt failed"
						);
						last_cause = e.to_string();
						if attempt < ATTEMPTS_PER_PROVIDER {
							tokio::time::sleep(RETRY_DELAY).await;
						}
					}
				}
			}

			self.stats_mut().providers.entry(provider_id).or_default().failures += 1;
			failures.push(ProviderFailure {
				provider_id,
				attempts: ATTEMPTS_PER_PROVIDER,
				cause: last_cause,
			});
		}

		Err(Error::AllProvidersFailed { failures })
	}
}
