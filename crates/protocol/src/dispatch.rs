//! Dispatch, routing and fan-out result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;

/// Result of one send-and-capture cycle against a single provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReply {
	pub text: String,
	pub elapsed_ms: u64,
	/// Set by the file variant once the host acknowledged the attachment.
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub file_uploaded: bool,
}

/// Result of a smart-routed dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOutcome {
	/// Provider that produced the answer.
	pub provider_id: ProviderId,
	pub text: String,
	/// Attempt number that succeeded on that provider (1-based).
	pub attempts: u32,
}

/// Per-provider entry of a parallel fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum FanoutEntry {
	Ok { text: String },
	Err { error: String },
}

impl FanoutEntry {
	pub fn text(&self) -> Option<&str> {
		match self {
			FanoutEntry::Ok { text } => Some(text),
			FanoutEntry::Err { .. } => None,
		}
	}

	pub fn is_err(&self) -> bool {
		matches!(self, FanoutEntry::Err { .. })
	}
}

/// Full fan-out report: one entry and one timing per requested provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutReport {
	pub results: BTreeMap<ProviderId, FanoutEntry>,
	/// Per-provider elapsed milliseconds, success or not.
	pub timings: BTreeMap<ProviderId, u64>,
}

/// Success/failure counters and response-time totals for one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
	pub successes: u64,
	pub failures: u64,
	/// Sum of elapsed millis over successful dispatches.
	pub total_elapsed_ms: u64,
}

impl ProviderStats {
	/// Mean response time over successful dispatches, if any.
	pub fn average_elapsed_ms(&self) -> Option<u64> {
		(self.successes > 0).then(|| self.total_elapsed_ms / self.successes)
	}
}

/// Process-lifetime router statistics, reset only by explicit action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterStats {
	#[serde(flatten)]
	pub providers: BTreeMap<ProviderId, ProviderStats>,
}

impl RouterStats {
	pub fn provider(&self, id: ProviderId) -> ProviderStats {
		self.providers.get(&id).copied().unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fanout_entry_untagged_wire_shape() {
		let ok = FanoutEntry::Ok {
			text: "hello".to_string(),
		};
		assert_eq!(serde_json::to_value(&ok).unwrap(), serde_json::json!({ "text": "hello" }));

		let err = FanoutEntry::Err {
			error: "timed out".to_string(),
		};
		assert_eq!(serde_json::to_value(&err).unwrap(), serde_json::json!({ "error": "timed out" }));
	}

	#[test]
	fn test_average_elapsed_requires_successes() {
		let mut stats = ProviderStats::default();
		assert_eq!(stats.average_elapsed_ms(), None);

		stats.successes = 2;
		stats.total_elapsed_ms = 3000;
		assert_eq!(stats.average_elapsed_ms(), Some(1500));
	}

	#[test]
	fn test_dispatch_reply_omits_file_flag_when_false() {
		let reply = DispatchReply {
			text: "hi".to_string(),
			elapsed_ms: 12,
			file_uploaded: false,
		};
		let value = serde_json::to_value(&reply).unwrap();
		assert!(value.get("fileUploaded").is_none());
	}
}
