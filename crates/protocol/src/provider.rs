//! Provider identifiers.

use serde::{Deserialize, Serialize};

/// One of the supported third-party AI chat web applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
	ChatGpt,
	Claude,
	Gemini,
	Perplexity,
}

impl ProviderId {
	/// All known providers, in the default routing priority order.
	pub const ALL: [ProviderId; 4] = [
		ProviderId::ChatGpt,
		ProviderId::Claude,
		ProviderId::Gemini,
		ProviderId::Perplexity,
	];

	/// Stable lowercase name used on the wire and in configuration.
	pub fn as_str(&self) -> &'static str {
		match self {
			ProviderId::ChatGpt => "chatgpt",
			ProviderId::Claude => "claude",
			ProviderId::Gemini => "gemini",
			ProviderId::Perplexity => "perplexity",
		}
	}
}

impl std::fmt::Display for ProviderId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unknown provider name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProviderIdError(pub String);

impl std::fmt::Display for ParseProviderIdError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "unknown provider: {}", self.0)
	}
}

impl std::error::Error for ParseProviderIdError {}

impl std::str::FromStr for ProviderId {
	type Err = ParseProviderIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"chatgpt" | "gpt" => Ok(ProviderId::ChatGpt),
			"claude" => Ok(ProviderId::Claude),
			"gemini" => Ok(ProviderId::Gemini),
			"perplexity" => Ok(ProviderId::Perplexity),
			other => Err(ParseProviderIdError(other.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_provider_id_round_trip() {
		for provider in ProviderId::ALL {
			let parsed: ProviderId = provider.as_str().parse().unwrap();
			assert_eq!(parsed, provider);
		}
	}

	#[test]
	fn test_provider_id_serde_lowercase() {
		let json = serde_json::to_string(&ProviderId::ChatGpt).unwrap();
		assert_eq!(json, r#""chatgpt""#);
		let back: ProviderId = serde_json::from_str(r#""perplexity""#).unwrap();
		assert_eq!(back, ProviderId::Perplexity);
	}

	#[test]
	fn test_unknown_provider_rejected() {
		let err = "copilot".parse::<ProviderId>().unwrap_err();
		assert_eq!(err.0, "copilot");
	}
}
