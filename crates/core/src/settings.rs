//! Provider settings.
//!
//! The enabled-provider set is maintained outside the engine and
//! re-read at every decision point, never cached: flipping a provider
//! off must take effect on the next routing call, not the next restart.

use std::path::PathBuf;

use parking_lot::RwLock;
use proxima_protocol::ProviderId;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Externally-maintained routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
	/// Providers allowed to serve requests.
	pub enabled: Vec<ProviderId>,
	/// Default preferred provider; a per-call preference overrides it.
	#[serde(default)]
	pub preferred: Option<ProviderId>,
}

impl Default for ProviderSettings {
	fn default() -> Self {
		Self {
			enabled: ProviderId::ALL.to_vec(),
			preferred: None,
		}
	}
}

impl ProviderSettings {
	pub fn is_enabled(&self, id: ProviderId) -> bool {
		self.enabled.contains(&id)
	}
}

/// Source of [`ProviderSettings`], consulted at each decision point.
pub trait SettingsSource: Send + Sync {
	fn snapshot(&self) -> Result<ProviderSettings>;
}

/// In-memory settings, mutable at runtime. The default enables every
/// provider with no preference.
#[derive(Default)]
pub struct StaticSettings {
	inner: RwLock<ProviderSettings>,
}

impl StaticSettings {
	pub fn new(settings: ProviderSettings) -> Self {
		Self {
			inner: RwLock::new(settings),
		}
	}

	pub fn set(&self, settings: ProviderSettings) {
		*self.inner.write() = settings;
	}
}

impl SettingsSource for StaticSettings {
	fn snapshot(&self) -> Result<ProviderSettings> {
		Ok(self.inner.read().clone())
	}
}

/// JSON-file-backed settings, re-read on every snapshot so external
/// edits apply immediately.
pub struct FileSettings {
	path: PathBuf,
}

impl FileSettings {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl SettingsSource for FileSettings {
	fn snapshot(&self) -> Result<ProviderSettings> {
		let raw = std::fs::read_to_string(&self.path)
			.map_err(|e| Error::Settings(format!("{}: {e}", self.path.display())))?;
		serde_json::from_str(&raw).map_err(|e| Error::Settings(format!("{}: {e}", self.path.display())))
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn test_default_enables_everything() {
		let settings = ProviderSettings::default();
		for id in ProviderId::ALL {
			assert!(settings.is_enabled(id));
		}
		assert!(settings.preferred.is_none());
	}

	#[test]
	fn test_static_settings_update_applies_to_next_snapshot() {
		let source = StaticSettings::default();
		assert_eq!(source.snapshot().unwrap().enabled.len(), 4);

		source.set(ProviderSettings {
			enabled: vec![ProviderId::Gemini],
			preferred: Some(ProviderId::Gemini),
		});
		let snapshot = source.snapshot().unwrap();
		assert_eq!(snapshot.enabled, vec![ProviderId::Gemini]);
		assert_eq!(snapshot.preferred, Some(ProviderId::Gemini));
	}

	#[test]
	fn test_file_settings_reread_each_call() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, r#"{{"enabled": ["chatgpt", "claude"]}}"#).unwrap();
		file.flush().unwrap();

		let source = FileSettings::new(file.path());
		let snapshot = source.snapshot().unwrap();
		assert_eq!(snapshot.enabled, vec![ProviderId::ChatGpt, ProviderId::Claude]);

		std::fs::write(file.path(), r#"{"enabled": ["perplexity"], "preferred": "perplexity"}"#).unwrap();
		let snapshot = source.snapshot().unwrap();
		assert_eq!(snapshot.enabled, vec![ProviderId::Perplexity]);
		assert_eq!(snapshot.preferred, Some(ProviderId::Perplexity));
	}

	#[test]
	fn test_missing_file_is_a_settings_error() {
		let source = FileSettings::new("/nonexistent/providers.json");
		assert!(matches!(source.snapshot(), Err(Error::Settings(_))));
	}
}
