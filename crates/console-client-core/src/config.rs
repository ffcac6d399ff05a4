use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::{self, AuthInputError, DEFAULT_CONSOLE_BASE_URL};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse console config: {0}")]
    Parse(String),
    #[error(transparent)]
    InvalidBaseUrl(#[from] AuthInputError),
}

/// Timing and bounds for one telemetry feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSettings {
    pub capacity: usize,
    pub poll_interval_ms: u64,
    pub flush_debounce_ms: u64,
}

impl FeedSettings {
    pub const fn requests() -> Self {
        Self {
            capacity: 100,
            poll_interval_ms: 3_000,
            flush_debounce_ms: 500,
        }
    }

    pub const fn debug() -> Self {
        Self {
            capacity: 5_000,
            poll_interval_ms: 2_000,
            flush_debounce_ms: 500,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }
}

/// Console client configuration, loaded from TOML.
///
/// Every key is optional. A feed table that is present must be complete,
/// since feed defaults differ per feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub unauthorized_debounce_ms: u64,
    pub request_feed: FeedSettings,
    pub debug_feed: FeedSettings,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CONSOLE_BASE_URL.to_string(),
            timeout_ms: 10_000,
            unauthorized_debounce_ms: 2_000,
            request_feed: FeedSettings::requests(),
            debug_feed: FeedSettings::debug(),
        }
    }
}

impl ConsoleConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|error| ConfigError::Parse(error.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Applies the base url override from the environment and validates the
    /// result. Returns the config together with the base url source.
    pub fn resolve(mut self) -> Result<(Self, &'static str), ConfigError> {
        let (base_url, source) = auth::resolve_console_base_url(Some(&self.base_url))?;
        self.base_url = base_url;
        Ok((self, source))
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn unauthorized_debounce(&self) -> Duration {
        Duration::from_millis(self.unauthorized_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ConsoleConfig::from_toml_str("").expect("empty config");
        assert_eq!(config, ConsoleConfig::default());
        assert_eq!(config.request_feed.capacity, 100);
        assert_eq!(config.debug_feed.capacity, 5_000);
        assert_eq!(config.unauthorized_debounce(), Duration::from_secs(2));
    }

    #[test]
    fn partial_document_overrides_named_keys() {
        let config = ConsoleConfig::from_toml_str(
            r#"
timeout_ms = 2500

[debug_feed]
capacity = 200
poll_interval_ms = 5000
flush_debounce_ms = 100
"#,
        )
        .expect("partial config");

        assert_eq!(config.timeout(), Duration::from_millis(2_500));
        assert_eq!(config.debug_feed.capacity, 200);
        assert_eq!(config.debug_feed.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.request_feed, FeedSettings::requests());
        assert_eq!(config.base_url, DEFAULT_CONSOLE_BASE_URL);
    }

    #[test]
    fn loads_from_file_and_reports_missing_files() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "unauthorized_debounce_ms = 750").expect("write config");

        let config = ConsoleConfig::from_toml_file(file.path()).expect("file config");
        assert_eq!(config.unauthorized_debounce_ms, 750);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            ConsoleConfig::from_toml_file(&missing),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        assert!(matches!(
            ConsoleConfig::from_toml_str("timeout_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
