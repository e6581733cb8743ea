//! Server configuration.
//!
//! Read once from the client's `initializationOptions`. Every field is
//! optional; missing or malformed options fall back to defaults.

use serde::Deserialize;
use std::num::NonZeroUsize;

/// Language ids accepted on `didOpen` unless configured otherwise.
pub const DEFAULT_LANGUAGE_IDS: &[&str] = &["java", "text/java", "jml"];

/// `source` attached to every published diagnostic.
pub const DEFAULT_DIAGNOSTIC_SOURCE: &str = "jmlparser";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JmlConfig {
    /// Documents opened with any other language id are ignored.
    pub language_ids: Vec<String>,
    pub diagnostic_source: String,
    /// Upper bound on parses running at once. `None` uses the number of CPUs.
    pub max_parallel_parses: Option<usize>,
    /// Drop cached parse results when a document is closed.
    pub evict_on_close: bool,
    /// Send a `window/logMessage` to the client after each successful parse.
    pub log_parses: bool,
}

impl Default for JmlConfig {
    fn default() -> Self {
        Self {
            language_ids: DEFAULT_LANGUAGE_IDS.iter().map(|s| (*s).to_string()).collect(),
            diagnostic_source: DEFAULT_DIAGNOSTIC_SOURCE.to_string(),
            max_parallel_parses: None,
            evict_on_close: true,
            log_parses: true,
        }
    }
}

impl JmlConfig {
    /// Builds the configuration from `initializationOptions`.
    pub fn from_initialization_options(options: Option<serde_json::Value>) -> Self {
        let Some(options) = options else {
            return Self::default();
        };

        match serde_json::from_value::<Self>(options) {
            Ok(config) => {
                tracing::debug!("loaded configuration: {:?}", config);
                config
            }
            Err(e) => {
                tracing::warn!("invalid initializationOptions, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn accepts_language(&self, language_id: &str) -> bool {
        self.language_ids.iter().any(|id| id == language_id)
    }

    /// Number of parse workers, at least one.
    pub fn parallelism(&self) -> usize {
        self.max_parallel_parses
            .filter(|n| *n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
            })
    }
}
