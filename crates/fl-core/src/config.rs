//! Log configuration
//!
//! Loaded from a JSON file; every field has a default so an empty object is a
//! valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::filter::{EventTypeTag, LogFilter, MiscTag, SourceTag};

/// Default length of a tab title in the tab selector.
pub const DEFAULT_MAX_TAB_TITLE_LEN: usize = 60;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration of the background log and of a log view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Initial state of the preserve-log flag.
    pub preserve_log: bool,
    /// Per-tab event cap. `None` keeps every event until the tab is cleared.
    pub max_events_per_tab: Option<usize>,
    pub search: String,
    pub disabled_types: Vec<EventTypeTag>,
    pub disabled_misc: Vec<MiscTag>,
    pub disabled_sources: Vec<SourceTag>,
    pub max_tab_title_len: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            preserve_log: false,
            max_events_per_tab: None,
            search: String::new(),
            disabled_types: Vec::new(),
            disabled_misc: Vec::new(),
            disabled_sources: Vec::new(),
            max_tab_title_len: DEFAULT_MAX_TAB_TITLE_LEN,
        }
    }
}

impl LogConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Initial filter state described by this configuration.
    pub fn initial_filter(&self) -> LogFilter {
        let mut filter = LogFilter {
            search: self.search.clone(),
            ..Default::default()
        };
        for &tag in &self.disabled_types {
            filter.event_types.set_enabled(tag, false);
        }
        for &tag in &self.disabled_misc {
            filter.misc.set_enabled(tag, false);
        }
        for &tag in &self.disabled_sources {
            filter.sources.set_enabled(tag, false);
        }
        filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = LogConfig::from_json("{}").unwrap();
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.max_tab_title_len, 60);
        assert_eq!(config.max_events_per_tab, None);
    }

    #[test]
    fn test_initial_filter() {
        let config = LogConfig::from_json(
            r#"{
                "preserve_log": true,
                "search": "ads",
                "disabled_types": ["image", "media"],
                "disabled_sources": ["first_party"]
            }"#,
        )
        .unwrap();
        assert!(config.preserve_log);

        let filter = config.initial_filter();
        assert_eq!(filter.search, "ads");
        assert!(!filter.event_types.is_enabled(EventTypeTag::Image));
        assert!(filter.event_types.is_enabled(EventTypeTag::JavaScript));
        assert!(filter.misc.is_vacuous());
        assert!(!filter.sources.is_enabled(SourceTag::FirstParty));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            LogConfig::from_json("{\"preserve_log\": 3}"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            LogConfig::load("/nonexistent/fl-config.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
