// crates/laminark-server/src/config/file.rs
// File-based configuration from the data directory:
// config.json (engine settings) and topic-detection.json (shift detector tuning)

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Top-level config structure (config.json)
#[derive(Debug, Deserialize, Default)]
pub struct LaminarkConfig {
    #[serde(default)]
    pub curation: CurationConfig,
    #[serde(default)]
    pub debug_flow: DebugFlowConfig,
}

/// Curation agent configuration section
#[derive(Debug, Deserialize, Clone)]
pub struct CurationConfig {
    /// Master switch -- enabled by default for automatic data hygiene
    #[serde(default = "CurationConfig::default_enabled")]
    pub enabled: bool,
    /// Seconds between curation cycles
    #[serde(default = "CurationConfig::default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self { enabled: true, interval_secs: 300 }
    }
}

impl CurationConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_interval_secs() -> u64 {
        300
    }
}

/// Debug-path state machine configuration section
#[derive(Debug, Deserialize, Clone)]
pub struct DebugFlowConfig {
    /// Errors within the sliding window required to open a debug path
    #[serde(default = "DebugFlowConfig::default_errors_to_activate")]
    pub errors_to_activate: u32,
    /// Consecutive resolution signals required to close a path
    #[serde(default = "DebugFlowConfig::default_resolutions_to_close")]
    pub resolutions_to_close: u32,
}

impl Default for DebugFlowConfig {
    fn default() -> Self {
        Self { errors_to_activate: 3, resolutions_to_close: 3 }
    }
}

impl DebugFlowConfig {
    fn default_errors_to_activate() -> u32 {
        3
    }
    fn default_resolutions_to_close() -> u32 {
        3
    }
}

impl LaminarkConfig {
    /// Load config.json from the data directory; missing file yields defaults.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("config.json");
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Invalid config.json ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

/// Sensitivity preset for the adaptive topic-shift threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TopicPreset {
    Sensitive,
    #[default]
    Balanced,
    Relaxed,
}

impl TopicPreset {
    /// Sensitivity multiplier applied to the EWMA standard deviation
    pub fn multiplier(self) -> f64 {
        match self {
            TopicPreset::Sensitive => 1.0,
            TopicPreset::Balanced => 1.5,
            TopicPreset::Relaxed => 2.5,
        }
    }
}

/// Topic-shift detector configuration (topic-detection.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDetectionConfig {
    #[serde(default = "TopicDetectionConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub preset: TopicPreset,
    /// Manual threshold in [0.05, 0.95]; set to bypass adaptation entirely
    #[serde(default)]
    pub manual_threshold: Option<f64>,
    /// User override for the sensitivity multiplier (takes precedence over preset)
    #[serde(default)]
    pub sensitivity_override: Option<f64>,
}

impl Default for TopicDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: TopicPreset::default(),
            manual_threshold: None,
            sensitivity_override: None,
        }
    }
}

impl TopicDetectionConfig {
    fn default_enabled() -> bool {
        true
    }

    /// Load topic-detection.json from the data directory; missing file yields defaults.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("topic-detection.json");
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Invalid topic-detection.json ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Effective sensitivity multiplier (override wins over preset)
    pub fn sensitivity(&self) -> f64 {
        self.sensitivity_override.unwrap_or_else(|| self.preset.multiplier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_files_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = LaminarkConfig::load(dir.path());
        assert!(config.curation.enabled);
        assert_eq!(config.curation.interval_secs, 300);
        assert_eq!(config.debug_flow.errors_to_activate, 3);

        let topic = TopicDetectionConfig::load(dir.path());
        assert!(topic.enabled);
        assert_eq!(topic.preset, TopicPreset::Balanced);
    }

    #[test]
    fn invalid_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{not json").unwrap();
        let config = LaminarkConfig::load(dir.path());
        assert!(config.curation.enabled);
    }

    #[test]
    fn topic_config_parses_preset_and_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("topic-detection.json"),
            r#"{"enabled": true, "preset": "relaxed"}"#,
        )
        .unwrap();
        let topic = TopicDetectionConfig::load(dir.path());
        assert_eq!(topic.preset, TopicPreset::Relaxed);
        assert_eq!(topic.sensitivity(), 2.5);

        let with_override = TopicDetectionConfig {
            sensitivity_override: Some(2.0),
            ..topic
        };
        assert_eq!(with_override.sensitivity(), 2.0);
    }

    #[test]
    fn preset_multipliers() {
        assert_eq!(TopicPreset::Sensitive.multiplier(), 1.0);
        assert_eq!(TopicPreset::Balanced.multiplier(), 1.5);
        assert_eq!(TopicPreset::Relaxed.multiplier(), 2.5);
    }
}
