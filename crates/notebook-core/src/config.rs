//! Configuration for the notebook and its sync layer.
//!
//! Every field has a serde default so a partial `config.json` is valid.

use crate::retry::Backoff;
use serde::{Deserialize, Serialize};

pub const DEFAULT_COLOR: &str = "#6c757d";
pub const DEFAULT_ROOT_NAME: &str = "Uncategorized";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub notebook: NotebookConfig,
}

/// Identity hysteresis and retry tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long a lost identity is treated as transient (default: 3s)
    #[serde(default = "default_identity_grace_ms")]
    pub identity_grace_ms: u64,

    /// Attempts per remote call, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 500ms)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single retry delay (default: 8s)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,

    /// Per-attempt timeout; an expired attempt counts as a network failure (default: 10s)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            identity_grace_ms: default_identity_grace_ms(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: Backoff::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_identity_grace_ms() -> u64 {
    3000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookConfig {
    /// Color for top-level collections created without one
    #[serde(default = "default_color")]
    pub default_color: String,

    /// Display name of the root collection
    #[serde(default = "default_root_name")]
    pub root_name: String,

    /// Former root keys. Notes still pointing at one are moved to the root.
    #[serde(default = "default_legacy_root_keys")]
    pub legacy_root_keys: Vec<String>,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            default_color: default_color(),
            root_name: default_root_name(),
            legacy_root_keys: default_legacy_root_keys(),
        }
    }
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_root_name() -> String {
    DEFAULT_ROOT_NAME.to_string()
}

fn default_legacy_root_keys() -> Vec<String> {
    vec!["general".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.sync.backoff, Backoff::Exponential);
        assert_eq!(config.notebook.legacy_root_keys, vec!["general"]);
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{"sync":{"max_attempts":5,"backoff":"linear"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.sync.backoff, Backoff::Linear);
        assert_eq!(config.sync.base_delay_ms, 500);
        assert_eq!(config.notebook.root_name, "Uncategorized");
    }
}
