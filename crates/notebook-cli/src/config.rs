//! Configuration loading for the CLI.

use std::path::Path;

use anyhow::{Context, Result};
use notebook_core::Config;

pub const CONFIG_FILE: &str = "config.json";

/// Load `config.json` from `config_dir`.
///
/// When the file does not exist, defaults are used and written out for
/// reference.
pub fn load_config(config_dir: &Path) -> Result<Config> {
    let config_file = config_dir.join(CONFIG_FILE);

    if config_file.exists() {
        let content = std::fs::read_to_string(&config_file)
            .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", config_file))?;
        tracing::info!("Loaded configuration from {:?}", config_file);
        return Ok(config);
    }

    tracing::info!("No config file found at {:?}, using defaults", config_file);
    let config = Config::default();

    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

    let content = serde_json::to_string_pretty(&config)?;
    std::fs::write(&config_file, content)
        .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
    tracing::info!("Created default config at {:?}", config_file);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("conf");

        let config = load_config(&nested).unwrap();

        assert_eq!(config, Config::default());
        assert!(nested.join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_existing_config_is_read() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"notebook":{"root_name":"Inbox"}}"#,
        )
        .unwrap();

        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.notebook.root_name, "Inbox");
        assert_eq!(config.sync.max_attempts, 3);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "not json").unwrap();

        let err = load_config(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
