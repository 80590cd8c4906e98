//! Configuration loading and validation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub fleet: FleetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Serial device of the dispenser bus
    #[serde(default = "default_net_path")]
    pub net: String,
    /// Serial device of the Adam-4052 auxiliary input module
    #[serde(default = "default_adam_path")]
    pub adam: String,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            net: default_net_path(),
            adam: default_adam_path(),
        }
    }
}

fn default_net_path() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_adam_path() -> String {
    "/dev/ttyUSB1".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Pad the registry with mock dispensers up to this many positions
    /// after the initial scan
    #[serde(default)]
    pub mock_count: Option<usize>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "[channels]\nnet = \"/dev/ttyS3\"\nadam = \"/dev/ttyS4\"\n\n[fleet]\nmock_count = 12\n"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.channels.net, "/dev/ttyS3");
        assert_eq!(config.channels.adam, "/dev/ttyS4");
        assert_eq!(config.fleet.mock_count, Some(12));
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[channels]\nnet = \"/dev/ttyS3\"\n").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.channels.net, "/dev/ttyS3");
        assert_eq!(config.channels.adam, "/dev/ttyUSB1");
        assert_eq!(config.fleet.mock_count, None);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/carousel.toml")).unwrap();
        assert_eq!(config.channels.net, "/dev/ttyUSB0");
        assert_eq!(config.fleet.mock_count, None);
    }
}
