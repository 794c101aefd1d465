//! Configuration file of an arb node.
//!
//! Missing sections and fields fall back to their defaults, so an empty file is a valid config.

#![doc(issue_tracker_base_url = "https://github.com/paradigmxyz/reth/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use arb_sync::ArbSyncConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the arb node.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for peer sync.
    pub sync: ArbSyncConfig,
}

impl Config {
    /// Loads the config at `path`, writing the default config there if the file doesn't exist.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, confy::ConfyError> {
        confy::load_path(path)
    }

    /// Writes the config to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), confy::ConfyError> {
        confy::store_path(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use arb_sync::ArbSyncConfig;
    use std::time::Duration;

    const EXTENSION: &str = "toml";

    fn with_tempdir(filename: &str, proc: fn(&std::path::Path)) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join(filename).with_extension(EXTENSION);

        proc(&config_path);

        temp_dir.close().unwrap()
    }

    #[test]
    fn test_store_config() {
        with_tempdir("config-store-test", |config_path| {
            let config = Config::default();
            config.save(config_path).unwrap();
        })
    }

    #[test]
    fn test_load_config() {
        with_tempdir("config-load-test", |config_path| {
            let config = Config::default();
            config.save(config_path).unwrap();

            let loaded_config = Config::from_path(config_path).unwrap();
            assert_eq!(config, loaded_config);
        })
    }

    #[test]
    fn test_load_missing_config() {
        with_tempdir("config-missing-test", |config_path| {
            let loaded_config = Config::from_path(config_path).unwrap();
            assert_eq!(loaded_config, Config::default());
            assert!(config_path.exists());
        })
    }

    #[test]
    fn parse_partial_config() {
        let s = r#"
[sync]
block_sync_timeout = "10s"
"#;
        let config: Config = toml::from_str(s).unwrap();
        assert_eq!(
            config.sync,
            ArbSyncConfig::default().with_block_sync_timeout(Some(Duration::from_secs(10)))
        );

        let empty: Config = toml::from_str("").unwrap();
        assert_eq!(empty, Config::default());
    }
}
