use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dispatch::ScramblePolicy;

/// Top-level configuration for the metascramble library.
///
/// Controls the scramble policy (strip vs fabricate, GPS, recompression,
/// validation) and output behavior (dry run, backups, output naming).
///
/// # Loading
///
/// ```rust,no_run
/// use metascramble::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.policy.strip_only = true;
/// config.output.in_place = false;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// What the scramble operation does to each file.
    pub policy: ScramblePolicy,
    /// Output behavior (dry run, backups, output naming, audit log).
    pub output: OutputConfig,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// If `true`, preview what would be done without writing any files.
    pub dry_run: bool,
    /// If `true`, overwrite the input file; otherwise write a suffixed
    /// sibling file.
    pub in_place: bool,
    /// If `true`, create a `.bak` backup before overwriting in place.
    pub backup_originals: bool,
    /// Filename suffix for sibling output (`photo.jpg` →
    /// `photo.scrambled.jpg`).
    pub suffix: String,
    /// If `true`, set the output file's modification/access times to the
    /// fabricated timestamp.
    pub touch_file_times: bool,
    /// Optional path to an append-only audit log file.
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: ScramblePolicy::default(),
            output: OutputConfig {
                dry_run: false,
                in_place: false,
                backup_originals: true,
                suffix: "scrambled".to_string(),
                touch_file_times: false,
                log_file: None,
            },
        }
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_policy_fabricates_with_gps() {
        let config = Config::default();
        assert!(!config.policy.strip_only);
        assert!(config.policy.add_fake_gps);
        assert!(config.policy.validate_output);
        assert_eq!(config.policy.recompress_quality, None);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.policy.strip_only = true;
        config.policy.recompress_quality = Some(85);
        config.output.suffix = "clean".to_string();
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert!(loaded.policy.strip_only);
        assert_eq!(loaded.policy.recompress_quality, Some(85));
        assert_eq!(loaded.output.suffix, "clean");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert!(!config.policy.strip_only);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
