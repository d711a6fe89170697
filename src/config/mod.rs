use crate::models::ScanConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Configuration manager for loading and saving the YAML scan configuration.
///
/// Manages a single file, `swepscan.yaml`, inside the configuration
/// directory. A missing file yields the built-in defaults and is written
/// back out so the user has something to edit.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join("swepscan.yaml"),
        })
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Load the scan configuration, or defaults when the file is absent.
    pub fn load(&self) -> Result<ScanConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            let config = ScanConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: ScanConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the scan configuration.
    pub fn save(&self, config: &ScanConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, ConfigManager) {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::new(Utf8Path::from_path(dir.path()).unwrap().join("data")).unwrap();
        (dir, manager)
    }

    #[test]
    fn test_creates_config_directory() {
        let (_dir, manager) = manager();
        assert!(manager.config_path().parent().unwrap().is_dir());
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let (_dir, manager) = manager();
        let config = manager.load().unwrap();
        assert_eq!(config, ScanConfig::default());
        assert!(manager.config_path().is_file());
    }

    #[test]
    fn test_save_and_reload() {
        let (_dir, manager) = manager();
        let mut config = ScanConfig::default();
        config.scan_root = "/games/GarrysMod".to_string();
        config.worker_threads = 2;

        manager.save(&config).unwrap();
        let reloaded = manager.load().unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let (_dir, manager) = manager();
        fs::write(manager.config_path(), "scan_root: [not, a, string").unwrap();
        assert!(manager.load().is_err());
    }
}
