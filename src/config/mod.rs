use crate::models::ClientConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the client configuration inside the config directory
pub const CONFIG_FILE_NAME: &str = "vision-insight.yaml";

/// Environment variable that overrides `api.base_url`
pub const API_URL_ENV: &str = "VISION_INSIGHT_API_URL";

/// Configuration manager for loading and saving the YAML configuration file.
///
/// Manages `vision-insight.yaml` in a configuration directory. A missing file means
/// defaults; a present file may leave out any section.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager for the specified configuration directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the configuration file.
    ///
    /// Returns defaults when the file doesn't exist. The result is validated, and
    /// `VISION_INSIGHT_API_URL` takes precedence over the file's `api.base_url`.
    pub fn load_config(&self) -> Result<ClientConfig> {
        self.load_config_with_override(std::env::var(API_URL_ENV).ok())
    }

    /// Load the configuration, preferring an explicit base URL (such as a command-line
    /// flag) over `VISION_INSIGHT_API_URL`
    pub fn load_config_preferring(&self, api_url: Option<String>) -> Result<ClientConfig> {
        match api_url {
            Some(url) => self.load_config_with_override(Some(url)),
            None => self.load_config(),
        }
    }

    /// Load the configuration with an explicit base URL override
    pub fn load_config_with_override(&self, api_url: Option<String>) -> Result<ClientConfig> {
        let mut config = self.read_file()?;

        if let Some(url) = api_url.filter(|url| !url.trim().is_empty()) {
            tracing::info!("Using API base URL override: {}", url);
            config.api.base_url = url;
        }

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", self.config_path))?;

        Ok(config)
    }

    fn read_file(&self) -> Result<ClientConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            return Ok(ClientConfig::default());
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        // An empty file deserializes to unit, not to a mapping
        if file_contents.trim().is_empty() {
            tracing::warn!("Config file {} is empty, using defaults", self.config_path);
            return Ok(ClientConfig::default());
        }

        let config: ClientConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file
    pub fn save_config(&self, config: &ClientConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        let config = manager.load_config_with_override(None).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_save_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut config = ClientConfig::default();
        config.api.base_url = "https://detector.example".to_string();
        config.camera.jpeg_quality = 75;
        manager.save_config(&config).unwrap();

        let loaded = manager.load_config_with_override(None).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_override_wins_over_file() {
        let (manager, _temp_dir) = create_test_config_manager();
        manager.save_config(&ClientConfig::default()).unwrap();

        let loaded = manager
            .load_config_with_override(Some("http://10.0.0.5:8080".to_string()))
            .unwrap();
        assert_eq!(loaded.api.base_url, "http://10.0.0.5:8080");
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let (manager, _temp_dir) = create_test_config_manager();

        let loaded = manager
            .load_config_with_override(Some("  ".to_string()))
            .unwrap();
        assert_eq!(loaded.api.base_url, "http://127.0.0.1:5000");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.config_path(), "api:\n  timeout_ms: 0\n").unwrap();

        let err = manager.load_config_with_override(None).unwrap_err();
        assert!(format!("{:#}", err).contains("timeout_ms"));
    }

    #[test]
    fn test_explicit_url_wins_over_environment() {
        let (manager, _temp_dir) = create_test_config_manager();

        // SAFETY: no other test in this binary reads or writes this variable
        unsafe { std::env::set_var(API_URL_ENV, "http://env.example:5000") };
        let from_env = manager.load_config_preferring(None);
        let explicit =
            manager.load_config_preferring(Some("http://cli.example:5000".to_string()));
        unsafe { std::env::remove_var(API_URL_ENV) };

        assert_eq!(from_env.unwrap().api.base_url, "http://env.example:5000");
        assert_eq!(explicit.unwrap().api.base_url, "http://cli.example:5000");
    }
}
