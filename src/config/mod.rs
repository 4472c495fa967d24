use crate::models::{LoggingSettings, ScannerConfig};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Prefix of environment variables overriding the settings file,
/// e.g. `GOTI_SCANNER__HANDSHAKE_DELAY_MS=500`.
pub const ENV_PREFIX: &str = "GOTI";

const SETTINGS_FILE: &str = "Scanner Settings.yaml";

/// Configuration manager for the scanner settings file.
///
/// Loading layers the YAML file (optional) under `GOTI_*` environment
/// variables; saving writes the YAML file only.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files (e.g., "Goti Data")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Load the scanner configuration.
    ///
    /// # Returns
    /// The merged configuration; defaults fill anything neither the file nor
    /// the environment sets
    pub fn load_scanner_config(&self) -> Result<ScannerConfig> {
        self.load_with_env(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(&self, env: config::Environment) -> Result<ScannerConfig> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Scanner settings not found at {}, using defaults",
                self.settings_path
            );
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::new(self.settings_path.as_str(), config::FileFormat::Yaml).required(false),
            )
            .add_source(env.prefix_separator("_").separator("__").try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read scanner settings: {}", self.settings_path))?;

        let config: ScannerConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse scanner settings: {}", self.settings_path))?;

        tracing::info!("Loaded scanner settings from {}", self.settings_path);
        Ok(config)
    }

    /// Save the scanner configuration as YAML
    pub fn save_scanner_config(&self, config: &ScannerConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize scanner settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write scanner settings: {}", self.settings_path))?;

        tracing::info!("Saved scanner settings to {}", self.settings_path);
        Ok(())
    }

    /// Resolve a configured path relative to the configuration directory
    pub fn resolve(&self, path: &str) -> Utf8PathBuf {
        let path = Utf8Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Directory for rotating log files, relative to the configuration directory
    pub fn log_dir(&self, settings: &LoggingSettings) -> Utf8PathBuf {
        self.resolve(&settings.log_dir)
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Language;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    fn env_from(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        let config = manager.load_with_env(env_from(&[])).unwrap();

        assert_eq!(config.scanner.handshake_delay_ms, 1500);
        assert_eq!(config.ui.language, Language::Bn);
    }

    #[test]
    fn test_save_then_load() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut config = ScannerConfig::default();
        config.scanner.brand_marker = "acme".to_string();
        config.ui.language = Language::En;
        manager.save_scanner_config(&config).unwrap();

        let loaded = manager.load_with_env(env_from(&[])).unwrap();
        assert_eq!(loaded.scanner.brand_marker, "acme");
        assert_eq!(loaded.ui.language, Language::En);
    }

    #[test]
    fn test_environment_overrides_file() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(
            manager.settings_path(),
            "scanner:\n  handshake_delay_ms: 900\n  camera_torch: false\n",
        )
        .unwrap();

        let config = manager
            .load_with_env(env_from(&[
                ("GOTI_SCANNER__HANDSHAKE_DELAY_MS", "250"),
                ("GOTI_SCANNER__CAMERA_TORCH", "true"),
            ]))
            .unwrap();

        assert_eq!(config.scanner.handshake_delay_ms, 250);
        assert!(config.scanner.camera_torch);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.settings_path(), "scanner: [unclosed").unwrap();

        assert!(manager.load_with_env(env_from(&[])).is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let (manager, _temp_dir) = create_test_config_manager();

        assert_eq!(manager.resolve("camera"), manager.config_dir().join("camera"));
        assert_eq!(manager.resolve("/abs/feed"), Utf8PathBuf::from("/abs/feed"));
    }
}
