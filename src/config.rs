//! Application configuration: YAML file, then environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use audion_graph::IntegratorConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

pub const DEFAULT_UPDATE_BUFFER: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub json_logs: bool,
    /// Capacity of the panel update broadcast.
    pub update_buffer: usize,
    pub integrator: IntegratorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            update_buffer: DEFAULT_UPDATE_BUFFER,
            integrator: IntegratorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from the user config directory when no path is given and a file
    /// exists there. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!(target: "audion-session", "no config file; using defaults");
                    Self::default()
                }
            },
        };
        Ok(config.with_env_overrides())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(target: "audion-session", path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = env::var("AUDION_LOG_LEVEL") {
            let level = level.trim();
            if !level.is_empty() {
                self.log_level = level.to_string();
            }
        }
        if let Ok(value) = env::var("AUDION_JSON_LOGS") {
            let lower = value.trim().to_ascii_lowercase();
            self.json_logs = matches!(lower.as_str(), "1" | "true" | "yes" | "on");
        }
        self.integrator = self.integrator.with_env_overrides();
        self
    }
}

fn default_config_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push("audion");
    path.push("config.yaml");
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn yaml_overrides_nested_integrator_values() {
        let config = AppConfig::from_yaml(
            "log_level: debug\nintegrator:\n  realtime_enabled: false\n  debounce_ms: 32\n",
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(!config.integrator.realtime_enabled);
        assert_eq!(config.integrator.debounce_ms, 32);
        assert_eq!(config.integrator.realtime_interval_ms, 1_000);
        assert_eq!(config.update_buffer, DEFAULT_UPDATE_BUFFER);
    }

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(AppConfig::from_yaml("  \n").unwrap(), AppConfig::default());
    }

    #[test]
    fn explicit_path_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "update_buffer: 8\njson_logs: true").unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.update_buffer, 8);
        assert!(config.json_logs);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "update_buffer: [not a number").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse"));
    }
}
