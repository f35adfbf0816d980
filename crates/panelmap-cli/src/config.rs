//! Configuration loading

use anyhow::Result;
use panelmap_core::loader::bundled_definitions_path;
use panelmap_core::MappingPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mappings: MappingsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingsConfig {
    /// Built-in definitions root (generic files, `devices/`, derivation rules)
    #[serde(default = "default_builtin_path")]
    pub builtin_path: PathBuf,
    /// User mappings root, overridden by `PANELMAP_USER_MAPPINGS_PATH`
    #[serde(default = "default_user_path")]
    pub user_path: PathBuf,
}

impl Default for MappingsConfig {
    fn default() -> Self {
        Self {
            builtin_path: default_builtin_path(),
            user_path: default_user_path(),
        }
    }
}

fn default_builtin_path() -> PathBuf {
    bundled_definitions_path()
}

fn default_user_path() -> PathBuf {
    PathBuf::from("./var/data/panelmap/mappings")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Mapping tier roots, with the environment override applied
    pub fn mapping_paths(&self) -> MappingPaths {
        MappingPaths::from_env(&self.mappings.builtin_path, &self.mappings.user_path)
    }
}

/// Load configuration from file, defaults when it does not exist
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("panelmap.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.mappings.builtin_path, bundled_definitions_path());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("panelmap.toml");
        std::fs::write(
            &path,
            r#"
[mappings]
user_path = "/etc/panelmap/mappings"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.mappings.user_path, PathBuf::from("/etc/panelmap/mappings"));
        assert_eq!(config.mappings.builtin_path, bundled_definitions_path());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_saved_default_config_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("panelmap.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.mappings.user_path, default_user_path());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("panelmap.toml");
        std::fs::write(&path, "[logging\nlevel = 3").unwrap();
        assert!(load_config(&path).is_err());
    }
}
