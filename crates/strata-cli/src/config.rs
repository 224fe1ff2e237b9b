//! CLI configuration
//!
//! Settings come from a `strata.toml` file. Relative paths are resolved
//! against the working directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use strata_storage::DEFAULT_VERSION_TABLE;

/// Config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "strata.toml";

/// Per-user config file, used when the working directory has none
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("strata").join("config.toml"))
}

/// Configuration for the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database: PathBuf,
    /// Directory holding `NNN_name.sql` migration files
    pub migrations_dir: PathBuf,
    /// Table storing the current schema version
    pub version_table: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("strata.db"),
            migrations_dir: PathBuf::from("migrations"),
            version_table: DEFAULT_VERSION_TABLE.to_string(),
        }
    }
}

impl Config {
    /// Find the config file to use
    ///
    /// An explicit path always wins, even if it does not exist yet.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }

        user_config_path().filter(|path| path.is_file())
    }

    /// Load the config, falling back to defaults when no file is found
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        match Self::locate(explicit) {
            Some(path) => {
                let config = Self::load_from(&path)?;
                tracing::debug!("Loaded config from {:?}", path);
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn keys() -> &'static [&'static str] {
        &["database", "migrations_dir", "version_table"]
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "database" => Some(self.database.display().to_string()),
            "migrations_dir" => Some(self.migrations_dir.display().to_string()),
            "version_table" => Some(self.version_table.clone()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database" => self.database = PathBuf::from(value),
            "migrations_dir" => self.migrations_dir = PathBuf::from(value),
            "version_table" => {
                strata_core::database::validate_identifier(value)?;
                self.version_table = value.to_string();
            }
            _ => anyhow::bail!(
                "Unknown config key: {} (available: {})",
                key,
                Self::keys().join(", ")
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("database = \"data/app.db\"").unwrap();
        assert_eq!(config.database, PathBuf::from("data/app.db"));
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert_eq!(config.version_table, "schema_info");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("strata.toml");
        let config = Config {
            database: PathBuf::from("prod.db"),
            migrations_dir: PathBuf::from("db/migrations"),
            version_table: "app_version".to_string(),
        };

        config.save(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        let (loaded, source) = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(source, Some(path));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_get_and_set() {
        let mut config = Config::default();
        config.set("migrations_dir", "db/steps").unwrap();
        assert_eq!(config.get("migrations_dir").as_deref(), Some("db/steps"));

        assert!(config.set("version_table", "bad name").is_err());
        assert_eq!(config.version_table, "schema_info");

        assert!(config.set("colour", "blue").is_err());
        assert!(config.get("colour").is_none());
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        std::fs::write(&path, "database = [").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
