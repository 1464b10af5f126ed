use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: home.join(".tunelib"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub auto_start: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { auto_start: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name the client identifies itself with in daemon logs.
    pub name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "tunelib-cli".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Width of the status line in columns.
    pub width: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { width: 60 }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tunelib")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
            Self::parse(&content)
        } else {
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse config file")
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.storage.path
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage.path.join("tunelib.db")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.storage.path.join("tunelib.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.storage.path.join("tunelib.pid")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.data_dir()).with_context(|| {
            format!(
                "Failed to create data directory: {}",
                self.data_dir().display()
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::parse(
            r#"
            [storage]
            path = "/tmp/tunes"

            [display]
            width = 80
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path(), PathBuf::from("/tmp/tunes/tunelib.db"));
        assert_eq!(config.display.width, 80);
        assert!(config.daemon.auto_start);
        assert_eq!(config.client.name, "tunelib-cli");
    }

    #[test]
    fn test_invalid_config() {
        assert!(Config::parse("[daemon]\nauto_start = \"sometimes\"").is_err());
    }
}
