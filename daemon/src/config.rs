use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validate_enum;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub rotation: RotationSettings,

    #[serde(default)]
    pub platform: PlatformSettings,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Task server endpoints and credentials
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_tcp_address")]
    pub tcp_address: String,

    #[serde(default = "default_http_address")]
    pub http_address: String,

    #[serde(default)]
    pub secret: String,

    /// Seconds to wait before reconnecting after a network failure
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tcp_address: default_tcp_address(),
            http_address: default_http_address(),
            secret: String::new(),
            reconnect_interval: default_reconnect_interval(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_tcp_address() -> String {
    "localhost:8008".to_string()
}
fn default_http_address() -> String {
    "http://localhost:5000".to_string()
}
fn default_reconnect_interval() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}

/// Where downloaded and local wallpapers live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    #[serde(default = "default_storage_path")]
    pub path: String,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            extensions: default_extensions(),
        }
    }
}

fn default_storage_path() -> String {
    std::env::temp_dir().to_string_lossy().into_owned()
}
fn default_extensions() -> Vec<String> {
    vec!["jpg".to_string()]
}

/// Offline rotation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RotationSettings {
    #[serde(default = "default_offline_interval")]
    pub offline_interval: u64,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            offline_interval: default_offline_interval(),
        }
    }
}

fn default_offline_interval() -> u64 {
    30
}

/// Custom wallpaper command, `{path}` is replaced by the image path
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlatformSettings {
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub tcp_address: Option<String>,
    pub http_address: Option<String>,
    pub secret: Option<String>,
    pub storage_path: Option<String>,
    pub offline_interval: Option<u64>,
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("wallsync");

        Ok(config_dir.join("config.toml"))
    }

    /// Apply command-line values on top of the file, then re-validate.
    pub fn apply_overrides(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(tcp) = overrides.tcp_address {
            self.server.tcp_address = tcp;
        }
        if let Some(http) = overrides.http_address {
            self.server.http_address = http;
        }
        if let Some(secret) = overrides.secret {
            self.server.secret = secret;
        }
        if let Some(path) = overrides.storage_path {
            self.storage.path = path;
        }
        if let Some(timeout) = overrides.offline_interval {
            self.rotation.offline_interval = timeout;
        }

        self.validate()
    }

    /// Expand `~` and environment variables in the storage path and make it
    /// absolute. The directory must already exist.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.storage.path)
            .with_context(|| format!("Failed to expand storage path: {}", self.storage.path))?;

        let path = std::path::absolute(expanded.as_ref())
            .with_context(|| format!("Invalid storage path: {}", expanded))?;

        if !path.is_dir() {
            anyhow::bail!("Storage directory does not exist: {}", path.display());
        }

        Ok(path)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.server.reconnect_interval)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.server.connect_timeout)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.validate_log_level(&self.general.log_level)?;

        if self.server.tcp_address.trim().is_empty() {
            anyhow::bail!("TCP address must not be empty");
        }

        let http = &self.server.http_address;
        if !http.starts_with("http://") && !http.starts_with("https://") {
            anyhow::bail!("Invalid HTTP address: {} (expected http:// or https://)", http);
        }

        if self.server.reconnect_interval == 0 {
            anyhow::bail!("Reconnect interval must be at least 1 second");
        }
        if self.server.connect_timeout == 0 {
            anyhow::bail!("Connect timeout must be at least 1 second");
        }
        if self.rotation.offline_interval == 0 {
            anyhow::bail!("Offline interval must be at least 1 second");
        }

        if let Some(ref command) = self.platform.command
            && command.first().is_none_or(|program| program.trim().is_empty())
        {
            anyhow::bail!("Platform command must name a program");
        }

        Ok(())
    }

    fn validate_log_level(&self, level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.server.tcp_address, "localhost:8008");
        assert_eq!(config.server.http_address, "http://localhost:5000");
        assert_eq!(config.server.reconnect_interval, 30);
        assert_eq!(config.storage.extensions, vec!["jpg"]);
        assert_eq!(config.rotation.offline_interval, 30);
        assert!(config.platform.command.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let config = Config::default();
        assert!(config.validate_log_level("debug").is_ok());
        assert!(config.validate_log_level("verbose").is_err());
    }

    #[test]
    fn test_parse_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [server]
            tcp_address = "example.org:9000"
            secret = "hunter2"

            [storage]
            extensions = ["jpg", "png"]

            [platform]
            command = ["feh", "--bg-fill", "{path}"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.tcp_address, "example.org:9000");
        assert_eq!(config.server.http_address, "http://localhost:5000");
        assert_eq!(config.server.secret, "hunter2");
        assert_eq!(config.storage.extensions, vec!["jpg", "png"]);
        assert_eq!(config.rotation.offline_interval, 30);
        assert_eq!(
            config.platform.command.as_deref(),
            Some(&["feh".to_string(), "--bg-fill".to_string(), "{path}".to_string()][..])
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.server.http_address = "localhost:5000".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.tcp_address = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rotation.offline_interval = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.platform.command = Some(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = Config::default();
        config
            .apply_overrides(Overrides {
                tcp_address: Some("10.0.0.2:8008".to_string()),
                secret: Some("s3cret".to_string()),
                offline_interval: Some(5),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.server.tcp_address, "10.0.0.2:8008");
        assert_eq!(config.server.http_address, "http://localhost:5000");
        assert_eq!(config.server.secret, "s3cret");
        assert_eq!(config.rotation.offline_interval, 5);

        let result = config.apply_overrides(Overrides {
            http_address: Some("ftp://files".to_string()),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.tcp_address, "localhost:8008");
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\ntcp_address = 1").unwrap();
        assert!(Config::load_from_path(&path).is_err());

        fs::write(&path, "[general]\nlog_level = \"loud\"\n").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_storage_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();

        config.storage.path = dir.path().to_string_lossy().into_owned();
        assert_eq!(config.storage_dir().unwrap(), dir.path());

        config.storage.path = dir.path().join("missing").to_string_lossy().into_owned();
        assert!(config.storage_dir().is_err());
    }
}
