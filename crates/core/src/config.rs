//! Client configuration
//!
//! Loaded from `hive.toml` in the platform config directory, or from an
//! explicit path. Every key is optional; a missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "hive.toml";

/// Port the relay listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 8081;

/// How many outgoing messages may await confirmation at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendPolicy {
    /// One pending send at a time; further sends are refused until it resolves
    #[default]
    Single,
    /// Any number in flight, each with its own deadline
    Concurrent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base HTTP(S) URL of the chat server
    pub server_url: String,
    /// Window for a sent message to be confirmed before the session is dropped
    pub send_timeout_ms: u64,
    /// Bound on the credential exchange and the socket handshake
    pub connect_timeout_ms: u64,
    /// How long a disconnect waits to observe the close
    pub close_timeout_ms: u64,
    pub send_policy: SendPolicy,
    /// Capacity of the client event channel
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://localhost:{}", DEFAULT_PORT),
            send_timeout_ms: 5000,
            connect_timeout_ms: 10_000,
            close_timeout_ms: 2000,
            send_policy: SendPolicy::Single,
            event_buffer: 64,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&content)
    }

    /// Load from the platform config directory
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "hive", "hive").ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;

        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "server_url must start with http:// or https://, got '{}'",
                self.server_url
            )));
        }
        if self.send_timeout_ms == 0 || self.connect_timeout_ms == 0 || self.close_timeout_ms == 0
        {
            return Err(Error::InvalidConfig("timeouts must be non-zero".into()));
        }
        if self.event_buffer == 0 {
            return Err(Error::InvalidConfig("event_buffer must be non-zero".into()));
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.send_timeout(), Duration::from_secs(5));
        assert_eq!(config.send_policy, SendPolicy::Single);
        assert_eq!(config.server_url, "http://localhost:8081");
        assert_eq!(DEFAULT_PORT, 8081);
    }

    #[test]
    fn test_partial_override() {
        let config = ClientConfig::from_toml(
            r#"
            server_url = "https://chat.example.com"
            send_timeout_ms = 250
            send_policy = "concurrent"
            "#,
        )
        .unwrap();

        assert_eq!(config.server_url, "https://chat.example.com");
        assert_eq!(config.send_timeout_ms, 250);
        assert_eq!(config.send_policy, SendPolicy::Concurrent);
        assert_eq!(config.event_buffer, 64);
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let result = ClientConfig::from_toml(r#"server_url = "ftp://nope""#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let result = ClientConfig::from_toml("send_timeout_ms = 0");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let result = ClientConfig::from_toml(r#"send_policy = "sometimes""#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "close_timeout_ms = 750\n").unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.close_timeout(), Duration::from_millis(750));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }
}
