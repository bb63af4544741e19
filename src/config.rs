//! # Configuration Management
//!
//! This module handles loading and managing configuration for the chain
//! cache endpoint and its clients. Configuration is loaded from TOML files
//! and includes settings for:
//! - Network binding (host/port)
//! - The store aliases the endpoint serves
//! - Frame-size limits
//! - Client request deadlines and the compaction trigger
//!
//! ## Example Configuration File (config.toml)
//! ```toml
//! host = "127.0.0.1"
//! port = 7879
//! stores = ["cache-a", "cache-b"]
//! max_frame_bytes = 8388608
//!
//! [client]
//! request_timeout_ms = 5000
//! compaction_threshold = 8
//! ```

use anyhow::Result;
use config::{Config as ConfigLib, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Client-side tuning shared by proxies built from this configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Deadline for one network round-trip, in milliseconds. A mutating
    /// call that exceeds it has an unknown outcome.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Chain length at which a proxy proposes head compaction. Zero
    /// disables the advisory entirely.
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,
}

impl ClientConfig {
    /// The request deadline as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            compaction_threshold: default_compaction_threshold(),
        }
    }
}

/// Main configuration structure for the chain cache endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// IP address to bind the TCP server to (e.g., "127.0.0.1" or "0.0.0.0")
    pub host: String,

    /// Port number for the TCP server to listen on (e.g., 7879)
    pub port: u16,

    /// Store aliases this endpoint serves. Requests naming any other alias
    /// fail with the store-unavailable status.
    #[serde(default)]
    pub stores: Vec<String>,

    /// Upper bound on a single request or response frame, in bytes
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Tuning for proxies built from this configuration
    #[serde(default)]
    pub client: ClientConfig,
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_compaction_threshold() -> usize {
    8
}

fn default_max_frame_bytes() -> usize {
    8 * 1024 * 1024
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Result<Config>` - Parsed configuration or error if file is invalid
    pub fn load(path: &Path) -> Result<Self> {
        let settings = ConfigLib::builder().add_source(File::from(path)).build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }
}

impl Default for Config {
    /// Defaults suitable for development and testing: localhost:7879, one
    /// store alias "cache", 8 MiB frames, 5 s deadline, compaction at 8.
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7879,
            stores: vec!["cache".to_string()],
            max_frame_bytes: default_max_frame_bytes(),
            client: ClientConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_config_load() {
        let mut temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            temp_file.as_file_mut(),
            r#"
host = "0.0.0.0"
port = 9000
stores = ["users", "sessions"]

[client]
request_timeout_ms = 250
compaction_threshold = 4
            "#
        )
        .unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.stores, vec!["users", "sessions"]);
        assert_eq!(config.max_frame_bytes, 8 * 1024 * 1024);
        assert_eq!(config.client.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.client.compaction_threshold, 4);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7879);
        assert_eq!(config.stores, vec!["cache"]);
        assert_eq!(config.client.request_timeout_ms, 5_000);
        assert_eq!(config.client.compaction_threshold, 8);
    }
}
