//! Configuration for blobserver

use crate::gate::DEFAULT_GATE_LIMIT;
use crate::spool::DEFAULT_MAX_IN_MEMORY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum size of a single blob (128MB)
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 128 << 20;

/// Read ACL given to containers the server creates
pub const DEFAULT_CONTAINER_READ_ACL: &str = ".r:*,.rlistings";

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path prefix all routes are mounted under
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,

    /// Backend name as registered in the storage registry (swift, memory)
    #[serde(default = "default_storage")]
    pub storage: String,

    /// Maximum blob size in bytes
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,

    /// Bytes kept in memory per upload before spilling to disk
    #[serde(default = "default_max_in_memory")]
    pub max_in_memory: usize,

    /// Directory for spill files (system temp dir if unset)
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,

    /// Concurrent backend calls per stat/remove batch
    #[serde(default = "default_backend_concurrency")]
    pub backend_concurrency: usize,

    /// Create and verify every shard container at startup
    #[serde(default)]
    pub init_containers: bool,

    /// OpenStack Swift backend
    #[serde(default)]
    pub swift: Option<SwiftConfig>,

    /// In-process backend
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Swift connection and container layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwiftConfig {
    pub api_user: String,
    pub api_key: String,
    /// v1 auth endpoint, e.g. https://swift.example.com/auth/v1.0
    pub auth_url: String,
    /// Base container name; shards are `{container}-{shard}`
    pub container: String,
    #[serde(default = "default_container_read_acl")]
    pub container_read_acl: String,
    #[serde(default = "default_true")]
    pub shard: bool,
    /// Public base URL blobs are served from
    #[serde(default)]
    pub cdn_url: String,
}

/// Container layout for the in-process backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_container")]
    pub container: String,
    #[serde(default = "default_true")]
    pub shard: bool,
    #[serde(default)]
    pub cdn_url: String,
}

fn default_listen() -> String {
    "0.0.0.0:6064".to_string()
}

fn default_url_prefix() -> String {
    "/v1/api/blobserver".to_string()
}

fn default_storage() -> String {
    "swift".to_string()
}

fn default_max_blob_size() -> u64 {
    DEFAULT_MAX_BLOB_SIZE
}

fn default_max_in_memory() -> usize {
    DEFAULT_MAX_IN_MEMORY
}

fn default_backend_concurrency() -> usize {
    DEFAULT_GATE_LIMIT
}

fn default_container_read_acl() -> String {
    DEFAULT_CONTAINER_READ_ACL.to_string()
}

fn default_memory_container() -> String {
    "blobs".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            container: default_memory_container(),
            shard: true,
            cdn_url: String::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            url_prefix: default_url_prefix(),
            storage: default_storage(),
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
            max_in_memory: DEFAULT_MAX_IN_MEMORY,
            spool_dir: None,
            backend_concurrency: DEFAULT_GATE_LIMIT,
            init_containers: false,
            swift: None,
            memory: MemoryConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_swift_config() {
        let config: Config = toml::from_str(
            r#"
            listen = "127.0.0.1:7000"

            [swift]
            api_user = "user"
            api_key = "key"
            auth_url = "https://swift.example.com/auth/v1.0"
            container = "media"
            "#,
        )
        .unwrap();

        assert_eq!(config.listen, "127.0.0.1:7000");
        assert_eq!(config.storage, "swift");
        assert_eq!(config.max_blob_size, 128 << 20);
        let swift = config.swift.unwrap();
        assert_eq!(swift.container_read_acl, ".r:*,.rlistings");
        assert!(swift.shard);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.storage = "memory".to_string();
        config.backend_concurrency = 5;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.storage, "memory");
        assert_eq!(loaded.backend_concurrency, 5);
        assert_eq!(loaded.memory.container, "blobs");
    }
}
