//! Configuration management for a replicated key-value node.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Component-wise validation
mod cluster;
mod monitoring;
mod raft;
mod storage;
pub use cluster::*;
pub use monitoring::*;
pub use raft::*;
pub use storage::*;

use std::env;
use std::fmt::Debug;
use std::path::Path;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Main configuration container for a node
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct RaftKvConfig {
    /// Node identity, addresses and data layout
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Consensus engine timing and snapshot policy
    #[serde(default)]
    pub raft: RaftConfig,
    /// Embedded engine tuning
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metrics exporter
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Debug for RaftKvConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RaftKvConfig")
            .field("cluster", &self.cluster)
            .field("raft", &self.raft)
            .field("storage", &self.storage)
            .field("monitoring", &self.monitoring)
            .finish()
    }
}

impl RaftKvConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `RAFT__` prefix (highest priority)
    ///
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/node.toml");
    /// std::env::set_var("RAFT__CLUSTER__HTTP_ADDRESS", "0.0.0.0:9901");
    /// let cfg = RaftKvConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.cluster.validate()?;
        self.raft.validate()?;
        self.storage.validate()?;
        self.monitoring.validate(&self.cluster.http_address)?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("RAFT")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    Error::Config(ConfigError::Message(msg.into()))
}

/// Ensures directory path is valid and writable
pub(super) fn validate_directory(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(invalid(format!("{name} path cannot be empty")));
    }

    #[cfg(not(test))]
    {
        use std::fs;
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                invalid(format!(
                    "Failed to create {} directory at {}: {}",
                    name,
                    path.display(),
                    e
                ))
            })?;
        }

        let test_file = path.join(".permission_test");
        fs::write(&test_file, b"test").map_err(|e| {
            invalid(format!(
                "No write permission in {} directory {}: {}",
                name,
                path.display(),
                e
            ))
        })?;
        fs::remove_file(&test_file).ok();
    }

    Ok(())
}
