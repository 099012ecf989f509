//! Server configuration
//!
//! Layered from, in increasing precedence: built-in defaults, a YAML file,
//! `SANDB__*` environment variables, and command line flags. Environment
//! keys use underscores where the file uses dashes, e.g.
//! `SANDB__MEMORY__MAX_DATA` for `memory.max-data`.

use anyhow::{bail, Context};
use config::{Config, Environment, File, FileFormat};
use sandb_core::cache::{CacheConfig, MaintenanceTrigger};
use sandb_core::storage::StorageConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yml";

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Seconds to read a request
    #[serde(alias = "ReadTimeout", alias = "readtimeout")]
    pub read_timeout: u64,
    /// Seconds to produce a response
    #[serde(alias = "WriteTimeout", alias = "writetimeout")]
    pub write_timeout: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_timeout: 10,
            write_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpConfig {
    pub port: u16,
    /// Required `Authorization` header value; empty disables auth
    pub token: Option<String>,
    pub timeout: TimeoutConfig,
    /// Seconds in-flight requests get to finish after a shutdown signal
    #[serde(alias = "shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            token: None,
            timeout: TimeoutConfig::default(),
            shutdown_timeout: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MemoryConfig {
    /// Maximum number of cached segments
    #[serde(alias = "max_data")]
    pub max_data: usize,
    /// Maximum cached payload, in MiB
    #[serde(alias = "max_size")]
    pub max_size: u64,
    /// Seconds between eviction passes; 0 evicts after every ingest
    #[serde(alias = "maintenance_interval")]
    pub maintenance_interval: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_data: sandb_core::config::MAX_CACHED_SEGMENTS,
            max_size: sandb_core::config::MAX_CACHED_BYTES / MIB,
            maintenance_interval: sandb_core::config::MAINTENANCE_INTERVAL.as_secs(),
        }
    }
}

/// Effective server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    pub server: HttpConfig,
    pub memory: MemoryConfig,
    #[serde(alias = "data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: HttpConfig::default(),
            memory: MemoryConfig::default(),
            data_dir: PathBuf::from(sandb_core::config::DATA_DIR),
        }
    }
}

impl ServerConfig {
    /// Load the file (if any) and environment on top of the defaults.
    ///
    /// An explicitly named file must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    bail!("config file not found: {}", path.display());
                }
                builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
            }
            None => {
                builder = builder.add_source(
                    File::new(DEFAULT_CONFIG_PATH, FileFormat::Yaml).required(false),
                );
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SANDB")
                .separator("__")
                .try_parsing(true)
                .ignore_empty(true),
        );

        let merged = builder.build().context("failed to read configuration")?;
        let config: ServerConfig = merged
            .try_deserialize()
            .context("invalid configuration")?;
        Ok(config)
    }

    /// Token required on every request, if auth is enabled
    pub fn auth_token(&self) -> Option<&str> {
        self.server.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Upper bound for reading a request and producing its response
    pub fn request_timeout(&self) -> Duration {
        let timeout = &self.server.timeout;
        Duration::from_secs(timeout.read_timeout.saturating_add(timeout.write_timeout).max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }

    pub fn storage(&self) -> StorageConfig {
        let trigger = match self.memory.maintenance_interval {
            0 => MaintenanceTrigger::AfterIngest,
            secs => MaintenanceTrigger::Interval(Duration::from_secs(secs)),
        };

        StorageConfig {
            data_dir: self.data_dir.clone(),
            cache: CacheConfig {
                max_entries: self.memory.max_data,
                max_bytes: self.memory.max_size.saturating_mul(MIB),
                trigger,
            },
        }
    }
}
