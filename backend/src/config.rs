//! Layered configuration: built-in defaults, an optional `config/ingest.{toml,yaml,json}`
//! file, then `LISTING_INGEST__SECTION__KEY` environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = "config/ingest";
const ENV_PREFIX: &str = "LISTING_INGEST";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub jobs: JobsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Upload ceiling enforced while the multipart stream is read.
    pub max_file_bytes: usize,
    /// Data rows accepted per file, header excluded.
    pub max_rows: usize,
    /// Width of the worker pool; further jobs stay `pending` until a slot frees up.
    pub max_concurrent_jobs: usize,
    /// Rows validated in parallel before being persisted in file order.
    pub chunk_size: usize,
    pub update_channel_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    pub timeout_secs: u64,
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl JobsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            ingest: IngestConfig {
                max_file_bytes: 10 * 1024 * 1024,
                max_rows: 1000,
                max_concurrent_jobs: 4,
                chunk_size: 250,
                update_channel_capacity: 1024,
            },
            jobs: JobsConfig {
                timeout_secs: 900,
                retention_secs: 86_400,
                sweep_interval_secs: 30,
            },
            storage: StorageConfig {
                database_path: PathBuf::from("listings.sqlite"),
            },
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.ingest.max_file_bytes == 0, "ingest.max_file_bytes must be positive"),
            (self.ingest.max_rows == 0, "ingest.max_rows must be positive"),
            (self.ingest.max_concurrent_jobs == 0, "ingest.max_concurrent_jobs must be positive"),
            (self.ingest.chunk_size == 0, "ingest.chunk_size must be positive"),
            (self.ingest.update_channel_capacity == 0, "ingest.update_channel_capacity must be positive"),
            (self.jobs.timeout_secs == 0, "jobs.timeout_secs must be positive"),
            (self.jobs.sweep_interval_secs == 0, "jobs.sweep_interval_secs must be positive"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }
}

pub fn load() -> Result<AppConfig, ConfigError> {
    load_from(CONFIG_FILE)
}

/// Loads configuration using `file` (without extension) as the optional file source.
pub fn load_from(file: &str) -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();
    let builder = Config::builder()
        .set_default("server.host", defaults.server.host.clone())?
        .set_default("server.port", i64::from(defaults.server.port))?
        .set_default("ingest.max_file_bytes", defaults.ingest.max_file_bytes as i64)?
        .set_default("ingest.max_rows", defaults.ingest.max_rows as i64)?
        .set_default("ingest.max_concurrent_jobs", defaults.ingest.max_concurrent_jobs as i64)?
        .set_default("ingest.chunk_size", defaults.ingest.chunk_size as i64)?
        .set_default(
            "ingest.update_channel_capacity",
            defaults.ingest.update_channel_capacity as i64,
        )?
        .set_default("jobs.timeout_secs", defaults.jobs.timeout_secs as i64)?
        .set_default("jobs.retention_secs", defaults.jobs.retention_secs as i64)?
        .set_default("jobs.sweep_interval_secs", defaults.jobs.sweep_interval_secs as i64)?
        .set_default(
            "storage.database_path",
            defaults.storage.database_path.to_string_lossy().to_string(),
        )?
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}
