use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as RConfig, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::constants::{
    ACCEPTED_CONTENT_TYPE, ARCHIVE_DATA_PREFIX, DEFAULT_DATABASE_MAX_CONNECTIONS,
    DEFAULT_DATABASE_URL, DEFAULT_DEDUPE_WINDOW_SECS, DEFAULT_LOG_LEVEL, DEFAULT_MAX_WORKERS,
    ENV_PREFIX,
};
use crate::dedupe::window_from_secs;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Upper bound on announcements processed at the same time.
    pub max_workers: usize,

    pub accepted_content_type: String,
    pub archive_data_prefix: String,

    /// `0` turns duplicate suppression off for single-blob payloads.
    pub dedupe_window_secs: u64,
    /// `0` turns duplicate suppression off for archive payloads.
    pub archive_dedupe_window_secs: u64,
    pub serialize_by_linking_hash: bool,

    pub log_level: String,
    #[serde(default)]
    pub log_dir: Option<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the optional TOML file, then `INVENTORY_*` environment variables.
    pub fn load_config(path: Option<&Path>) -> Result<Config> {
        let mut builder = RConfig::builder();

        // set defaults
        builder = builder
            .set_default("database_url", DEFAULT_DATABASE_URL)?
            .set_default("database_max_connections", DEFAULT_DATABASE_MAX_CONNECTIONS as u64)?
            .set_default("max_workers", DEFAULT_MAX_WORKERS as u64)?
            .set_default("accepted_content_type", ACCEPTED_CONTENT_TYPE)?
            .set_default("archive_data_prefix", ARCHIVE_DATA_PREFIX)?
            .set_default("dedupe_window_secs", DEFAULT_DEDUPE_WINDOW_SECS)?
            .set_default("archive_dedupe_window_secs", DEFAULT_DEDUPE_WINDOW_SECS)?
            .set_default("serialize_by_linking_hash", true)?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: Config = builder
            .build()
            .context("failed to read config sources")?
            .try_deserialize()
            .context("failed to parse config")?;

        if config.max_workers == 0 {
            anyhow::bail!("max_workers must be at least 1");
        }
        for (key, secs) in [
            ("dedupe_window_secs", config.dedupe_window_secs),
            ("archive_dedupe_window_secs", config.archive_dedupe_window_secs),
        ] {
            if window_from_secs(secs).is_none() {
                anyhow::bail!("{} is out of range: {}", key, secs);
            }
        }

        Ok(config)
    }
}
