use std::{fs, path::Path};

use serde::Deserialize;

use crate::{CouchflowError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// store config
    #[serde(default)]
    pub store: StoreConfig,
    /// number of async worker threads, range [1, 32768), defaults to 16
    #[serde(default = "default_worker_threads")]
    pub async_worker_thread_number: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// store type
    #[serde(default)]
    pub store_type: StoreType,
    /// couch config
    pub couch: Option<CouchConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Couch,
    Mem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouchConfig {
    /// request timeout in milliseconds, applied to every store call
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for CouchConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_worker_threads() -> u16 {
    16
}

fn default_request_timeout() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            async_worker_thread_number: default_worker_threads(),
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|err| CouchflowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), err)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        if config.async_worker_thread_number == 0 {
            return Err(CouchflowError::Config("async_worker_thread_number must be at least 1".to_string()));
        }
        Ok(config)
    }
}
