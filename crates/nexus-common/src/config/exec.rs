//! Execution configuration.
//!
//! Loaded from TOML by the embedding service; every field has a default so an
//! empty document is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_POOL_INITIAL_CHUNK_SIZE, DEFAULT_POOL_MAX_CHUNK_SIZE,
    MAX_BATCH_SIZE, MIN_BATCH_SIZE,
};
use crate::error::{ExecError, ExecResult};

/// Per-query execution configuration.
///
/// # Example
///
/// ```rust
/// use nexus_common::config::ExecConfig;
///
/// let config = ExecConfig::from_toml_str("batch_size = 256").unwrap();
/// assert_eq!(config.batch_size, 256);
/// assert!(config.mem_limit_bytes.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Capacity, in rows, of every row batch an operator allocates.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Query-wide memory limit. Unlimited when absent.
    #[serde(default)]
    pub mem_limit_bytes: Option<u64>,

    /// First chunk size of a batch's variable-length data arena.
    #[serde(default = "default_pool_initial_chunk_size")]
    pub pool_initial_chunk_size: usize,

    /// Largest regular chunk size of a batch's arena.
    #[serde(default = "default_pool_max_chunk_size")]
    pub pool_max_chunk_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_pool_initial_chunk_size() -> usize {
    DEFAULT_POOL_INITIAL_CHUNK_SIZE
}

fn default_pool_max_chunk_size() -> usize {
    DEFAULT_POOL_MAX_CHUNK_SIZE
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            mem_limit_bytes: None,
            pool_initial_chunk_size: default_pool_initial_chunk_size(),
            pool_max_chunk_size: default_pool_max_chunk_size(),
        }
    }
}

impl ExecConfig {
    /// Creates a configuration with the given batch size.
    #[must_use]
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Default::default()
        }
    }

    /// Sets the query memory limit.
    #[must_use]
    pub fn mem_limit(mut self, bytes: u64) -> Self {
        self.mem_limit_bytes = Some(bytes);
        self
    }

    /// Parses and validates a configuration from TOML.
    pub fn from_toml_str(content: &str) -> ExecResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ExecError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ExecResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml(&self) -> ExecResult<String> {
        toml::to_string_pretty(self).map_err(|e| ExecError::invalid_config(e.to_string()))
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> ExecResult<()> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(ExecError::invalid_config(format!(
                "batch_size must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }

        if self.pool_initial_chunk_size == 0 {
            return Err(ExecError::invalid_config(
                "pool_initial_chunk_size must be greater than 0",
            ));
        }

        if self.pool_max_chunk_size < self.pool_initial_chunk_size {
            return Err(ExecError::invalid_config(
                "pool_max_chunk_size must be at least pool_initial_chunk_size",
            ));
        }

        if self.mem_limit_bytes == Some(0) {
            return Err(ExecError::invalid_config("mem_limit_bytes must be non-zero"));
        }

        Ok(())
    }
}
