use std::fs;
use std::path::{Path, PathBuf};

use plate_index::IndexConfig;
use serde::{Deserialize, Serialize};

use crate::error::{PlateError, PlateResult};

/// Settings for opening and writing a platefile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateConfig {
    /// Where tile payloads are staged before being appended to a blob.
    /// Defaults to the system temporary directory.
    pub staging_dir: Option<PathBuf>,
    pub index: IndexConfig,
    pub queue: QueueConfig,
}

/// Sizing of the write work queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Tasks that may wait in the queue before `submit` blocks.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            capacity: 64,
        }
    }
}

impl PlateConfig {
    pub fn from_toml_str(content: &str) -> PlateResult<Self> {
        toml::from_str(content).map_err(|e| PlateError::Config(e.to_string()))
    }

    /// Load a config file.
    pub fn load(path: &Path) -> PlateResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> PlateResult<String> {
        toml::to_string_pretty(self).map_err(|e| PlateError::Config(e.to_string()))
    }
}
