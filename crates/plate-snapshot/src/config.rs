use plate_tile::CompositeMode;
use serde::{Deserialize, Serialize};

use crate::error::{SnapshotError, SnapshotResult};

/// Default edge length, in cells, of one snapshot work unit.
pub const DEFAULT_WORK_UNIT_SIZE: u64 = 1024;

/// Tuning for a [`SnapshotManager`](crate::SnapshotManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Edge length of the square work units a region is split into.
    pub work_unit_size: u64,
    /// Decoded tiles kept per pass. Zero disables caching.
    pub cache_capacity: usize,
    /// Worker threads. One runs the units serially on the caller's thread.
    pub threads: usize,
    pub composite_mode: CompositeMode,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            work_unit_size: DEFAULT_WORK_UNIT_SIZE,
            cache_capacity: 256,
            threads: 1,
            composite_mode: CompositeMode::Draft,
        }
    }
}

impl SnapshotConfig {
    pub fn validate(&self) -> SnapshotResult<()> {
        if self.work_unit_size == 0 {
            return Err(SnapshotError::Config("work_unit_size must be positive".to_string()));
        }
        if self.threads == 0 {
            return Err(SnapshotError::Config("threads must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SnapshotConfig::default();
        assert_eq!(config.work_unit_size, 1024);
        assert_eq!(config.threads, 1);
        assert_eq!(config.composite_mode, CompositeMode::Draft);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_table_fills_defaults() {
        let config: SnapshotConfig = toml::from_str("threads = 8\ncomposite_mode = \"full\"").unwrap();
        assert_eq!(config.threads, 8);
        assert_eq!(config.composite_mode, CompositeMode::Full);
        assert_eq!(config.cache_capacity, 256);
    }

    #[test]
    fn zero_unit_rejected() {
        let config = SnapshotConfig {
            work_unit_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SnapshotError::Config(_))));
    }
}
