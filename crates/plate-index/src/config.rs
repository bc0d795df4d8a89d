use serde::{Deserialize, Serialize};

/// Tuning for a tile index and the blobs it hands out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Ceiling on the number of blobs in one platefile.
    pub max_blobs: u32,
    /// Soft per-blob size limit in bytes, counted in reserved write sizes.
    pub max_blob_size: u64,
    /// `fsync` the index journal after every entry.
    pub sync_journal: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_blobs: 8,
            max_blob_size: 2 * 1024 * 1024 * 1024, // 2 GiB
            sync_journal: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: IndexConfig = serde_json::from_str(r#"{ "max_blobs": 2 }"#).unwrap();
        assert_eq!(config.max_blobs, 2);
        assert_eq!(config.max_blob_size, IndexConfig::default().max_blob_size);
        assert!(!config.sync_journal);
    }
}
