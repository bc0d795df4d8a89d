use std::path::{Path, PathBuf};

use anyhow::Context;
use plate_file::PlateConfig;
use plate_snapshot::SnapshotConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SETTINGS_FILE: &str = "plate.toml";

/// Contents of a `plate.toml` settings file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub plate: PlateConfig,
    pub snapshot: SnapshotConfig,
}

impl Settings {
    /// Load the settings file named on the command line, or `./plate.toml`
    /// when it exists, or the defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path: PathBuf = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}
