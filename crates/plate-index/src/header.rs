use std::fs;
use std::path::Path;

use plate_types::MAX_LEVEL;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};

/// Conventional metadata file name inside a platefile directory.
pub const HEADER_FILE: &str = "plate.json";

/// Platefile-wide metadata, fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader {
    /// Random identifier, used to address the platefile on an index service.
    pub platefile_id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Tile edge length in pixels.
    pub tile_size: u32,
    /// Default payload type for new tiles (e.g. `raw`).
    pub file_type: String,
    /// Pixel format tag of stored tiles (e.g. `rgba8`).
    pub pixel_format: String,
    /// Number of pyramid levels in use.
    pub num_levels: u8,
}

impl IndexHeader {
    /// New metadata with a freshly generated platefile id.
    pub fn new(
        name: impl Into<String>,
        tile_size: u32,
        file_type: impl Into<String>,
        pixel_format: impl Into<String>,
        num_levels: u8,
    ) -> Self {
        Self {
            platefile_id: rand::random(),
            name: name.into(),
            description: String::new(),
            tile_size,
            file_type: file_type.into(),
            pixel_format: pixel_format.into(),
            num_levels,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Load `plate.json` from a platefile directory.
    pub fn load(dir: &Path) -> IndexResult<Self> {
        let path = dir.join(HEADER_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            IndexError::InvalidPlatefile(format!("{}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| IndexError::InvalidPlatefile(format!("{}: {e}", path.display())))
    }

    /// Check that the pyramid depth is addressable: at least one level and
    /// no level deeper than [`MAX_LEVEL`].
    pub fn validate(&self) -> IndexResult<()> {
        let max = MAX_LEVEL + 1;
        if self.num_levels == 0 || self.num_levels > max {
            return Err(IndexError::PlatefileCreation(format!(
                "a platefile needs between 1 and {max} levels, got {}",
                self.num_levels
            )));
        }
        Ok(())
    }

    /// Write `plate.json` into a platefile directory.
    pub fn save(&self, dir: &Path) -> IndexResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| IndexError::Serialization(e.to_string()))?;
        fs::write(dir.join(HEADER_FILE), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let header = IndexHeader::new("mars", 256, "raw", "rgba8", 10).with_description("test mosaic");
        header.save(dir.path()).unwrap();
        assert_eq!(IndexHeader::load(dir.path()).unwrap(), header);
    }

    #[test]
    fn level_count_must_be_addressable() {
        assert!(IndexHeader::new("a", 4, "raw", "rgba8", 1).validate().is_ok());
        assert!(IndexHeader::new("a", 4, "raw", "rgba8", MAX_LEVEL + 1).validate().is_ok());
        for levels in [0, MAX_LEVEL + 2, 70] {
            assert!(matches!(
                IndexHeader::new("a", 4, "raw", "rgba8", levels).validate(),
                Err(IndexError::PlatefileCreation(_))
            ));
        }
    }

    #[test]
    fn missing_header_is_invalid_platefile() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            IndexHeader::load(dir.path()),
            Err(IndexError::InvalidPlatefile(_))
        ));
    }
}
