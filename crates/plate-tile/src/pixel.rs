use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TileError;

/// Channel layout of a tile. Every format carries alpha as its last
/// channel; 0 is fully transparent and 255 fully opaque.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    GrayA8,
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub const fn channels(&self) -> usize {
        match self {
            PixelFormat::GrayA8 => 2,
            PixelFormat::Rgba8 => 4,
        }
    }

    /// Offset of the alpha byte within a pixel.
    pub const fn alpha_index(&self) -> usize {
        self.channels() - 1
    }

    pub(crate) const fn tag(&self) -> u8 {
        match self {
            PixelFormat::GrayA8 => 1,
            PixelFormat::Rgba8 => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(PixelFormat::GrayA8),
            2 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::GrayA8 => "graya8",
            PixelFormat::Rgba8 => "rgba8",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "graya8" | "graya" => Ok(PixelFormat::GrayA8),
            "rgba8" | "rgba" => Ok(PixelFormat::Rgba8),
            other => Err(TileError::UnknownPixelFormat(other.to_string())),
        }
    }
}
