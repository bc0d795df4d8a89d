use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Half-open rectangle of cells `[x, x + width) × [y, y + height)` at a
/// single pyramid level.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRegion {
    pub x: u64,
    pub y: u64,
    pub width: u64,
    pub height: u64,
}

impl TileRegion {
    pub const fn new(x: u64, y: u64, width: u64, height: u64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole extent of a pyramid level.
    pub fn full_level(level: u8) -> Self {
        let extent = 1u64 << level;
        Self::new(0, 0, extent, extent)
    }

    /// Exclusive right edge, clamped to `u64::MAX`.
    pub fn max_x(&self) -> u64 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, clamped to `u64::MAX`.
    pub fn max_y(&self) -> u64 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of cells covered.
    pub fn area(&self) -> u64 {
        self.width.saturating_mul(self.height)
    }

    pub fn contains(&self, x: u64, y: u64) -> bool {
        x >= self.x && x < self.max_x() && y >= self.y && y < self.max_y()
    }

    /// Returns `true` if the two regions share at least one cell.
    pub fn intersects(&self, other: &TileRegion) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.max_x()
            && other.x < self.max_x()
            && self.y < other.max_y()
            && other.y < self.max_y()
    }

    /// The overlapping part of two regions, if any.
    pub fn intersection(&self, other: &TileRegion) -> Option<TileRegion> {
        if !self.intersects(other) {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        Some(Self::new(x, y, max_x - x, max_y - y))
    }

    /// Split the region into row-major work units of at most
    /// `unit_width × unit_height` cells, clipped to the region's edges.
    pub fn subdivide(&self, unit_width: u64, unit_height: u64) -> Result<Vec<TileRegion>, TypeError> {
        if unit_width == 0 || unit_height == 0 {
            return Err(TypeError::EmptyWorkUnit);
        }
        let mut units = Vec::new();
        let mut y = self.y;
        while y < self.max_y() {
            let h = unit_height.min(self.max_y() - y);
            let mut x = self.x;
            while x < self.max_x() {
                let w = unit_width.min(self.max_x() - x);
                units.push(Self::new(x, y, w, h));
                x += w;
            }
            y += h;
        }
        Ok(units)
    }
}

impl fmt::Debug for TileRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TileRegion({}, {} +{}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

impl fmt::Display for TileRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] -> [{}, {}]",
            self.x,
            self.y,
            self.max_x(),
            self.max_y()
        )
    }
}
