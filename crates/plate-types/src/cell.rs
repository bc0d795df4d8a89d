use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::region::TileRegion;

/// Deepest supported pyramid level. Level `n` is `2^n` cells on a side, so
/// column and row indices always fit in a `u32`.
pub const MAX_LEVEL: u8 = 31;

/// Address of one cell in the quad-tree pyramid.
///
/// Level 0 is the single root tile covering the whole pyramid; every level
/// doubles the resolution along each axis. The parent of `(c, r, l)` is
/// `(c / 2, r / 2, l - 1)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCell {
    pub col: u32,
    pub row: u32,
    pub level: u8,
}

impl TileCell {
    pub const ROOT: TileCell = TileCell {
        col: 0,
        row: 0,
        level: 0,
    };

    pub const fn new(col: u32, row: u32, level: u8) -> Self {
        Self { col, row, level }
    }

    /// Construct a cell, rejecting addresses outside the pyramid.
    pub fn checked(col: u32, row: u32, level: u8) -> Result<Self, TypeError> {
        let cell = Self::new(col, row, level);
        cell.validate()?;
        Ok(cell)
    }

    /// Number of cells along one axis at `level`.
    pub fn extent(level: u8) -> u64 {
        1u64 << level
    }

    /// Check that the level is supported and the column/row lie inside it.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.level > MAX_LEVEL {
            return Err(TypeError::LevelOutOfRange {
                level: self.level,
                max: MAX_LEVEL,
            });
        }
        let extent = Self::extent(self.level);
        if u64::from(self.col) >= extent || u64::from(self.row) >= extent {
            return Err(TypeError::CellOutOfRange {
                col: self.col,
                row: self.row,
                level: self.level,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// The cell one level up, or `None` for the root.
    pub fn parent(&self) -> Option<TileCell> {
        if self.level == 0 {
            return None;
        }
        Some(Self::new(self.col / 2, self.row / 2, self.level - 1))
    }

    /// The four children, ordered `(2c,2r)`, `(2c+1,2r)`, `(2c,2r+1)`,
    /// `(2c+1,2r+1)`.
    pub fn children(&self) -> [TileCell; 4] {
        let (c, r, l) = (self.col * 2, self.row * 2, self.level + 1);
        [
            Self::new(c, r, l),
            Self::new(c + 1, r, l),
            Self::new(c, r + 1, l),
            Self::new(c + 1, r + 1, l),
        ]
    }

    /// The ancestor of this cell at a coarser (or equal) level.
    pub fn ancestor_at(&self, level: u8) -> Option<TileCell> {
        if level > self.level {
            return None;
        }
        let shift = self.level - level;
        Some(Self::new(self.col >> shift, self.row >> shift, level))
    }

    /// Returns `true` if `other` lies strictly below this cell.
    pub fn is_ancestor_of(&self, other: &TileCell) -> bool {
        other.level > self.level && other.ancestor_at(self.level) == Some(*self)
    }

    /// The area this cell covers, expressed in cells of a finer `level`.
    ///
    /// A cell at level `l` covers a `2^(level-l)` square at `level`. Asking
    /// for a coarser level returns the single enclosing cell.
    pub fn footprint_at(&self, level: u8) -> TileRegion {
        if level >= self.level {
            let scale = 1u64 << (level - self.level);
            TileRegion::new(
                u64::from(self.col) * scale,
                u64::from(self.row) * scale,
                scale,
                scale,
            )
        } else {
            let shift = self.level - level;
            TileRegion::new(
                u64::from(self.col >> shift),
                u64::from(self.row >> shift),
                1,
                1,
            )
        }
    }
}

impl fmt::Debug for TileCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TileCell({}, {} @ {})", self.col, self.row, self.level)
    }
}

impl fmt::Display for TileCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} @ {}", self.col, self.row, self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent() {
        assert_eq!(TileCell::ROOT.parent(), None);
        assert!(TileCell::ROOT.is_root());
    }

    #[test]
    fn children_are_in_quad_order() {
        let children = TileCell::new(3, 5, 4).children();
        assert_eq!(children[0], TileCell::new(6, 10, 5));
        assert_eq!(children[1], TileCell::new(7, 10, 5));
        assert_eq!(children[2], TileCell::new(6, 11, 5));
        assert_eq!(children[3], TileCell::new(7, 11, 5));
    }

    #[test]
    fn every_child_points_back_to_parent() {
        let cell = TileCell::new(9, 2, 6);
        for child in cell.children() {
            assert_eq!(child.parent(), Some(cell));
            assert!(cell.is_ancestor_of(&child));
        }
    }

    #[test]
    fn ancestor_at_walks_up_several_levels() {
        let cell = TileCell::new(13, 6, 4);
        assert_eq!(cell.ancestor_at(2), Some(TileCell::new(3, 1, 2)));
        assert_eq!(cell.ancestor_at(0), Some(TileCell::ROOT));
        assert_eq!(cell.ancestor_at(5), None);
        assert!(!cell.is_ancestor_of(&cell));
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(TileCell::new(1, 1, 1).is_valid());
        assert_eq!(
            TileCell::new(2, 0, 1).validate(),
            Err(TypeError::CellOutOfRange {
                col: 2,
                row: 0,
                level: 1
            })
        );
        assert!(matches!(
            TileCell::checked(0, 0, MAX_LEVEL + 1),
            Err(TypeError::LevelOutOfRange { .. })
        ));
    }

    #[test]
    fn footprint_scales_to_finer_level() {
        let cell = TileCell::new(1, 0, 1);
        assert_eq!(cell.footprint_at(3), TileRegion::new(4, 0, 4, 4));
        assert_eq!(cell.footprint_at(1), TileRegion::new(1, 0, 1, 1));
        assert_eq!(cell.footprint_at(0), TileRegion::new(0, 0, 1, 1));
    }

    #[test]
    fn max_level_footprint_does_not_overflow() {
        let cell = TileCell::ROOT;
        let region = cell.footprint_at(MAX_LEVEL);
        assert_eq!(region.width, 1u64 << MAX_LEVEL);
    }

    #[test]
    fn display_format() {
        assert_eq!(TileCell::new(4, 7, 3).to_string(), "4 7 @ 3");
    }
}
