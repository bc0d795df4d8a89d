use plate_types::TileCell;

use crate::error::{TileError, TileResult};
use crate::tile::Tile;

/// Cut the part of a coarse tile that covers `target` and upsample it to a
/// full tile by pixel replication.
///
/// `source` is the raster stored at `source_cell`, which must be `target`
/// or one of its ancestors.
pub fn supersample_crop(source: &Tile, source_cell: TileCell, target: TileCell) -> TileResult<Tile> {
    if target.ancestor_at(source_cell.level) != Some(source_cell) {
        return Err(TileError::Geometry(format!(
            "{source_cell:?} does not cover {target:?}"
        )));
    }
    let shift = u32::from(target.level - source_cell.level);
    if shift == 0 {
        return Ok(source.clone());
    }
    let scale = 1u64 << shift;

    // Position of the target inside the source footprint, in target cells.
    let ox = u64::from(target.col) - u64::from(source_cell.col) * scale;
    let oy = u64::from(target.row) - u64::from(source_cell.row) * scale;
    let (w, h) = (u64::from(source.width()), u64::from(source.height()));

    let mut out = Tile::new(source.width(), source.height(), source.format());
    for y in 0..h {
        let sy = (oy * h + y) / scale;
        for x in 0..w {
            let sx = (ox * w + x) / scale;
            out.set_pixel(x as u32, y as u32, source.pixel(sx as u32, sy as u32));
        }
    }
    Ok(out)
}
