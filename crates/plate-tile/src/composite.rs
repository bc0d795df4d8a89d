use serde::{Deserialize, Serialize};

use crate::error::TileResult;
use crate::tile::Tile;

/// How [`composite_under`] blends a lower layer into the pixels above it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeMode {
    /// Any visible pixel on top wins outright; the lower layer only fills
    /// fully transparent pixels.
    #[default]
    Draft,
    /// Porter-Duff "over" with the accumulated pixels on top.
    Full,
}

/// Layer `bottom` underneath `top`, in place.
///
/// Pixels already visible in `top` are never replaced by `bottom` in
/// [`CompositeMode::Draft`]; in [`CompositeMode::Full`] partially
/// transparent pixels are blended.
pub fn composite_under(top: &mut Tile, bottom: &Tile, mode: CompositeMode) -> TileResult<()> {
    top.check_compatible(bottom)?;
    let format = top.format();
    let n = format.channels();
    let a = format.alpha_index();
    let (width, height) = (top.width(), top.height());

    for y in 0..height {
        for x in 0..width {
            let below = bottom.pixel(x, y);
            let above = top.pixel_mut(x, y);
            match mode {
                CompositeMode::Draft => {
                    if above[a] == 0 {
                        above.copy_from_slice(below);
                    }
                }
                CompositeMode::Full => blend_over(above, below, a, n),
            }
        }
    }
    Ok(())
}

/// `above = above over below`, using straight (non-premultiplied) alpha.
fn blend_over(above: &mut [u8], below: &[u8], a: usize, n: usize) {
    let ta = u32::from(above[a]);
    if ta == 255 {
        return;
    }
    let ba = u32::from(below[a]);
    // All intermediate quantities are scaled by 255.
    let under = ba * (255 - ta);
    let out_a = ta * 255 + under;
    if out_a == 0 {
        above.fill(0);
        return;
    }
    for c in 0..n {
        if c == a {
            continue;
        }
        let tc = u32::from(above[c]);
        let bc = u32::from(below[c]);
        let value = (tc * ta * 255 + bc * under + out_a / 2) / out_a;
        above[c] = value.min(255) as u8;
    }
    above[a] = ((out_a + 127) / 255).min(255) as u8;
}
