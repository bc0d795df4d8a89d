use crate::error::{TileError, TileResult};
use crate::pixel::PixelFormat;

/// A `width × height` raster of interleaved 8-bit channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tile {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Tile {
    /// A fully transparent tile.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![0; width as usize * height as usize * format.channels()],
        }
    }

    /// A tile with every pixel set to `pixel`.
    pub fn filled(width: u32, height: u32, format: PixelFormat, pixel: &[u8]) -> TileResult<Self> {
        if pixel.len() != format.channels() {
            return Err(TileError::Mismatch {
                expected: format!("{} channels", format.channels()),
                got: format!("{} channels", pixel.len()),
            });
        }
        let mut tile = Self::new(width, height, format);
        for px in tile.data.chunks_exact_mut(format.channels()) {
            px.copy_from_slice(pixel);
        }
        Ok(tile)
    }

    /// Wrap existing pixel data.
    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> TileResult<Self> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(TileError::Mismatch {
                expected: format!("{expected} bytes"),
                got: format!("{} bytes", data.len()),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.channels()
    }

    /// Channels of one pixel. Panics if out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let at = self.offset(x, y);
        &self.data[at..at + self.format.channels()]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let at = self.offset(x, y);
        let n = self.format.channels();
        &mut self.data[at..at + n]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: &[u8]) {
        self.pixel_mut(x, y).copy_from_slice(pixel);
    }

    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        self.pixel(x, y)[self.format.alpha_index()]
    }

    fn alphas(&self) -> impl Iterator<Item = u8> + '_ {
        let a = self.format.alpha_index();
        self.data.chunks_exact(self.format.channels()).map(move |px| px[a])
    }

    /// Every pixel has alpha 255.
    pub fn is_opaque(&self) -> bool {
        self.alphas().all(|a| a == u8::MAX)
    }

    /// Every pixel has alpha 0.
    pub fn is_transparent(&self) -> bool {
        self.alphas().all(|a| a == 0)
    }

    /// Fails unless `other` has the same size and format.
    pub fn check_compatible(&self, other: &Tile) -> TileResult<()> {
        if self.width != other.width || self.height != other.height || self.format != other.format {
            return Err(TileError::Mismatch {
                expected: format!("{}x{} {}", self.width, self.height, self.format),
                got: format!("{}x{} {}", other.width, other.height, other.format),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tile_is_transparent() {
        let tile = Tile::new(4, 4, PixelFormat::Rgba8);
        assert!(tile.is_transparent());
        assert!(!tile.is_opaque());
        assert_eq!(tile.data().len(), 64);
    }

    #[test]
    fn filled_tile_is_opaque() {
        let tile = Tile::filled(3, 2, PixelFormat::GrayA8, &[100, 255]).unwrap();
        assert!(tile.is_opaque());
        assert_eq!(tile.pixel(2, 1), &[100, 255]);
        assert!(Tile::filled(1, 1, PixelFormat::Rgba8, &[1, 2]).is_err());
    }

    #[test]
    fn one_transparent_pixel_breaks_opacity() {
        let mut tile = Tile::filled(2, 2, PixelFormat::Rgba8, &[9, 9, 9, 255]).unwrap();
        tile.set_pixel(1, 1, &[0, 0, 0, 0]);
        assert!(!tile.is_opaque());
        assert_eq!(tile.alpha(1, 1), 0);
        assert_eq!(tile.alpha(0, 1), 255);
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(Tile::from_raw(2, 2, PixelFormat::GrayA8, vec![0; 8]).is_ok());
        assert!(matches!(
            Tile::from_raw(2, 2, PixelFormat::GrayA8, vec![0; 7]),
            Err(TileError::Mismatch { .. })
        ));
    }
}
