//! Tile rasters for platefiles.
//!
//! The storage engine treats tile payloads as opaque bytes. This crate is
//! the boundary where those bytes become pixels: a [`Tile`] raster with a
//! trailing alpha channel, the [`TileCodec`] trait and an injected
//! [`CodecRegistry`] to turn tiles into payloads and back, the
//! transparency-aware [`composite_under`] used by compaction, and
//! [`supersample_crop`] to align a coarse tile with a finer cell.

pub mod codec;
pub mod composite;
pub mod error;
pub mod pixel;
pub mod resample;
pub mod tile;

pub use codec::{CodecRegistry, RawTileCodec, TileCodec, RAW_PAYLOAD_TYPE};
pub use composite::{composite_under, CompositeMode};
pub use error::{TileError, TileResult};
pub use pixel::PixelFormat;
pub use resample::supersample_crop;
pub use tile::Tile;
