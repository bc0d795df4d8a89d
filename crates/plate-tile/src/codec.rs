use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{TileError, TileResult};
use crate::pixel::PixelFormat;
use crate::tile::Tile;

/// Payload type tag of [`RawTileCodec`].
pub const RAW_PAYLOAD_TYPE: &str = "raw";

/// Turns tiles into stored payload bytes and back.
pub trait TileCodec: Send + Sync {
    /// Payload type tag written into tile headers.
    fn payload_type(&self) -> &str;

    fn encode(&self, tile: &Tile) -> TileResult<Vec<u8>>;

    fn decode(&self, payload: &[u8]) -> TileResult<Tile>;
}

/// Uncompressed tile encoding.
///
/// ```text
/// [4 bytes: magic "PTR1"]
/// [4 bytes: width  (little-endian u32)]
/// [4 bytes: height (little-endian u32)]
/// [1 byte:  pixel format tag]
/// [N bytes: interleaved pixel data]
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct RawTileCodec;

const RAW_MAGIC: &[u8; 4] = b"PTR1";
const RAW_HEADER_LEN: usize = 13;

impl RawTileCodec {
    fn error(reason: impl Into<String>) -> TileError {
        TileError::Codec {
            payload_type: RAW_PAYLOAD_TYPE.to_string(),
            reason: reason.into(),
        }
    }
}

impl TileCodec for RawTileCodec {
    fn payload_type(&self) -> &str {
        RAW_PAYLOAD_TYPE
    }

    fn encode(&self, tile: &Tile) -> TileResult<Vec<u8>> {
        let mut out = Vec::with_capacity(RAW_HEADER_LEN + tile.data().len());
        out.extend_from_slice(RAW_MAGIC);
        out.extend_from_slice(&tile.width().to_le_bytes());
        out.extend_from_slice(&tile.height().to_le_bytes());
        out.push(tile.format().tag());
        out.extend_from_slice(tile.data());
        Ok(out)
    }

    fn decode(&self, payload: &[u8]) -> TileResult<Tile> {
        if payload.len() < RAW_HEADER_LEN {
            return Err(Self::error(format!("payload is only {} bytes", payload.len())));
        }
        if &payload[..4] != RAW_MAGIC {
            return Err(Self::error("bad magic"));
        }
        let width = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let height = u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]);
        let format = PixelFormat::from_tag(payload[12])
            .ok_or_else(|| Self::error(format!("unknown pixel format tag {}", payload[12])))?;
        Tile::from_raw(width, height, format, payload[RAW_HEADER_LEN..].to_vec())
            .map_err(|e| Self::error(e.to_string()))
    }
}

/// Codecs available to a platefile, looked up by payload type.
///
/// Passed explicitly to whoever needs to encode or decode tiles; there is
/// no process-wide registry.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn TileCodec>>,
}

impl CodecRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in codecs.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RawTileCodec));
        registry
    }

    /// Add a codec, replacing any codec with the same payload type.
    pub fn register(&mut self, codec: Arc<dyn TileCodec>) {
        let payload_type = codec.payload_type().to_string();
        if self.codecs.insert(payload_type.clone(), codec).is_some() {
            debug!(%payload_type, "codec replaced");
        }
    }

    pub fn get(&self, payload_type: &str) -> TileResult<Arc<dyn TileCodec>> {
        match self.codecs.get(payload_type) {
            Some(codec) => Ok(Arc::clone(codec)),
            None => {
                debug!(payload_type, known = ?self, "no codec registered");
                Err(TileError::UnknownCodec(payload_type.to_string()))
            }
        }
    }

    pub fn contains(&self, payload_type: &str) -> bool {
        self.codecs.contains_key(payload_type)
    }

    pub fn payload_types(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.codecs.keys()).finish()
    }
}
