/// Errors from tile rasters and codecs.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    /// No codec is registered for the payload type.
    #[error("no codec registered for payload type '{0}'")]
    UnknownCodec(String),

    /// A payload could not be encoded or decoded.
    #[error("{payload_type} codec: {reason}")]
    Codec { payload_type: String, reason: String },

    /// Two rasters that must match do not.
    #[error("raster mismatch: expected {expected}, got {got}")]
    Mismatch { expected: String, got: String },

    /// Unrecognized pixel format tag.
    #[error("unknown pixel format '{0}'")]
    UnknownPixelFormat(String),

    /// Source and target cells are not related as required.
    #[error("invalid resample: {0}")]
    Geometry(String),
}

/// Result alias for tile operations.
pub type TileResult<T> = Result<T, TileError>;
