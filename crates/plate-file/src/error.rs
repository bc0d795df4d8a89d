use std::io;

use plate_blob::BlobError;
use plate_index::IndexError;
use plate_tile::TileError;
use plate_types::TypeError;

/// Errors surfaced by the platefile facade.
#[derive(Debug, thiserror::Error)]
pub enum PlateError {
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("tile error: {0}")]
    Tile(#[from] TileError),

    #[error("invalid cell: {0}")]
    Cell(#[from] TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("work queue error: {0}")]
    Queue(String),
}

impl PlateError {
    /// The requested cell or version has no record. Probing callers treat
    /// this as control flow.
    pub fn is_tile_not_found(&self) -> bool {
        matches!(self, PlateError::Index(e) if e.is_tile_not_found())
    }

    /// Storage failure on a specific blob.
    pub fn is_blob_io(&self) -> bool {
        match self {
            PlateError::Blob(e) => e.is_io(),
            PlateError::Index(e) => e.is_blob_io(),
            _ => false,
        }
    }

    pub fn is_blob_limit(&self) -> bool {
        matches!(self, PlateError::Index(e) if e.is_blob_limit())
    }
}

pub type PlateResult<T> = Result<T, PlateError>;
