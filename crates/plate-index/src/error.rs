//! Error types for the index crate.

use std::io;

use plate_types::{TileCell, TileVersion, TransactionId};

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// No record qualifies for the requested cell and version.
    #[error("no tile at {cell} ({version})")]
    TileNotFound { cell: TileCell, version: TileVersion },

    /// The platefile is unknown or has not been opened.
    #[error("invalid platefile: {0}")]
    InvalidPlatefile(String),

    /// A new platefile could not be initialized.
    #[error("cannot create platefile: {0}")]
    PlatefileCreation(String),

    /// Every blob is full and no new blob may be created.
    #[error("blob limit reached: all {max_blobs} blobs are full")]
    BlobLimit { max_blobs: u32 },

    /// The transaction id was never issued or is in the wrong state.
    #[error("invalid transaction {id}: {reason}")]
    InvalidTransaction { id: TransactionId, reason: String },

    /// A record already exists for this `(cell, transaction_id)` key.
    #[error("record for {cell} at transaction {transaction_id} already exists")]
    RecordExists {
        cell: TileCell,
        transaction_id: TransactionId,
    },

    /// Remote index transport failure.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The index journal could not be written or replayed.
    #[error("journal error at offset {offset}: {reason}")]
    Journal { offset: u64, reason: String },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Blob store failure.
    #[error("blob error: {0}")]
    Blob(#[from] plate_blob::BlobError),
}

impl IndexError {
    pub fn is_tile_not_found(&self) -> bool {
        matches!(self, IndexError::TileNotFound { .. })
    }

    pub fn is_blob_limit(&self) -> bool {
        matches!(self, IndexError::BlobLimit { .. })
    }

    pub fn is_blob_io(&self) -> bool {
        matches!(self, IndexError::Blob(e) if e.is_io())
    }

    pub(crate) fn invalid_transaction(id: TransactionId, reason: impl Into<String>) -> Self {
        IndexError::InvalidTransaction {
            id,
            reason: reason.into(),
        }
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
