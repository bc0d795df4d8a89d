use std::io;

use plate_types::{BlobId, BlobLocation};

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// I/O failure on a specific blob.
    #[error("I/O error on blob {blob_id}: {source}")]
    Io {
        blob_id: BlobId,
        #[source]
        source: io::Error,
    },

    /// A record failed its framing or checksum validation.
    #[error("corrupt record at {location}: {reason}")]
    Corrupt {
        location: BlobLocation,
        reason: String,
    },

    /// The referenced blob has never been written.
    #[error("blob {0} does not exist")]
    UnknownBlob(BlobId),

    /// Header serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl BlobError {
    pub(crate) fn io(blob_id: BlobId, source: io::Error) -> Self {
        BlobError::Io { blob_id, source }
    }

    pub(crate) fn corrupt(location: BlobLocation, reason: impl Into<String>) -> Self {
        BlobError::Corrupt {
            location,
            reason: reason.into(),
        }
    }

    /// Returns `true` for storage-level read/write failures of a blob
    /// (missing file, I/O error, checksum or framing damage).
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            BlobError::Io { .. } | BlobError::Corrupt { .. } | BlobError::UnknownBlob(_)
        )
    }
}

/// Result alias for blob operations.
pub type BlobResult<T> = Result<T, BlobError>;
