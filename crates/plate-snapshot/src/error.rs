use plate_file::PlateError;
use plate_types::TypeError;

/// Errors surfaced by a compaction pass.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Plate(#[from] PlateError),

    #[error("invalid snapshot region: {0}")]
    Region(#[from] TypeError),

    #[error("snapshot level {level} is outside a pyramid of {num_levels} levels")]
    LevelOutOfRange { level: u8, num_levels: u8 },

    #[error("snapshot config error: {0}")]
    Config(String),
}

impl SnapshotError {
    pub fn is_blob_io(&self) -> bool {
        matches!(self, SnapshotError::Plate(e) if e.is_blob_io())
    }
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
