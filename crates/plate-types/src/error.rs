use thiserror::Error;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("level {level} exceeds the maximum pyramid depth {max}")]
    LevelOutOfRange { level: u8, max: u8 },

    #[error("cell ({col}, {row}) lies outside level {level}")]
    CellOutOfRange { col: u32, row: u32, level: u8 },

    #[error("work unit size must be non-zero")]
    EmptyWorkUnit,
}
