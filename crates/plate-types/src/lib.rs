//! Foundation types for the platefile storage engine.
//!
//! A platefile is a versioned quad-tree of image tiles. Every other plate
//! crate depends on `plate-types` for the addressing and bookkeeping types
//! shared between the blob store, the tile index, and the compaction engine.
//!
//! # Key Types
//!
//! - [`TileCell`]: `(col, row, level)` address in the quad-tree pyramid
//! - [`TileRegion`]: half-open rectangle of cells at one level
//! - [`TileHeader`]: immutable identity of one stored tile version
//! - [`BlobLocation`]: `(blob_id, offset)` of a tile's bytes
//! - [`IndexRecord`]: status + location for one `(cell, transaction)` key
//! - [`TransactionId`] / [`Transaction`]: unit-of-work versioning
//! - [`TileVersion`]: the version bound used by reads

pub mod cell;
pub mod error;
pub mod header;
pub mod record;
pub mod region;
pub mod transaction;
pub mod version;

pub use cell::{TileCell, MAX_LEVEL};
pub use error::TypeError;
pub use header::TileHeader;
pub use record::{BlobId, BlobLocation, IndexRecord, RecordStatus};
pub use region::TileRegion;
pub use transaction::{Transaction, TransactionId, TransactionState};
pub use version::TileVersion;
