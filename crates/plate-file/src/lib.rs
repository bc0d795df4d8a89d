//! The platefile facade.
//!
//! [`PlateFile`] composes a [`TileIndex`](plate_index::TileIndex) with a
//! [`BlobStore`](plate_blob::BlobStore) and exposes versioned tile reads,
//! staged tile writes, and the transaction lifecycle. [`WorkQueue`] and
//! [`Ingestor`] parallelize independent tile writes within one
//! transaction.
//!
//! # Write Protocol
//!
//! ```text
//! stage payload -> write_request(size) -> append to blob -> write_complete
//! ```
//!
//! A failed append cancels the blob reservation and publishes nothing.

pub mod config;
pub mod error;
pub mod ingest;
pub mod plate;
pub mod queue;

pub use config::{PlateConfig, QueueConfig};
pub use error::{PlateError, PlateResult};
pub use ingest::{IngestReport, Ingestor};
pub use plate::PlateFile;
pub use queue::{WorkQueue, WorkReport};
