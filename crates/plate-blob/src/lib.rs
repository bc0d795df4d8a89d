//! Append-only blob storage for platefile tiles.
//!
//! A blob is a single append-only object holding many tiles. Each write
//! appends one self-delimiting record -- a length-prefixed [`TileHeader`]
//! followed by a length-prefixed payload, both CRC32-checked -- and returns
//! the stable [`BlobLocation`] of the record.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`FileBlobStore`] -- one `plate_<id>.blob` file per blob in a platefile
//!   directory
//! - [`InMemoryBlobStore`] -- `HashMap`-backed store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Bytes are never rewritten or deleted; writers only append.
//! 2. Appends to the same blob are serialized so returned offsets are exact.
//! 3. Appends to different blobs may proceed in parallel.
//! 4. Reads never block on writers (published records are immutable).
//! 5. Framing errors surface as [`BlobError::Corrupt`], never as garbage data.
//!
//! [`TileHeader`]: plate_types::TileHeader
//! [`BlobLocation`]: plate_types::BlobLocation

pub mod error;
pub mod file;
pub mod frame;
pub mod memory;
pub mod traits;

pub use error::{BlobError, BlobResult};
pub use file::FileBlobStore;
pub use frame::{encode_frame, frame_len, record_len, HEADER_PREFIX_LEN, PAYLOAD_PREFIX_LEN};
pub use memory::InMemoryBlobStore;
pub use traits::BlobStore;
