//! Transactional tile index for platefiles.
//!
//! The index is the single source of truth for a platefile's version
//! history: it maps every `(cell, transaction_id)` key to the blob location
//! of the tile written under it, issues transaction ids, and maintains the
//! transaction cursor that readers use to see only fully committed data.
//!
//! # Backends
//!
//! All backends implement the [`TileIndex`] trait:
//!
//! - [`LocalIndex`] -- in-process index, journaled to `index.journal`
//!   inside the platefile directory (or memory-only)
//! - [`RemoteIndex`] -- client of an [`IndexService`] reached through any
//!   [`IndexTransport`]
//!
//! # Transaction Protocol
//!
//! ```text
//! transaction_request -> write_request / write_complete (many)
//!                     -> root_complete -> transaction_complete
//! ```
//!
//! The cursor only moves over a contiguous run of committed ids; a
//! transaction that is never completed blocks it for good.

pub mod blobs;
pub mod config;
pub mod error;
pub mod header;
pub mod history;
pub mod journal;
pub mod local;
pub mod protocol;
pub mod remote;
pub mod service;
pub mod traits;
pub mod transactions;

pub use blobs::BlobManager;
pub use config::IndexConfig;
pub use error::{IndexError, IndexResult};
pub use header::{IndexHeader, HEADER_FILE};
pub use history::{CellHistory, HistoryEntry, HistoryMap};
pub use journal::{IndexJournal, JournalEntry, JOURNAL_FILE};
pub use local::LocalIndex;
pub use protocol::{IndexCall, IndexRequest, IndexResponse, WireError};
pub use remote::{create_platefile, list_platefiles, IndexTransport, LoopbackTransport, RemoteIndex};
pub use service::IndexService;
pub use traits::TileIndex;
pub use transactions::{CompleteOutcome, TransactionLog};
