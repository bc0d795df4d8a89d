//! Request/response messages of the index service.
//!
//! Messages are serde enums carried as bincode bytes; the transport only
//! moves opaque byte buffers.

use std::io;

use plate_blob::BlobError;
use plate_types::{BlobId, IndexRecord, TileCell, TileHeader, TileVersion, Transaction, TransactionId};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::header::IndexHeader;

/// A top-level request to an index service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexRequest {
    /// Create a new platefile hosted by the service.
    Create { header: IndexHeader },
    /// List every hosted platefile.
    List,
    /// Invoke an index operation on one hosted platefile.
    Call { platefile_id: u32, call: IndexCall },
}

/// One [`TileIndex`](crate::TileIndex) operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexCall {
    IndexHeader,
    ReadRequest { cell: TileCell, version: TileVersion },
    WriteRequest { size_hint: u64 },
    WriteComplete { header: TileHeader, record: IndexRecord },
    WriteCancel { blob_id: BlobId },
    TransactionRequest { description: String, headers: Vec<TileHeader> },
    RootComplete { id: TransactionId, headers: Vec<TileHeader> },
    TransactionComplete { id: TransactionId },
    TransactionCursor,
    Transaction { id: TransactionId },
    OpenTransactions,
    SearchByLocation {
        cell: TileCell,
        start: TransactionId,
        end: TransactionId,
        include_one_prior: bool,
    },
    AllRecords,
    Log { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexResponse {
    Done,
    Header(IndexHeader),
    Headers(Vec<IndexHeader>),
    Record(IndexRecord),
    Records(Vec<(TileHeader, IndexRecord)>),
    BlobId(BlobId),
    TransactionId(TransactionId),
    Transaction(Option<Transaction>),
    Transactions(Vec<Transaction>),
    TileHeaders(Vec<TileHeader>),
    Error(WireError),
}

/// An [`IndexError`] in a form that survives the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireError {
    TileNotFound { cell: TileCell, version: TileVersion },
    InvalidPlatefile(String),
    PlatefileCreation(String),
    BlobLimit { max_blobs: u32 },
    InvalidTransaction { id: TransactionId, reason: String },
    RecordExists { cell: TileCell, transaction_id: TransactionId },
    Rpc(String),
    Journal { offset: u64, reason: String },
    Io(String),
    Serialization(String),
    BlobIo { blob_id: Option<BlobId>, message: String },
    Blob(String),
}

impl From<&IndexError> for WireError {
    fn from(err: &IndexError) -> Self {
        match err {
            IndexError::TileNotFound { cell, version } => WireError::TileNotFound {
                cell: *cell,
                version: *version,
            },
            IndexError::InvalidPlatefile(m) => WireError::InvalidPlatefile(m.clone()),
            IndexError::PlatefileCreation(m) => WireError::PlatefileCreation(m.clone()),
            IndexError::BlobLimit { max_blobs } => WireError::BlobLimit { max_blobs: *max_blobs },
            IndexError::InvalidTransaction { id, reason } => WireError::InvalidTransaction {
                id: *id,
                reason: reason.clone(),
            },
            IndexError::RecordExists { cell, transaction_id } => WireError::RecordExists {
                cell: *cell,
                transaction_id: *transaction_id,
            },
            IndexError::Rpc(m) => WireError::Rpc(m.clone()),
            IndexError::Journal { offset, reason } => WireError::Journal {
                offset: *offset,
                reason: reason.clone(),
            },
            IndexError::Io(e) => WireError::Io(e.to_string()),
            IndexError::Serialization(m) => WireError::Serialization(m.clone()),
            IndexError::Blob(e) if e.is_io() => WireError::BlobIo {
                blob_id: match e {
                    BlobError::Io { blob_id, .. } => Some(*blob_id),
                    BlobError::Corrupt { location, .. } => Some(location.blob_id),
                    BlobError::UnknownBlob(id) => Some(*id),
                    BlobError::Serialization(_) => None,
                },
                message: e.to_string(),
            },
            IndexError::Blob(e) => WireError::Blob(e.to_string()),
        }
    }
}

impl From<WireError> for IndexError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::TileNotFound { cell, version } => IndexError::TileNotFound { cell, version },
            WireError::InvalidPlatefile(m) => IndexError::InvalidPlatefile(m),
            WireError::PlatefileCreation(m) => IndexError::PlatefileCreation(m),
            WireError::BlobLimit { max_blobs } => IndexError::BlobLimit { max_blobs },
            WireError::InvalidTransaction { id, reason } => IndexError::InvalidTransaction { id, reason },
            WireError::RecordExists { cell, transaction_id } => IndexError::RecordExists { cell, transaction_id },
            WireError::Rpc(m) => IndexError::Rpc(m),
            WireError::Journal { offset, reason } => IndexError::Journal { offset, reason },
            WireError::Io(m) => IndexError::Io(io::Error::other(m)),
            WireError::Serialization(m) => IndexError::Serialization(m),
            WireError::BlobIo { blob_id, message } => IndexError::Blob(BlobError::Io {
                blob_id: blob_id.unwrap_or_default(),
                source: io::Error::other(message),
            }),
            WireError::Blob(m) => IndexError::Blob(BlobError::Serialization(m)),
        }
    }
}

pub(crate) fn encode<T: Serialize>(message: &T) -> IndexResult<Vec<u8>> {
    bincode::serialize(message).map_err(|e| IndexError::Rpc(format!("encode failed: {e}")))
}

pub(crate) fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> IndexResult<T> {
    bincode::deserialize(bytes).map_err(|e| IndexError::Rpc(format!("decode failed: {e}")))
}
