use plate_types::{BlobId, IndexRecord, TileCell, TileHeader, TileVersion, Transaction, TransactionId};

use crate::error::IndexResult;
use crate::header::IndexHeader;

/// Durable mapping from `(cell, transaction_id)` to [`IndexRecord`], plus
/// the transaction protocol.
///
/// All implementations must satisfy these invariants:
/// - A published record is never mutated or removed.
/// - Transaction ids are issued only here, strictly increasing from 1.
/// - The cursor never reaches a transaction that has not committed.
/// - `write_complete` is atomic with respect to readers.
pub trait TileIndex: Send + Sync {
    /// Platefile metadata.
    fn index_header(&self) -> IndexResult<IndexHeader>;

    /// Resolve the record a read bounded by `version` should see.
    ///
    /// Returns an `Empty` record when nothing qualifies, except for
    /// [`TileVersion::Exact`], which fails with `TileNotFound`.
    fn read_request(&self, cell: TileCell, version: TileVersion) -> IndexResult<IndexRecord>;

    /// Reserve a blob able to take `size_hint` more bytes.
    fn write_request(&self, size_hint: u64) -> IndexResult<BlobId>;

    /// Publish `record` under the key of `header` and release the blob
    /// reservation it was written through.
    fn write_complete(&self, header: &TileHeader, record: IndexRecord) -> IndexResult<()>;

    /// Release a blob reservation whose write failed. Nothing is published.
    fn write_cancel(&self, blob_id: BlobId) -> IndexResult<()>;

    /// Allocate the next transaction id, announcing the cells it will touch.
    fn transaction_request(&self, description: &str, headers: &[TileHeader]) -> IndexResult<TransactionId>;

    /// Signal that the first-pass writes of a transaction have landed.
    fn root_complete(&self, id: TransactionId, headers: &[TileHeader]) -> IndexResult<()>;

    /// Commit a transaction; may advance the cursor.
    fn transaction_complete(&self, id: TransactionId) -> IndexResult<()>;

    /// The newest transaction id up to which reads are consistent.
    fn transaction_cursor(&self) -> IndexResult<TransactionId>;

    fn transaction(&self, id: TransactionId) -> IndexResult<Option<Transaction>>;

    /// Transactions not yet committed, ascending by id.
    fn open_transactions(&self) -> IndexResult<Vec<Transaction>>;

    /// Headers of `cell` with `start <= transaction_id <= end`, ascending,
    /// optionally preceded by the newest header before `start`.
    ///
    /// Fails with `TileNotFound` if the cell has never been written.
    fn search_by_location(
        &self,
        cell: TileCell,
        start: TransactionId,
        end: TransactionId,
        include_one_prior: bool,
    ) -> IndexResult<Vec<TileHeader>>;

    /// Visit every published record, by cell then transaction id.
    fn for_each_record(&self, visitor: &mut dyn FnMut(&TileHeader, &IndexRecord)) -> IndexResult<()>;

    /// Write an operator log line attributed to this platefile.
    fn log(&self, message: &str) -> IndexResult<()>;
}
