use std::fs;
use std::path::Path;

use plate_types::{BlobId, BlobLocation, TileHeader};

use crate::error::{BlobError, BlobResult};

/// Append-only storage of framed tile records.
///
/// All implementations must satisfy these invariants:
/// - A record is never modified once written; its location stays valid.
/// - Appends to one blob are serialized; appends to different blobs are not.
/// - Reads of published records never observe a partially written record.
/// - The store never interprets payload bytes.
pub trait BlobStore: Send + Sync {
    /// Append one record to `blob_id`, creating the blob if needed.
    ///
    /// Returns the offset at which the record starts.
    fn write(&self, blob_id: BlobId, header: &TileHeader, payload: &[u8]) -> BlobResult<BlobLocation>;

    /// Append a record whose payload is the contents of a local file.
    fn write_from_file(&self, blob_id: BlobId, header: &TileHeader, path: &Path) -> BlobResult<BlobLocation> {
        let payload = fs::read(path).map_err(|source| BlobError::Io { blob_id, source })?;
        self.write(blob_id, header, &payload)
    }

    /// Read only the header of the record at `location`.
    fn read_header(&self, location: BlobLocation) -> BlobResult<TileHeader>;

    /// Read the header and payload of the record at `location`.
    fn read(&self, location: BlobLocation) -> BlobResult<(TileHeader, Vec<u8>)>;

    /// Read only the payload of the record at `location`.
    fn read_payload(&self, location: BlobLocation) -> BlobResult<Vec<u8>> {
        self.read(location).map(|(_, payload)| payload)
    }

    /// Copy the payload of the record at `location` into a local file,
    /// replacing it. Returns the number of payload bytes written.
    fn read_to_file(&self, location: BlobLocation, path: &Path) -> BlobResult<u64> {
        let payload = self.read_payload(location)?;
        fs::write(path, &payload).map_err(|source| BlobError::Io {
            blob_id: location.blob_id,
            source,
        })?;
        Ok(payload.len() as u64)
    }

    /// Current size in bytes of a blob, or `None` if it was never written.
    fn blob_size(&self, blob_id: BlobId) -> BlobResult<Option<u64>>;

    /// Ids of every blob holding at least one record, ascending.
    fn blob_ids(&self) -> BlobResult<Vec<BlobId>>;
}
