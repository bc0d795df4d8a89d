use std::collections::HashMap;
use std::io::Cursor;
use std::sync::RwLock;

use plate_types::{BlobId, BlobLocation, TileHeader};
use tracing::debug;

use crate::error::{BlobError, BlobResult};
use crate::frame;
use crate::traits::BlobStore;

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Each blob is a growable byte vector
/// behind a single `RwLock`.
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Total bytes across all blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }

    /// Flip the last byte of the record at `location`, so the next read of
    /// its payload fails the checksum. Used for fault-injection tests.
    ///
    /// Returns `false` if the location does not name a record.
    pub fn corrupt_record(&self, location: BlobLocation) -> bool {
        let end = match self.read(location) {
            Ok((header, payload)) => {
                let header_len = match bincode::serialize(&header) {
                    Ok(bytes) => bytes.len(),
                    Err(_) => return false,
                };
                location.offset + frame::frame_len(header_len, payload.len())
            }
            Err(_) => return false,
        };
        let mut blobs = self.blobs.write().expect("lock poisoned");
        match blobs.get_mut(&location.blob_id) {
            Some(bytes) if end > 0 && (end as usize) <= bytes.len() => {
                bytes[end as usize - 1] ^= 0xFF;
                true
            }
            _ => false,
        }
    }

    fn slice_at(&self, location: BlobLocation) -> BlobResult<Vec<u8>> {
        let blobs = self.blobs.read().expect("lock poisoned");
        let bytes = blobs
            .get(&location.blob_id)
            .ok_or(BlobError::UnknownBlob(location.blob_id))?;
        let start = usize::try_from(location.offset)
            .ok()
            .filter(|&o| o < bytes.len())
            .ok_or_else(|| BlobError::corrupt(location, "offset past end of blob"))?;
        Ok(bytes[start..].to_vec())
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn write(&self, blob_id: BlobId, header: &TileHeader, payload: &[u8]) -> BlobResult<BlobLocation> {
        let record = frame::encode_frame(header, payload)?;
        let mut blobs = self.blobs.write().expect("lock poisoned");
        let blob = blobs.entry(blob_id).or_default();
        let location = BlobLocation::new(blob_id, blob.len() as u64);
        blob.extend_from_slice(&record);
        debug!(blob = %blob_id, offset = location.offset, len = record.len(), "blob append");
        Ok(location)
    }

    fn read_header(&self, location: BlobLocation) -> BlobResult<TileHeader> {
        let bytes = self.slice_at(location)?;
        frame::read_header(&mut Cursor::new(bytes), location)
    }

    fn read(&self, location: BlobLocation) -> BlobResult<(TileHeader, Vec<u8>)> {
        let bytes = self.slice_at(location)?;
        let mut cursor = Cursor::new(bytes);
        let header = frame::read_header(&mut cursor, location)?;
        let payload = frame::read_payload(&mut cursor, location)?;
        Ok((header, payload))
    }

    fn blob_size(&self, blob_id: BlobId) -> BlobResult<Option<u64>> {
        Ok(self
            .blobs
            .read()
            .expect("lock poisoned")
            .get(&blob_id)
            .map(|b| b.len() as u64))
    }

    fn blob_ids(&self) -> BlobResult<Vec<BlobId>> {
        let mut ids: Vec<BlobId> = self
            .blobs
            .read()
            .expect("lock poisoned")
            .keys()
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }
}
