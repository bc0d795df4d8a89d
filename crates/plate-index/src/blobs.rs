use std::sync::{Condvar, Mutex};

use plate_types::BlobId;
use tracing::{debug, warn};

use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};

#[derive(Clone, Copy, Debug, Default)]
struct BlobSlot {
    /// Bytes accounted to this blob by completed writes.
    size: u64,
    /// Size hint of the outstanding reservation, if the blob is locked.
    reserved: Option<u64>,
}

impl BlobSlot {
    fn has_room(&self, size_hint: u64, max_blob_size: u64) -> bool {
        self.size == 0 || self.size.saturating_add(size_hint) <= max_blob_size
    }
}

/// Hands out exclusive blob reservations to writers.
///
/// A reserved blob is locked until the write is completed or cancelled, so
/// concurrent writers always append to distinct blobs.
pub struct BlobManager {
    max_blobs: u32,
    max_blob_size: u64,
    slots: Mutex<Vec<BlobSlot>>,
    released: Condvar,
}

impl BlobManager {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            max_blobs: config.max_blobs,
            max_blob_size: config.max_blob_size,
            slots: Mutex::new(Vec::new()),
            released: Condvar::new(),
        }
    }

    /// Seed the manager with the sizes of blobs that already exist.
    pub fn with_sizes(config: &IndexConfig, sizes: impl IntoIterator<Item = (BlobId, u64)>) -> Self {
        let manager = Self::new(config);
        {
            let mut slots = manager.slots.lock().expect("blob manager mutex poisoned");
            for (id, size) in sizes {
                let idx = id.get() as usize;
                if slots.len() <= idx {
                    slots.resize(idx + 1, BlobSlot::default());
                }
                slots[idx].size = size;
            }
            if slots.len() > manager.max_blobs as usize {
                warn!(
                    existing = slots.len(),
                    max_blobs = manager.max_blobs,
                    "platefile holds more blobs than configured"
                );
            }
        }
        manager
    }

    /// Reserve a blob able to take `size_hint` more bytes.
    ///
    /// Blocks while every blob with room is reserved by another writer.
    /// Fails with `BlobLimit` when no blob has room and no new one may be
    /// created.
    pub fn request(&self, size_hint: u64) -> IndexResult<BlobId> {
        let mut slots = self.slots.lock().expect("blob manager mutex poisoned");
        loop {
            let mut busy_with_room = false;
            for (idx, slot) in slots.iter_mut().enumerate() {
                if !slot.has_room(size_hint, self.max_blob_size) {
                    continue;
                }
                if slot.reserved.is_some() {
                    busy_with_room = true;
                    continue;
                }
                slot.reserved = Some(size_hint);
                let id = BlobId::new(idx as u32);
                debug!(blob = %id, size_hint, "blob reserved");
                return Ok(id);
            }

            if (slots.len() as u64) < u64::from(self.max_blobs) {
                let id = BlobId::new(slots.len() as u32);
                slots.push(BlobSlot {
                    size: 0,
                    reserved: Some(size_hint),
                });
                debug!(blob = %id, size_hint, "new blob reserved");
                return Ok(id);
            }

            if !busy_with_room {
                return Err(IndexError::BlobLimit {
                    max_blobs: self.max_blobs,
                });
            }
            slots = self.released.wait(slots).expect("blob manager mutex poisoned");
        }
    }

    /// Release a reservation after a successful write, accounting its bytes.
    ///
    /// Returns `false` if the blob was not reserved.
    pub fn complete(&self, blob_id: BlobId) -> bool {
        self.release(blob_id, true)
    }

    /// Release a reservation without accounting any bytes.
    pub fn cancel(&self, blob_id: BlobId) -> bool {
        self.release(blob_id, false)
    }

    fn release(&self, blob_id: BlobId, commit: bool) -> bool {
        let mut slots = self.slots.lock().expect("blob manager mutex poisoned");
        let Some(slot) = slots.get_mut(blob_id.get() as usize) else {
            return false;
        };
        let Some(reserved) = slot.reserved.take() else {
            return false;
        };
        if commit {
            slot.size = slot.size.saturating_add(reserved);
        }
        drop(slots);
        self.released.notify_all();
        true
    }

    /// Accounted size of every known blob.
    pub fn sizes(&self) -> Vec<(BlobId, u64)> {
        self.slots
            .lock()
            .expect("blob manager mutex poisoned")
            .iter()
            .enumerate()
            .map(|(idx, slot)| (BlobId::new(idx as u32), slot.size))
            .collect()
    }

    pub fn max_blobs(&self) -> u32 {
        self.max_blobs
    }
}
