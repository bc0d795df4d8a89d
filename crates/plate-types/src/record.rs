use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one append-only blob object within a platefile.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BlobId(pub u32);

impl BlobId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Conventional file name of the blob inside a platefile directory.
    pub fn file_name(&self) -> String {
        format!("plate_{}.blob", self.0)
    }

    /// Parse a blob id back out of a `plate_<id>.blob` file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        name.strip_prefix("plate_")?
            .strip_suffix(".blob")?
            .parse()
            .ok()
            .map(Self)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a tile's framed bytes live: a blob and a byte offset inside it.
///
/// Stable for the lifetime of the tile; never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlobLocation {
    pub blob_id: BlobId,
    pub offset: u64,
}

impl BlobLocation {
    pub const fn new(blob_id: BlobId, offset: u64) -> Self {
        Self { blob_id, offset }
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob {} @ {}", self.blob_id, self.offset)
    }
}

/// Whether an index lookup found a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    Empty,
    Valid,
}

/// Index entry for one `(cell, transaction_id)` key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexRecord {
    pub status: RecordStatus,
    pub location: BlobLocation,
}

impl IndexRecord {
    pub const fn valid(location: BlobLocation) -> Self {
        Self {
            status: RecordStatus::Valid,
            location,
        }
    }

    pub fn empty() -> Self {
        Self {
            status: RecordStatus::Empty,
            location: BlobLocation::default(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == RecordStatus::Valid
    }

    pub fn is_empty(&self) -> bool {
        self.status == RecordStatus::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_file_name_roundtrip() {
        let id = BlobId::new(12);
        assert_eq!(id.file_name(), "plate_12.blob");
        assert_eq!(BlobId::from_file_name("plate_12.blob"), Some(id));
    }

    #[test]
    fn blob_file_name_rejects_other_files() {
        assert_eq!(BlobId::from_file_name("plate.json"), None);
        assert_eq!(BlobId::from_file_name("plate_x.blob"), None);
        assert_eq!(BlobId::from_file_name("index.journal"), None);
    }

    #[test]
    fn empty_record_is_not_valid() {
        let record = IndexRecord::empty();
        assert!(record.is_empty());
        assert!(!record.is_valid());
    }

    #[test]
    fn valid_record_keeps_location() {
        let loc = BlobLocation::new(BlobId::new(2), 4096);
        let record = IndexRecord::valid(loc);
        assert!(record.is_valid());
        assert_eq!(record.location, loc);
        assert_eq!(loc.to_string(), "blob 2 @ 4096");
    }
}
