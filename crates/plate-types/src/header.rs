use serde::{Deserialize, Serialize};

use crate::cell::TileCell;
use crate::transaction::TransactionId;

/// Identity of one stored tile version.
///
/// Written in front of every payload in the blob store and recorded in the
/// index history. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileHeader {
    /// Quad-tree address of the tile.
    pub cell: TileCell,
    /// Transaction that wrote this version.
    pub transaction_id: TransactionId,
    /// Codec/format tag of the stored bytes (e.g. `"raw"`, `"png"`).
    pub payload_type: String,
}

impl TileHeader {
    pub fn new(cell: TileCell, transaction_id: TransactionId, payload_type: impl Into<String>) -> Self {
        Self {
            cell,
            transaction_id,
            payload_type: payload_type.into(),
        }
    }

    pub fn col(&self) -> u32 {
        self.cell.col
    }

    pub fn row(&self) -> u32 {
        self.cell.row
    }

    pub fn level(&self) -> u8 {
        self.cell.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_mirror_cell() {
        let header = TileHeader::new(TileCell::new(3, 4, 5), TransactionId::new(7), "raw");
        assert_eq!(header.col(), 3);
        assert_eq!(header.row(), 4);
        assert_eq!(header.level(), 5);
        assert_eq!(header.transaction_id.get(), 7);
    }

    #[test]
    fn bincode_roundtrip() {
        let header = TileHeader::new(TileCell::new(1, 0, 1), TransactionId::new(20), "png");
        let bytes = bincode::serialize(&header).unwrap();
        let decoded: TileHeader = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, header);
    }
}
