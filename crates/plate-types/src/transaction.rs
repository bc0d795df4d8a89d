use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cell::TileCell;

/// Monotonic unit-of-work identifier, assigned only by the tile index.
///
/// Issued ids start at 1; [`TransactionId::ZERO`] is the cursor of a
/// platefile in which nothing has been committed yet.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub const ZERO: TransactionId = TransactionId(0);
    pub const MAX: TransactionId = TransactionId(u64::MAX);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for TransactionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Issued; writes may be in flight.
    Requested,
    /// All first-pass (non-derived) writes have landed.
    RootComplete,
    /// Durable and visible to cursor-pinned readers.
    Committed,
}

impl TransactionState {
    pub fn is_open(&self) -> bool {
        !matches!(self, TransactionState::Committed)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Requested => write!(f, "requested"),
            TransactionState::RootComplete => write!(f, "root-complete"),
            TransactionState::Committed => write!(f, "committed"),
        }
    }
}

/// A unit of work grouping a set of tile writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub description: String,
    pub state: TransactionState,
    /// Cells the writer announced it would touch.
    pub cells: Vec<TileCell>,
    pub requested_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(id: TransactionId, description: impl Into<String>, cells: Vec<TileCell>) -> Self {
        Self {
            id,
            description: description.into(),
            state: TransactionState::Requested,
            cells,
            requested_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Returns `true` if the writer announced this cell or one of its
    /// ancestors/descendants.
    pub fn touches(&self, cell: &TileCell) -> bool {
        self.cells
            .iter()
            .any(|c| c == cell || c.is_ancestor_of(cell) || cell.is_ancestor_of(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_numerically() {
        assert!(TransactionId::new(2) < TransactionId::new(10));
        assert_eq!(TransactionId::new(4).next(), TransactionId::new(5));
        assert_eq!(TransactionId::default(), TransactionId::ZERO);
    }

    #[test]
    fn new_transaction_is_requested() {
        let txn = Transaction::new(TransactionId::new(1), "import", vec![]);
        assert_eq!(txn.state, TransactionState::Requested);
        assert!(txn.is_open());
    }

    #[test]
    fn committed_is_not_open() {
        assert!(TransactionState::Requested.is_open());
        assert!(TransactionState::RootComplete.is_open());
        assert!(!TransactionState::Committed.is_open());
    }

    #[test]
    fn touches_related_cells() {
        let txn = Transaction::new(
            TransactionId::new(3),
            "strip",
            vec![TileCell::new(1, 1, 2)],
        );
        assert!(txn.touches(&TileCell::new(1, 1, 2)));
        assert!(txn.touches(&TileCell::ROOT));
        assert!(txn.touches(&TileCell::new(2, 3, 3)));
        assert!(!txn.touches(&TileCell::new(3, 3, 2)));
    }

    #[test]
    fn serde_json_roundtrip() {
        let txn = Transaction::new(TransactionId::new(9), "json", vec![TileCell::ROOT]);
        let json = serde_json::to_string(&txn).unwrap();
        let decoded: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, txn);
    }
}
