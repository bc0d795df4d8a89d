use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transaction::TransactionId;

/// Which version of a cell a read should resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileVersion {
    /// The newest record, regardless of transaction state.
    Latest,
    /// The record with the greatest transaction id `<= T`.
    AtOrBefore(TransactionId),
    /// Only a record written by exactly `T`.
    Exact(TransactionId),
}

impl TileVersion {
    /// Build a bound from a transaction id and an exact-match flag.
    pub fn at(transaction_id: TransactionId, exact: bool) -> Self {
        if exact {
            TileVersion::Exact(transaction_id)
        } else {
            TileVersion::AtOrBefore(transaction_id)
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, TileVersion::Exact(_))
    }

    /// Returns `true` if a record written by `id` is eligible for this bound.
    pub fn admits(&self, id: TransactionId) -> bool {
        match self {
            TileVersion::Latest => true,
            TileVersion::AtOrBefore(bound) => id <= *bound,
            TileVersion::Exact(bound) => id == *bound,
        }
    }
}

impl fmt::Display for TileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileVersion::Latest => write!(f, "latest"),
            TileVersion::AtOrBefore(t) => write!(f, "<= {t}"),
            TileVersion::Exact(t) => write!(f, "== {t}"),
        }
    }
}
