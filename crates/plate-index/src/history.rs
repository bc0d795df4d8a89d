use std::collections::BTreeMap;
use std::ops::Bound;

use plate_types::{IndexRecord, TileCell, TileHeader, TileVersion, TransactionId};
use serde::{Deserialize, Serialize};

/// One published version of a cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub header: TileHeader,
    pub record: IndexRecord,
}

/// Every version ever written for one cell, ordered by transaction id.
///
/// Entries are only ever inserted; nothing is replaced or removed.
#[derive(Clone, Debug, Default)]
pub struct CellHistory {
    entries: BTreeMap<TransactionId, HistoryEntry>,
}

impl CellHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Insert a new version. Returns `false` (and leaves the history
    /// untouched) if the transaction already has an entry.
    pub fn insert(&mut self, header: TileHeader, record: IndexRecord) -> bool {
        let id = header.transaction_id;
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, HistoryEntry { header, record });
        true
    }

    /// The entry a read bounded by `version` resolves to.
    pub fn resolve(&self, version: TileVersion) -> Option<&HistoryEntry> {
        match version {
            TileVersion::Latest => self.entries.values().next_back(),
            TileVersion::AtOrBefore(bound) => self.entries.range(..=bound).next_back().map(|(_, e)| e),
            TileVersion::Exact(id) => self.entries.get(&id),
        }
    }

    /// Headers with `start <= transaction_id <= end`, ascending, optionally
    /// preceded by the newest header strictly before `start`.
    pub fn search(&self, start: TransactionId, end: TransactionId, include_one_prior: bool) -> Vec<TileHeader> {
        let mut found = Vec::new();
        if include_one_prior {
            if let Some((_, prior)) = self
                .entries
                .range((Bound::Unbounded, Bound::Excluded(start)))
                .next_back()
            {
                found.push(prior.header.clone());
            }
        }
        if start <= end {
            found.extend(self.entries.range(start..=end).map(|(_, e)| e.header.clone()));
        }
        found
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.values()
    }
}

/// All cell histories of a platefile, ordered by cell.
#[derive(Clone, Debug, Default)]
pub struct HistoryMap {
    cells: BTreeMap<TileCell, CellHistory>,
    records: usize,
}

impl HistoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cell: &TileCell) -> Option<&CellHistory> {
        self.cells.get(cell)
    }

    pub fn contains_key(&self, cell: &TileCell, id: TransactionId) -> bool {
        self.cells.get(cell).is_some_and(|h| h.contains(id))
    }

    /// Insert a version for its header's cell. Returns `false` on a
    /// duplicate key.
    pub fn insert(&mut self, header: TileHeader, record: IndexRecord) -> bool {
        let inserted = self.cells.entry(header.cell).or_default().insert(header, record);
        if inserted {
            self.records += 1;
        }
        inserted
    }

    /// Total number of published records.
    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Every entry, by cell then transaction id.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.cells.values().flat_map(CellHistory::iter)
    }
}
