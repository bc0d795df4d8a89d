use std::collections::BTreeMap;

use plate_types::{TileCell, Transaction, TransactionId, TransactionState};
use tracing::{debug, info, warn};

use crate::error::{IndexError, IndexResult};

/// What a `transaction_complete` call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// The transaction was committed; the cursor moved from `from` to `to`.
    Committed { from: TransactionId, to: TransactionId },
    /// The transaction was already committed; nothing changed.
    AlreadyCommitted,
}

/// Transaction id allocation, lifecycle, and the read cursor.
#[derive(Clone, Debug)]
pub struct TransactionLog {
    next_id: TransactionId,
    transactions: BTreeMap<TransactionId, Transaction>,
    cursor: TransactionId,
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            next_id: TransactionId::new(1),
            transactions: BTreeMap::new(),
            cursor: TransactionId::ZERO,
        }
    }

    pub fn cursor(&self) -> TransactionId {
        self.cursor
    }

    /// The id the next `request` will return.
    pub fn next_id(&self) -> TransactionId {
        self.next_id
    }

    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    /// Allocate the next id and mark it `Requested`.
    pub fn request(&mut self, description: &str, cells: Vec<TileCell>) -> Transaction {
        let id = self.next_id;
        self.next_id = id.next();
        let txn = Transaction::new(id, description, dedup(cells));
        self.transactions.insert(id, txn.clone());
        info!(transaction = %id, description, "transaction requested");
        txn
    }

    /// Re-insert a transaction read back from the journal.
    pub fn restore(&mut self, txn: Transaction) {
        if txn.id >= self.next_id {
            self.next_id = txn.id.next();
        }
        self.transactions.insert(txn.id, txn);
    }

    /// Fails unless `id` was issued and is still open.
    pub fn check_open(&self, id: TransactionId) -> IndexResult<&Transaction> {
        match self.transactions.get(&id) {
            None => Err(IndexError::invalid_transaction(id, "never issued")),
            Some(txn) if !txn.is_open() => Err(IndexError::invalid_transaction(id, "already committed")),
            Some(txn) => Ok(txn),
        }
    }

    /// Mark the first-pass writes of `id` as landed.
    pub fn root_complete(&mut self, id: TransactionId, cells: &[TileCell]) -> IndexResult<()> {
        self.check_open(id)?;
        let txn = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| IndexError::invalid_transaction(id, "never issued"))?;
        for cell in cells {
            if !txn.cells.contains(cell) {
                txn.cells.push(*cell);
            }
        }
        if txn.state == TransactionState::RootComplete {
            debug!(transaction = %id, "root already complete");
        } else {
            txn.state = TransactionState::RootComplete;
            info!(transaction = %id, "root complete");
        }
        Ok(())
    }

    /// Commit `id` and advance the cursor over the contiguous run of
    /// committed ids that follows it.
    pub fn complete(&mut self, id: TransactionId) -> IndexResult<CompleteOutcome> {
        let txn = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| IndexError::invalid_transaction(id, "never issued"))?;
        if !txn.is_open() {
            warn!(transaction = %id, "transaction already committed; ignoring");
            return Ok(CompleteOutcome::AlreadyCommitted);
        }
        txn.state = TransactionState::Committed;

        let from = self.cursor;
        self.advance_cursor();
        let to = self.cursor;
        info!(transaction = %id, cursor = %to, "transaction committed");
        if to < id {
            if let Some(blocker) = self.first_open() {
                warn!(
                    transaction = %id,
                    blocked_by = %blocker.id,
                    description = %blocker.description,
                    "cursor stalled behind open transaction"
                );
            }
        }
        Ok(CompleteOutcome::Committed { from, to })
    }

    /// Move the cursor forward while the next id is committed.
    pub fn advance_cursor(&mut self) {
        loop {
            let candidate = self.cursor.next();
            match self.transactions.get(&candidate) {
                Some(txn) if !txn.is_open() => self.cursor = candidate,
                _ => break,
            }
        }
    }

    /// The oldest transaction that has not committed.
    pub fn first_open(&self) -> Option<&Transaction> {
        self.transactions.values().find(|t| t.is_open())
    }

    /// Every transaction not yet committed, ascending by id.
    pub fn open(&self) -> Vec<Transaction> {
        self.transactions.values().filter(|t| t.is_open()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

fn dedup(mut cells: Vec<TileCell>) -> Vec<TileCell> {
    cells.sort();
    cells.dedup();
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t(n: u64) -> TransactionId {
        TransactionId::new(n)
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut log = TransactionLog::new();
        assert_eq!(log.cursor(), TransactionId::ZERO);
        assert_eq!(log.request("a", vec![]).id, t(1));
        assert_eq!(log.request("b", vec![]).id, t(2));
        assert_eq!(log.next_id(), t(3));
    }

    #[test]
    fn cursor_advances_over_contiguous_commits() {
        let mut log = TransactionLog::new();
        for _ in 0..3 {
            log.request("w", vec![]);
        }
        log.complete(t(1)).unwrap();
        assert_eq!(log.cursor(), t(1));
        log.complete(t(3)).unwrap();
        assert_eq!(log.cursor(), t(1), "open txn 2 must block the cursor");
        let outcome = log.complete(t(2)).unwrap();
        assert_eq!(outcome, CompleteOutcome::Committed { from: t(1), to: t(3) });
        assert_eq!(log.cursor(), t(3));
    }

    #[test]
    fn duplicate_complete_is_ignored() {
        let mut log = TransactionLog::new();
        log.request("w", vec![]);
        log.complete(t(1)).unwrap();
        assert_eq!(log.complete(t(1)).unwrap(), CompleteOutcome::AlreadyCommitted);
        assert_eq!(log.cursor(), t(1));
    }

    #[test]
    fn unknown_transaction_is_rejected() {
        let mut log = TransactionLog::new();
        assert!(matches!(log.complete(t(5)), Err(IndexError::InvalidTransaction { .. })));
        assert!(log.root_complete(t(5), &[]).is_err());
        assert!(log.check_open(t(5)).is_err());
    }

    #[test]
    fn root_complete_merges_cells() {
        let mut log = TransactionLog::new();
        let a = TileCell::new(0, 0, 1);
        let b = TileCell::new(1, 0, 1);
        log.request("w", vec![a, a]);
        log.root_complete(t(1), &[a, b]).unwrap();
        let txn = log.get(t(1)).unwrap();
        assert_eq!(txn.state, TransactionState::RootComplete);
        assert_eq!(txn.cells, vec![a, b]);
        log.complete(t(1)).unwrap();
        assert!(log.root_complete(t(1), &[]).is_err());
    }

    #[test]
    fn open_lists_uncommitted() {
        let mut log = TransactionLog::new();
        log.request("a", vec![]);
        log.request("b", vec![]);
        log.complete(t(1)).unwrap();
        let open: Vec<_> = log.open().into_iter().map(|t| t.id).collect();
        assert_eq!(open, vec![t(2)]);
        assert_eq!(log.first_open().map(|t| t.id), Some(t(2)));
    }

    proptest! {
        #[test]
        fn cursor_never_passes_open_transaction(order in Just((1u64..=12).collect::<Vec<_>>()).prop_shuffle(), commits in 0usize..=12) {
            let mut log = TransactionLog::new();
            for _ in 0..12 {
                log.request("w", vec![]);
            }
            let mut last = log.cursor();
            for id in order.into_iter().take(commits) {
                log.complete(t(id)).unwrap();
                let cursor = log.cursor();
                prop_assert!(cursor >= last);
                if let Some(open) = log.first_open() {
                    prop_assert!(cursor < open.id);
                }
                last = cursor;
            }
        }
    }
}
