use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use plate_blob::{BlobStore, FileBlobStore};
use plate_types::{BlobId, IndexRecord, TileCell, TileHeader, TileVersion, Transaction, TransactionId};
use tracing::{debug, info, warn};

use crate::blobs::BlobManager;
use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::header::{IndexHeader, HEADER_FILE};
use crate::history::HistoryMap;
use crate::journal::{IndexJournal, JournalEntry, JOURNAL_FILE};
use crate::traits::TileIndex;
use crate::transactions::TransactionLog;

struct IndexState {
    histories: HistoryMap,
    transactions: TransactionLog,
    journal: Option<IndexJournal>,
}

impl IndexState {
    fn record(&mut self, entry: &JournalEntry) -> IndexResult<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append(entry)?;
        }
        Ok(())
    }

    fn apply(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::TransactionRequested { transaction } => self.transactions.restore(transaction),
            JournalEntry::RootComplete { id, cells } => {
                if let Err(e) = self.transactions.root_complete(id, &cells) {
                    warn!(transaction = %id, error = %e, "skipping journal root-complete");
                }
            }
            JournalEntry::TransactionCommitted { id } => {
                if let Err(e) = self.transactions.complete(id) {
                    warn!(transaction = %id, error = %e, "skipping journal commit");
                }
            }
            JournalEntry::RecordWritten { header, record } => {
                let (cell, id) = (header.cell, header.transaction_id);
                if !self.histories.insert(header, record) {
                    warn!(cell = %cell, transaction = %id, "duplicate journal record");
                }
            }
        }
    }
}

/// In-process tile index.
///
/// All state sits behind one mutex. When opened on a directory every
/// mutation is journaled to `index.journal` before it becomes visible, and
/// the journal is replayed on open.
pub struct LocalIndex {
    header: IndexHeader,
    root: Option<PathBuf>,
    blobs: BlobManager,
    state: Mutex<IndexState>,
}

impl LocalIndex {
    /// Memory-only index. Nothing is persisted.
    pub fn in_memory(header: IndexHeader, config: &IndexConfig) -> Self {
        Self {
            header,
            root: None,
            blobs: BlobManager::new(config),
            state: Mutex::new(IndexState {
                histories: HistoryMap::new(),
                transactions: TransactionLog::new(),
                journal: None,
            }),
        }
    }

    /// Create a new platefile directory. Fails with `PlatefileCreation` if
    /// the directory already holds a platefile.
    pub fn create(dir: &Path, header: IndexHeader, config: &IndexConfig) -> IndexResult<Self> {
        header.validate()?;
        if dir.join(HEADER_FILE).exists() {
            return Err(IndexError::PlatefileCreation(format!(
                "{} already contains a platefile",
                dir.display()
            )));
        }
        fs::create_dir_all(dir)
            .map_err(|e| IndexError::PlatefileCreation(format!("{}: {e}", dir.display())))?;
        header
            .save(dir)
            .map_err(|e| IndexError::PlatefileCreation(format!("{}: {e}", dir.display())))?;
        info!(platefile = %header.name, id = header.platefile_id, path = %dir.display(), "platefile created");
        Self::open_with(dir, header, config)
    }

    /// Open an existing platefile directory and replay its journal.
    pub fn open(dir: &Path, config: &IndexConfig) -> IndexResult<Self> {
        let header = IndexHeader::load(dir)?;
        header
            .validate()
            .map_err(|e| IndexError::InvalidPlatefile(format!("{}: {e}", dir.display())))?;
        Self::open_with(dir, header, config)
    }

    fn open_with(dir: &Path, header: IndexHeader, config: &IndexConfig) -> IndexResult<Self> {
        let store = FileBlobStore::open(dir)?;
        let mut sizes = Vec::new();
        for id in store.blob_ids()? {
            if let Some(size) = store.blob_size(id)? {
                sizes.push((id, size));
            }
        }

        let (journal, entries) = IndexJournal::open(&dir.join(JOURNAL_FILE), config.sync_journal)?;
        let replayed = entries.len();
        let mut state = IndexState {
            histories: HistoryMap::new(),
            transactions: TransactionLog::new(),
            journal: None,
        };
        for entry in entries {
            state.apply(entry);
        }
        state.transactions.advance_cursor();
        state.journal = Some(journal);

        info!(
            platefile = %header.name,
            replayed,
            records = state.histories.record_count(),
            cursor = %state.transactions.cursor(),
            blobs = sizes.len(),
            "platefile opened"
        );

        Ok(Self {
            header,
            root: Some(dir.to_path_buf()),
            blobs: BlobManager::with_sizes(config, sizes),
            state: Mutex::new(state),
        })
    }

    /// Platefile directory, if the index is persisted.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Number of published records.
    pub fn record_count(&self) -> usize {
        self.lock().histories.record_count()
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().expect("index mutex poisoned")
    }
}

impl TileIndex for LocalIndex {
    fn index_header(&self) -> IndexResult<IndexHeader> {
        Ok(self.header.clone())
    }

    fn read_request(&self, cell: TileCell, version: TileVersion) -> IndexResult<IndexRecord> {
        let state = self.lock();
        let found = state.histories.get(&cell).and_then(|h| h.resolve(version));
        match found {
            Some(entry) => Ok(entry.record),
            None if version.is_exact() => Err(IndexError::TileNotFound { cell, version }),
            None => Ok(IndexRecord::empty()),
        }
    }

    fn write_request(&self, size_hint: u64) -> IndexResult<BlobId> {
        self.blobs.request(size_hint)
    }

    fn write_complete(&self, header: &TileHeader, record: IndexRecord) -> IndexResult<()> {
        if !self.blobs.complete(record.location.blob_id) {
            debug!(blob = %record.location.blob_id, "write completed without a reservation");
        }

        let mut state = self.lock();
        state.transactions.check_open(header.transaction_id)?;
        if state.histories.contains_key(&header.cell, header.transaction_id) {
            return Err(IndexError::RecordExists {
                cell: header.cell,
                transaction_id: header.transaction_id,
            });
        }
        state.record(&JournalEntry::RecordWritten {
            header: header.clone(),
            record,
        })?;
        state.histories.insert(header.clone(), record);
        debug!(cell = %header.cell, transaction = %header.transaction_id, location = %record.location, "record published");
        Ok(())
    }

    fn write_cancel(&self, blob_id: BlobId) -> IndexResult<()> {
        if !self.blobs.cancel(blob_id) {
            debug!(blob = %blob_id, "cancel without a reservation");
        }
        Ok(())
    }

    fn transaction_request(&self, description: &str, headers: &[TileHeader]) -> IndexResult<TransactionId> {
        let cells = headers.iter().map(|h| h.cell).collect();
        let mut state = self.lock();
        let txn = state.transactions.request(description, cells);
        if let Err(e) = state.record(&JournalEntry::TransactionRequested {
            transaction: txn.clone(),
        }) {
            // The id stays allocated but unusable; it will block the cursor
            // exactly like an abandoned transaction.
            warn!(transaction = %txn.id, error = %e, "transaction request not journaled");
            return Err(e);
        }
        Ok(txn.id)
    }

    fn root_complete(&self, id: TransactionId, headers: &[TileHeader]) -> IndexResult<()> {
        let cells: Vec<TileCell> = headers.iter().map(|h| h.cell).collect();
        let mut state = self.lock();
        state.transactions.check_open(id)?;
        state.record(&JournalEntry::RootComplete { id, cells: cells.clone() })?;
        state.transactions.root_complete(id, &cells)
    }

    fn transaction_complete(&self, id: TransactionId) -> IndexResult<()> {
        let mut state = self.lock();
        match state.transactions.get(id) {
            None => return Err(IndexError::invalid_transaction(id, "never issued")),
            Some(txn) if !txn.is_open() => {
                warn!(transaction = %id, "transaction already committed; ignoring");
                return Ok(());
            }
            Some(_) => {}
        }
        state.record(&JournalEntry::TransactionCommitted { id })?;
        state.transactions.complete(id)?;
        Ok(())
    }

    fn transaction_cursor(&self) -> IndexResult<TransactionId> {
        Ok(self.lock().transactions.cursor())
    }

    fn transaction(&self, id: TransactionId) -> IndexResult<Option<Transaction>> {
        Ok(self.lock().transactions.get(id).cloned())
    }

    fn open_transactions(&self) -> IndexResult<Vec<Transaction>> {
        Ok(self.lock().transactions.open())
    }

    fn search_by_location(
        &self,
        cell: TileCell,
        start: TransactionId,
        end: TransactionId,
        include_one_prior: bool,
    ) -> IndexResult<Vec<TileHeader>> {
        let state = self.lock();
        match state.histories.get(&cell) {
            Some(history) if !history.is_empty() => Ok(history.search(start, end, include_one_prior)),
            _ => Err(IndexError::TileNotFound {
                cell,
                version: TileVersion::Latest,
            }),
        }
    }

    fn for_each_record(&self, visitor: &mut dyn FnMut(&TileHeader, &IndexRecord)) -> IndexResult<()> {
        let state = self.lock();
        for entry in state.histories.iter() {
            visitor(&entry.header, &entry.record);
        }
        Ok(())
    }

    fn log(&self, message: &str) -> IndexResult<()> {
        info!(platefile = %self.header.name, "{message}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plate_types::BlobLocation;
    use std::sync::Arc;
    use std::thread;

    fn header() -> IndexHeader {
        IndexHeader::new("test", 256, "raw", "rgba8", 8)
    }

    fn index() -> LocalIndex {
        LocalIndex::in_memory(header(), &IndexConfig::default())
    }

    fn tile(col: u32, row: u32, level: u8, tid: TransactionId) -> TileHeader {
        TileHeader::new(TileCell::new(col, row, level), tid, "raw")
    }

    fn publish(index: &LocalIndex, header: &TileHeader, offset: u64) -> IndexRecord {
        let blob = index.write_request(10).unwrap();
        let record = IndexRecord::valid(BlobLocation::new(blob, offset));
        index.write_complete(header, record).unwrap();
        record
    }

    #[test]
    fn three_tile_transaction_moves_cursor() {
        let index = index();
        let t = index.transaction_request("ingest", &[]).unwrap();
        let tiles: Vec<_> = (0..3).map(|c| tile(c, 0, 2, t)).collect();
        for (i, h) in tiles.iter().enumerate() {
            publish(&index, h, i as u64 * 100);
        }
        index.root_complete(t, &tiles).unwrap();
        index.transaction_complete(t).unwrap();

        let cursor = index.transaction_cursor().unwrap();
        assert_eq!(cursor, t);
        for h in &tiles {
            assert!(index.read_request(h.cell, TileVersion::AtOrBefore(cursor)).unwrap().is_valid());
        }
        let elsewhere = index
            .read_request(TileCell::new(3, 0, 2), TileVersion::AtOrBefore(cursor))
            .unwrap();
        assert!(elsewhere.is_empty());
    }

    #[test]
    fn exact_miss_is_tile_not_found() {
        let index = index();
        let t = index.transaction_request("w", &[]).unwrap();
        publish(&index, &tile(0, 0, 0, t), 0);
        let err = index
            .read_request(TileCell::ROOT, TileVersion::Exact(t.next()))
            .unwrap_err();
        assert!(err.is_tile_not_found());
        assert!(index.read_request(TileCell::ROOT, TileVersion::Exact(t)).unwrap().is_valid());
    }

    #[test]
    fn write_to_unissued_or_committed_transaction_fails() {
        let index = index();
        let bogus = tile(0, 0, 0, TransactionId::new(99));
        let blob = index.write_request(1).unwrap();
        let err = index
            .write_complete(&bogus, IndexRecord::valid(BlobLocation::new(blob, 0)))
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidTransaction { .. }));

        let t = index.transaction_request("w", &[]).unwrap();
        index.transaction_complete(t).unwrap();
        let blob = index.write_request(1).unwrap();
        let err = index
            .write_complete(&tile(0, 0, 0, t), IndexRecord::valid(BlobLocation::new(blob, 0)))
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidTransaction { .. }));
        // The failed publishes released their reservations.
        assert_eq!(index.write_request(1).unwrap(), BlobId::new(0));
    }

    #[test]
    fn same_key_is_rejected() {
        let index = index();
        let t = index.transaction_request("w", &[]).unwrap();
        let first = publish(&index, &tile(1, 1, 1, t), 0);
        let blob = index.write_request(1).unwrap();
        let err = index
            .write_complete(&tile(1, 1, 1, t), IndexRecord::valid(BlobLocation::new(blob, 500)))
            .unwrap_err();
        assert!(matches!(err, IndexError::RecordExists { .. }));
        let kept = index.read_request(TileCell::new(1, 1, 1), TileVersion::Latest).unwrap();
        assert_eq!(kept, first);
    }

    #[test]
    fn search_by_location_reports_unwritten_cell() {
        let index = index();
        let err = index
            .search_by_location(TileCell::ROOT, TransactionId::ZERO, TransactionId::MAX, false)
            .unwrap_err();
        assert!(err.is_tile_not_found());
    }

    #[test]
    fn search_by_location_includes_prior() {
        let index = index();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let t = index.transaction_request("w", &[]).unwrap();
            publish(&index, &tile(0, 0, 0, t), t.get());
            index.transaction_complete(t).unwrap();
            ids.push(t);
        }
        let found = index
            .search_by_location(TileCell::ROOT, ids[2], ids[3], true)
            .unwrap();
        let tids: Vec<_> = found.iter().map(|h| h.transaction_id).collect();
        assert_eq!(tids, vec![ids[1], ids[2], ids[3]]);
    }

    #[test]
    fn abandoned_transaction_stalls_cursor() {
        let index = index();
        let a = index.transaction_request("abandoned", &[]).unwrap();
        let b = index.transaction_request("finished", &[]).unwrap();
        index.transaction_complete(b).unwrap();
        assert_eq!(index.transaction_cursor().unwrap(), TransactionId::ZERO);
        let open = index.open_transactions().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, a);
        index.transaction_complete(a).unwrap();
        assert_eq!(index.transaction_cursor().unwrap(), b);
    }

    #[test]
    fn for_each_record_visits_everything() {
        let index = index();
        let t = index.transaction_request("w", &[]).unwrap();
        publish(&index, &tile(1, 0, 1, t), 0);
        publish(&index, &tile(0, 0, 1, t), 1);
        let mut seen = Vec::new();
        index
            .for_each_record(&mut |h, _| seen.push(h.cell))
            .unwrap();
        assert_eq!(seen, vec![TileCell::new(0, 0, 1), TileCell::new(1, 0, 1)]);
    }

    #[test]
    fn concurrent_writers_publish_disjoint_cells() {
        let index = Arc::new(index());
        let t = index.transaction_request("parallel", &[]).unwrap();
        let handles: Vec<_> = (0..8u32)
            .map(|c| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for r in 0..16u32 {
                        publish(&index, &tile(c, r, 4, t), u64::from(r));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(index.record_count(), 8 * 16);
    }

    #[test]
    fn journal_replay_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mars.plate");
        let (committed, open, record) = {
            let index = LocalIndex::create(&path, header(), &IndexConfig::default()).unwrap();
            let t1 = index.transaction_request("first", &[]).unwrap();
            let record = publish(&index, &tile(0, 0, 0, t1), 0);
            index.root_complete(t1, &[tile(0, 0, 0, t1)]).unwrap();
            index.transaction_complete(t1).unwrap();
            let t2 = index.transaction_request("second", &[]).unwrap();
            (t1, t2, record)
        };

        let index = LocalIndex::open(&path, &IndexConfig::default()).unwrap();
        assert_eq!(index.transaction_cursor().unwrap(), committed);
        assert_eq!(
            index.read_request(TileCell::ROOT, TileVersion::Latest).unwrap(),
            record
        );
        let open_ids: Vec<_> = index.open_transactions().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(open_ids, vec![open]);
        assert_eq!(index.transaction_request("third", &[]).unwrap(), open.next());
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        LocalIndex::create(dir.path(), header(), &IndexConfig::default()).unwrap();
        let err = LocalIndex::create(dir.path(), header(), &IndexConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, IndexError::PlatefileCreation(_)));
    }

    #[test]
    fn create_rejects_unaddressable_depth() {
        let dir = tempfile::tempdir().unwrap();
        let deep = IndexHeader::new("deep", 256, "raw", "rgba8", 70);
        let err = LocalIndex::create(dir.path(), deep, &IndexConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, IndexError::PlatefileCreation(_)));
        assert!(!dir.path().join(HEADER_FILE).exists());
    }

    #[test]
    fn open_rejects_edited_depth() {
        let dir = tempfile::tempdir().unwrap();
        IndexHeader::new("deep", 256, "raw", "rgba8", 40).save(dir.path()).unwrap();
        let err = LocalIndex::open(dir.path(), &IndexConfig::default()).err().unwrap();
        assert!(matches!(err, IndexError::InvalidPlatefile(_)));
    }

    #[test]
    fn open_missing_platefile_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalIndex::open(dir.path(), &IndexConfig::default()).err().unwrap();
        assert!(matches!(err, IndexError::InvalidPlatefile(_)));
    }
}
