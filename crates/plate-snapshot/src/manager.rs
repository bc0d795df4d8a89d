use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use plate_file::{PlateFile, PlateResult, WorkQueue};
use plate_tile::{composite_under, supersample_crop, CompositeMode, Tile};
use plate_types::{TileCell, TileHeader, TileRegion, TileVersion, TransactionId};
use tracing::{debug, info, warn};

use crate::cache::{TileCache, TileCacheKey};
use crate::config::{SnapshotConfig, DEFAULT_WORK_UNIT_SIZE};
use crate::error::{SnapshotError, SnapshotResult};
use crate::leaf::{history, is_leaf_at};

/// Headers contributing to one target cell, keyed by the transaction that
/// wrote them.
pub type RunningVersions = BTreeMap<TransactionId, TileHeader>;

/// Result of a [`SnapshotManager::compact`] run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Transaction the consolidated tiles were written under.
    pub transaction_id: TransactionId,
    pub start: TransactionId,
    pub end: TransactionId,
    pub tiles_updated: usize,
}

/// Consolidates tile history into one renderable tile per cell.
///
/// For every cell of a target level inside a region, the versions written
/// in `[start, end]` are layered newest on top, with coarser ancestor data
/// supersampled underneath to fill the gaps. The result is written under a
/// separate `write_tid`, leaving the history itself untouched.
pub struct SnapshotManager {
    plate: Arc<PlateFile>,
    config: SnapshotConfig,
}

impl SnapshotManager {
    pub fn new(plate: Arc<PlateFile>, config: SnapshotConfig) -> SnapshotResult<Self> {
        config.validate()?;
        Ok(Self { plate, config })
    }

    pub fn plate(&self) -> &Arc<PlateFile> {
        &self.plate
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Snapshot every cell of `level` inside `region`.
    ///
    /// The region is clipped to the level's extent and split into square
    /// work units that each walk the pyramid from the root. Returns the
    /// number of tiles written.
    pub fn snapshot(
        &self,
        level: u8,
        region: TileRegion,
        start: TransactionId,
        end: TransactionId,
        write_tid: TransactionId,
    ) -> SnapshotResult<usize> {
        self.check_level(level)?;
        let Some(region) = region.intersection(&TileRegion::full_level(level)) else {
            debug!(%region, level, "snapshot region lies outside the level");
            return Ok(0);
        };
        self.warn_open_transactions(start, end, write_tid)?;
        let pass = self.pass(level, start, end, write_tid);
        self.snapshot_region(&pass, region)
    }

    /// Snapshot every level of the pyramid.
    pub fn full_snapshot(&self, start: TransactionId, end: TransactionId, write_tid: TransactionId) -> SnapshotResult<usize> {
        self.warn_open_transactions(start, end, write_tid)?;
        let cache = Arc::new(TileCache::with_capacity(self.config.cache_capacity));
        let mut updated = 0;
        for level in 0..self.plate.num_levels() {
            let extent = TileCell::extent(level);
            let unit = (extent / 16).max(DEFAULT_WORK_UNIT_SIZE);
            let pass = Pass {
                cache: Arc::clone(&cache),
                ..self.pass(level, start, end, write_tid)
            };
            let mut level_updated = 0;
            for region in TileRegion::full_level(level).subdivide(unit, unit)? {
                level_updated += self.snapshot_region(&pass, region)?;
            }
            info!(level, tiles = level_updated, "level snapshot complete");
            updated += level_updated;
        }
        let (hits, misses) = cache.stats();
        debug!(hits, misses, "snapshot cache");
        Ok(updated)
    }

    /// Consolidate `[start, end]` across the whole pyramid inside a fresh
    /// transaction and commit it.
    ///
    /// On failure the compaction transaction is left open and the error is
    /// returned.
    pub fn compact(&self, start: TransactionId, end: TransactionId, description: &str) -> SnapshotResult<SnapshotReport> {
        let write_tid = self.plate.transaction_request(description, &[])?;
        info!(transaction = %write_tid, %start, %end, "compaction started");
        let tiles_updated = match self.full_snapshot(start, end, write_tid) {
            Ok(n) => n,
            Err(e) => {
                warn!(transaction = %write_tid, error = %e, "compaction failed; transaction left open");
                return Err(e);
            }
        };
        self.plate.transaction_complete(write_tid)?;
        info!(transaction = %write_tid, tiles = tiles_updated, "compaction committed");
        Ok(SnapshotReport {
            transaction_id: write_tid,
            start,
            end,
            tiles_updated,
        })
    }

    /// Walk the subtree rooted at `cell`, carrying the versions found along
    /// the path from the root, and composite every cell of `target_level`
    /// inside `target_region`. Returns the number of tiles written.
    #[allow(clippy::too_many_arguments)]
    pub fn snapshot_helper(
        &self,
        cell: TileCell,
        running_versions: RunningVersions,
        target_region: TileRegion,
        target_level: u8,
        start: TransactionId,
        end: TransactionId,
        write_tid: TransactionId,
    ) -> SnapshotResult<usize> {
        self.check_level(target_level)?;
        let pass = self.pass(target_level, start, end, write_tid);
        Ok(pass.walk(cell, running_versions, target_region)?)
    }

    fn pass(&self, level: u8, start: TransactionId, end: TransactionId, write_tid: TransactionId) -> Pass {
        Pass {
            plate: Arc::clone(&self.plate),
            cache: Arc::new(TileCache::with_capacity(self.config.cache_capacity)),
            mode: self.config.composite_mode,
            level,
            start,
            end,
            write_tid,
        }
    }

    fn check_level(&self, level: u8) -> SnapshotResult<()> {
        let num_levels = self.plate.num_levels();
        if level >= num_levels {
            return Err(SnapshotError::LevelOutOfRange { level, num_levels });
        }
        Ok(())
    }

    fn warn_open_transactions(&self, start: TransactionId, end: TransactionId, write_tid: TransactionId) -> SnapshotResult<()> {
        for txn in self.plate.open_transactions()? {
            if txn.id != write_tid && txn.id >= start && txn.id <= end {
                warn!(
                    transaction = %txn.id,
                    description = %txn.description,
                    "snapshot range includes an open transaction; its tiles may be partial"
                );
            }
        }
        Ok(())
    }

    fn snapshot_region(&self, pass: &Pass, region: TileRegion) -> SnapshotResult<usize> {
        let size = self.config.work_unit_size;
        let units = region.subdivide(size, size)?;
        if self.config.threads <= 1 || units.len() <= 1 {
            let mut updated = 0;
            for unit in units {
                updated += pass.run_unit(unit)?;
            }
            return Ok(updated);
        }

        let queue = WorkQueue::new(self.config.threads, self.config.threads * 2)?;
        let updated = Arc::new(AtomicUsize::new(0));
        for unit in units {
            let pass = pass.clone();
            let updated = Arc::clone(&updated);
            queue.submit(move || {
                let n = pass.run_unit(unit)?;
                updated.fetch_add(n, Ordering::Relaxed);
                Ok(())
            })?;
        }
        queue.join().into_result()?;
        Ok(updated.load(Ordering::Relaxed))
    }
}

/// Everything one snapshot pass needs, cheap to clone into workers.
#[derive(Clone)]
struct Pass {
    plate: Arc<PlateFile>,
    cache: Arc<TileCache>,
    mode: CompositeMode,
    level: u8,
    start: TransactionId,
    end: TransactionId,
    write_tid: TransactionId,
}

impl Pass {
    fn run_unit(&self, unit: TileRegion) -> PlateResult<usize> {
        let updated = self.walk(TileCell::ROOT, RunningVersions::new(), unit)?;
        if updated > 0 {
            info!(region = %unit, level = self.level, tiles = updated, "snapshot unit");
        }
        Ok(updated)
    }

    fn walk(&self, cell: TileCell, mut running: RunningVersions, region: TileRegion) -> PlateResult<usize> {
        let found = history(&self.plate, cell, self.start, self.end, true)?;
        if found.is_empty() {
            return Ok(0);
        }

        for header in found {
            // Coarse tiles only contribute where nothing finer was written
            // by the same transaction.
            if cell.level == self.level || is_leaf_at(&self.plate, &header)? {
                running.insert(header.transaction_id, header);
            }
        }

        if cell.level == self.level {
            return self.composite(cell, running);
        }

        let mut updated = 0;
        for child in cell.children() {
            if child.footprint_at(self.level).intersects(&region) {
                updated += self.walk(child, running.clone(), region)?;
            }
        }
        Ok(updated)
    }

    fn composite(&self, cell: TileCell, mut running: RunningVersions) -> PlateResult<usize> {
        // The entry just before `start` was folded in by the previous pass.
        if running.len() >= 2 && running.keys().nth(1) == Some(&self.start) {
            running.pop_first();
        }
        if running.len() < 2 {
            return Ok(0);
        }
        if !history(&self.plate, cell, self.write_tid, self.write_tid, false)?.is_empty() {
            debug!(%cell, transaction = %self.write_tid, "already consolidated");
            return Ok(0);
        }

        let mut accumulated = self.plate.blank_tile()?;
        let mut merged = 0;
        for (i, header) in running.values().rev().enumerate() {
            let tile = match self.load(header) {
                Ok(tile) => tile,
                Err(e) if e.is_blob_io() => {
                    warn!(
                        %cell,
                        source = %header.cell,
                        transaction = %header.transaction_id,
                        error = %e,
                        "skipping unreadable layer"
                    );
                    if let Err(log_err) = self.plate.log(&format!("error reading tile from blob: {e}")) {
                        debug!(error = %log_err, "index log failed");
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            if i == 0 && header.cell.level == self.level && tile.is_opaque() {
                return Ok(0);
            }

            if header.cell.level == self.level {
                composite_under(&mut accumulated, &tile, self.mode)?;
            } else {
                let layer = supersample_crop(&tile, header.cell, cell)?;
                composite_under(&mut accumulated, &layer, self.mode)?;
            }
            merged += 1;

            if accumulated.is_opaque() {
                break;
            }
        }

        if merged == 0 {
            return Ok(0);
        }
        debug!(%cell, layers = merged, "compositing");
        self.plate.write_update_tile(cell, self.write_tid, &accumulated)?;
        Ok(1)
    }

    fn load(&self, header: &TileHeader) -> PlateResult<Arc<Tile>> {
        let key = TileCacheKey::new(header.cell, header.transaction_id);
        if let Some(tile) = self.cache.get(&key) {
            return Ok(tile);
        }
        let (_, tile) = self
            .plate
            .read_tile(header.cell, TileVersion::Exact(header.transaction_id))?;
        Ok(self.cache.insert(key, tile))
    }
}
