use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;
use plate_tile::Tile;
use plate_types::{TileCell, TransactionId};

/// Identifies one decoded tile version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub cell: TileCell,
    pub transaction_id: TransactionId,
}

impl TileCacheKey {
    pub fn new(cell: TileCell, transaction_id: TransactionId) -> Self {
        Self { cell, transaction_id }
    }
}

/// Bounded LRU cache of decoded tiles, shared by the workers of one pass.
///
/// Compaction reads the same coarse ancestors once for every cell beneath
/// them, so a small cache removes most blob reads.
pub struct TileCache {
    capacity: usize,
    // `None` when caching is disabled.
    tiles: Option<Mutex<LruCache<TileCacheKey, Arc<Tile>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TileCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            tiles: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &TileCacheKey) -> Option<Arc<Tile>> {
        let found = self
            .tiles
            .as_ref()
            .and_then(|tiles| tiles.lock().expect("lock poisoned").get(key).cloned());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert a tile, evicting the least recently used entry beyond
    /// capacity. Returns the shared handle.
    pub fn insert(&self, key: TileCacheKey, tile: Tile) -> Arc<Tile> {
        let tile = Arc::new(tile);
        if let Some(tiles) = &self.tiles {
            tiles.lock().expect("lock poisoned").put(key, Arc::clone(&tile));
        }
        tile
    }

    pub fn len(&self) -> usize {
        self.tiles
            .as_ref()
            .map_or(0, |tiles| tiles.lock().expect("lock poisoned").len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}
