//! Snapshot compaction for platefiles.
//!
//! A platefile keeps every version of every tile. Rendering wants one tile
//! per cell, so [`SnapshotManager`] periodically folds the versions written
//! in a transaction range into a consolidated tile written under its own
//! transaction:
//!
//! ```text
//! newest version at the cell        ┐
//! older versions at the cell        ├─ composited newest on top
//! supersampled coarser ancestors    ┘
//! ```
//!
//! Compaction only ever appends. Rerunning a pass with the same write
//! transaction skips cells it already consolidated.

pub mod cache;
pub mod config;
pub mod error;
pub mod leaf;
pub mod manager;

pub use cache::{TileCache, TileCacheKey};
pub use config::{SnapshotConfig, DEFAULT_WORK_UNIT_SIZE};
pub use error::{SnapshotError, SnapshotResult};
pub use leaf::{history, is_leaf, is_leaf_at};
pub use manager::{RunningVersions, SnapshotManager, SnapshotReport};
