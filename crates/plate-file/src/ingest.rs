use std::sync::Arc;

use plate_types::{TileCell, TileHeader, TransactionId};
use tracing::{info, warn};

use crate::config::QueueConfig;
use crate::error::{PlateError, PlateResult};
use crate::plate::PlateFile;
use crate::queue::WorkQueue;

/// Outcome of one ingestion transaction.
#[derive(Debug)]
pub struct IngestReport {
    pub transaction_id: TransactionId,
    /// Tiles stored successfully.
    pub written: usize,
    /// Errors from tiles that could not be stored.
    pub failures: Vec<PlateError>,
    /// `false` when a failure left the transaction open.
    pub committed: bool,
}

/// Writes a batch of tiles as one transaction, in parallel.
///
/// The transaction is committed only if every tile landed. Otherwise it is
/// left open, which holds the cursor back until an operator intervenes.
pub struct Ingestor {
    plate: Arc<PlateFile>,
    queue: QueueConfig,
}

impl Ingestor {
    pub fn new(plate: Arc<PlateFile>, queue: QueueConfig) -> Self {
        Self { plate, queue }
    }

    pub fn ingest(&self, description: &str, tiles: Vec<(TileCell, Vec<u8>)>) -> PlateResult<IngestReport> {
        let file_type = self.plate.default_file_type().to_string();
        let announced: Vec<TileHeader> = tiles
            .iter()
            .map(|(cell, _)| TileHeader::new(*cell, TransactionId::ZERO, file_type.clone()))
            .collect();
        let tid = self.plate.transaction_request(description, &announced)?;
        info!(transaction = %tid, tiles = tiles.len(), description, "ingest started");

        let queue = WorkQueue::from_config(&self.queue)?;
        let mut headers = Vec::with_capacity(tiles.len());
        for (cell, payload) in tiles {
            headers.push(TileHeader::new(cell, tid, file_type.clone()));
            let plate = Arc::clone(&self.plate);
            queue.submit(move || plate.write(cell, tid, &payload).map(|_| ()))?;
        }
        let report = queue.join();

        if !report.is_success() {
            warn!(
                transaction = %tid,
                written = report.completed,
                failed = report.failures.len(),
                "ingest incomplete; transaction left open"
            );
            return Ok(IngestReport {
                transaction_id: tid,
                written: report.completed,
                failures: report.failures,
                committed: false,
            });
        }

        self.plate.root_complete(tid, &headers)?;
        self.plate.transaction_complete(tid)?;
        info!(transaction = %tid, written = report.completed, "ingest committed");
        Ok(IngestReport {
            transaction_id: tid,
            written: report.completed,
            failures: Vec::new(),
            committed: true,
        })
    }
}
