use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::header::{IndexHeader, HEADER_FILE};
use crate::local::LocalIndex;
use crate::protocol::{self, IndexCall, IndexRequest, IndexResponse, WireError};
use crate::traits::TileIndex;

/// Hosts platefile indexes and answers [`IndexRequest`]s against them.
///
/// Platefiles are addressed by their `platefile_id`. A service with a root
/// directory keeps each platefile in `<root>/<name>.plate`; without one,
/// created platefiles live in memory.
pub struct IndexService {
    root: Option<PathBuf>,
    config: IndexConfig,
    platefiles: RwLock<BTreeMap<u32, Arc<dyn TileIndex>>>,
}

impl IndexService {
    /// A service whose platefiles live in memory.
    pub fn in_memory(config: IndexConfig) -> Self {
        Self {
            root: None,
            config,
            platefiles: RwLock::new(BTreeMap::new()),
        }
    }

    /// A service rooted at `root`, hosting every platefile already there.
    pub fn open(root: &Path, config: IndexConfig) -> IndexResult<Self> {
        fs::create_dir_all(root)?;
        let service = Self {
            root: Some(root.to_path_buf()),
            config,
            platefiles: RwLock::new(BTreeMap::new()),
        };
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            if !path.join(HEADER_FILE).is_file() {
                continue;
            }
            match LocalIndex::open(&path, &service.config) {
                Ok(index) => {
                    service.host(Arc::new(index))?;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable platefile"),
            }
        }
        Ok(service)
    }

    /// Host an already opened index. Returns its platefile id.
    pub fn host(&self, index: Arc<dyn TileIndex>) -> IndexResult<u32> {
        let header = index.index_header()?;
        let mut platefiles = self.platefiles.write().expect("lock poisoned");
        if platefiles.contains_key(&header.platefile_id) {
            return Err(IndexError::PlatefileCreation(format!(
                "platefile id {} is already hosted",
                header.platefile_id
            )));
        }
        platefiles.insert(header.platefile_id, index);
        info!(platefile = %header.name, id = header.platefile_id, "platefile hosted");
        Ok(header.platefile_id)
    }

    /// Create and host a new platefile.
    pub fn create(&self, header: IndexHeader) -> IndexResult<IndexHeader> {
        header.validate()?;
        if self
            .platefiles
            .read()
            .expect("lock poisoned")
            .contains_key(&header.platefile_id)
        {
            return Err(IndexError::PlatefileCreation(format!(
                "platefile id {} already exists",
                header.platefile_id
            )));
        }
        let index: Arc<dyn TileIndex> = match &self.root {
            Some(root) => {
                let dir = root.join(format!("{}.plate", header.name));
                Arc::new(LocalIndex::create(&dir, header.clone(), &self.config)?)
            }
            None => Arc::new(LocalIndex::in_memory(header.clone(), &self.config)),
        };
        self.host(index)?;
        Ok(header)
    }

    /// Metadata of every hosted platefile, by id.
    pub fn list(&self) -> IndexResult<Vec<IndexHeader>> {
        let platefiles = self.platefiles.read().expect("lock poisoned");
        platefiles.values().map(|index| index.index_header()).collect()
    }

    /// Look up a hosted platefile.
    pub fn platefile(&self, platefile_id: u32) -> IndexResult<Arc<dyn TileIndex>> {
        self.platefiles
            .read()
            .expect("lock poisoned")
            .get(&platefile_id)
            .cloned()
            .ok_or_else(|| IndexError::InvalidPlatefile(format!("platefile id {platefile_id} is not open")))
    }

    /// Answer one request. Failures are returned as [`IndexResponse::Error`].
    pub fn handle(&self, request: IndexRequest) -> IndexResponse {
        let result = match request {
            IndexRequest::Create { header } => self.create(header).map(IndexResponse::Header),
            IndexRequest::List => self.list().map(IndexResponse::Headers),
            IndexRequest::Call { platefile_id, call } => {
                self.platefile(platefile_id).and_then(|index| dispatch(index.as_ref(), call))
            }
        };
        result.unwrap_or_else(|e| {
            debug!(error = %e, "index request failed");
            IndexResponse::Error(WireError::from(&e))
        })
    }

    /// Decode a request, answer it, and encode the response.
    pub fn handle_bytes(&self, request: &[u8]) -> IndexResult<Vec<u8>> {
        let response = match protocol::decode::<IndexRequest>(request) {
            Ok(request) => self.handle(request),
            Err(e) => IndexResponse::Error(WireError::from(&e)),
        };
        protocol::encode(&response)
    }
}

fn dispatch(index: &dyn TileIndex, call: IndexCall) -> IndexResult<IndexResponse> {
    Ok(match call {
        IndexCall::IndexHeader => IndexResponse::Header(index.index_header()?),
        IndexCall::ReadRequest { cell, version } => IndexResponse::Record(index.read_request(cell, version)?),
        IndexCall::WriteRequest { size_hint } => IndexResponse::BlobId(index.write_request(size_hint)?),
        IndexCall::WriteComplete { header, record } => {
            index.write_complete(&header, record)?;
            IndexResponse::Done
        }
        IndexCall::WriteCancel { blob_id } => {
            index.write_cancel(blob_id)?;
            IndexResponse::Done
        }
        IndexCall::TransactionRequest { description, headers } => {
            IndexResponse::TransactionId(index.transaction_request(&description, &headers)?)
        }
        IndexCall::RootComplete { id, headers } => {
            index.root_complete(id, &headers)?;
            IndexResponse::Done
        }
        IndexCall::TransactionComplete { id } => {
            index.transaction_complete(id)?;
            IndexResponse::Done
        }
        IndexCall::TransactionCursor => IndexResponse::TransactionId(index.transaction_cursor()?),
        IndexCall::Transaction { id } => IndexResponse::Transaction(index.transaction(id)?),
        IndexCall::OpenTransactions => IndexResponse::Transactions(index.open_transactions()?),
        IndexCall::SearchByLocation {
            cell,
            start,
            end,
            include_one_prior,
        } => IndexResponse::TileHeaders(index.search_by_location(cell, start, end, include_one_prior)?),
        IndexCall::AllRecords => {
            let mut records = Vec::new();
            index.for_each_record(&mut |h, r| records.push((h.clone(), *r)))?;
            IndexResponse::Records(records)
        }
        IndexCall::Log { message } => {
            index.log(&message)?;
            IndexResponse::Done
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str) -> IndexHeader {
        IndexHeader::new(name, 256, "raw", "rgba8", 6)
    }

    #[test]
    fn unknown_platefile_is_invalid() {
        let service = IndexService::in_memory(IndexConfig::default());
        let response = service.handle(IndexRequest::Call {
            platefile_id: 42,
            call: IndexCall::TransactionCursor,
        });
        assert!(matches!(response, IndexResponse::Error(WireError::InvalidPlatefile(_))));
    }

    #[test]
    fn create_existing_is_creation_error() {
        let service = IndexService::in_memory(IndexConfig::default());
        let h = header("moon");
        service.create(h.clone()).unwrap();
        assert!(matches!(service.create(h), Err(IndexError::PlatefileCreation(_))));
    }

    #[test]
    fn create_rejects_unaddressable_depth() {
        let service = IndexService::in_memory(IndexConfig::default());
        let deep = IndexHeader::new("deep", 256, "raw", "rgba8", 33);
        assert!(matches!(service.create(deep), Err(IndexError::PlatefileCreation(_))));
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn list_reports_hosted_platefiles() {
        let service = IndexService::in_memory(IndexConfig::default());
        service.create(header("a")).unwrap();
        service.create(header("b")).unwrap();
        let mut names: Vec<_> = service.list().unwrap().into_iter().map(|h| h.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn disk_service_reopens_platefiles() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let service = IndexService::open(dir.path(), IndexConfig::default()).unwrap();
            service.create(header("mars")).unwrap().platefile_id
        };
        let service = IndexService::open(dir.path(), IndexConfig::default()).unwrap();
        assert_eq!(service.platefile(id).unwrap().index_header().unwrap().name, "mars");
        assert!(dir.path().join("mars.plate").join(HEADER_FILE).exists());
    }

    #[test]
    fn garbage_request_gets_error_response() {
        let service = IndexService::in_memory(IndexConfig::default());
        let bytes = service.handle_bytes(&[0xFF; 3]).unwrap();
        let response: IndexResponse = protocol::decode(&bytes).unwrap();
        assert!(matches!(response, IndexResponse::Error(WireError::Rpc(_))));
    }
}
