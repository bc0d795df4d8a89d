use std::sync::Arc;

use plate_types::{BlobId, IndexRecord, TileCell, TileHeader, TileVersion, Transaction, TransactionId};
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::header::IndexHeader;
use crate::protocol::{self, IndexCall, IndexRequest, IndexResponse};
use crate::service::IndexService;
use crate::traits::TileIndex;

/// Moves encoded requests to an index service and returns its reply.
pub trait IndexTransport: Send + Sync {
    fn round_trip(&self, request: &[u8]) -> IndexResult<Vec<u8>>;
}

/// Transport that calls an in-process [`IndexService`] directly.
#[derive(Clone)]
pub struct LoopbackTransport {
    service: Arc<IndexService>,
}

impl LoopbackTransport {
    pub fn new(service: Arc<IndexService>) -> Self {
        Self { service }
    }
}

impl IndexTransport for LoopbackTransport {
    fn round_trip(&self, request: &[u8]) -> IndexResult<Vec<u8>> {
        self.service.handle_bytes(request)
    }
}

fn send<T: IndexTransport + ?Sized>(transport: &T, request: &IndexRequest) -> IndexResult<IndexResponse> {
    let bytes = protocol::encode(request)?;
    let reply = transport.round_trip(&bytes).map_err(|e| match e {
        IndexError::Rpc(_) => e,
        other => IndexError::Rpc(other.to_string()),
    })?;
    match protocol::decode::<IndexResponse>(&reply)? {
        IndexResponse::Error(wire) => Err(wire.into()),
        response => Ok(response),
    }
}

fn unexpected(response: IndexResponse) -> IndexError {
    IndexError::Rpc(format!("unexpected response: {response:?}"))
}

/// Create a platefile on the service behind `transport`.
pub fn create_platefile<T: IndexTransport + ?Sized>(transport: &T, header: IndexHeader) -> IndexResult<IndexHeader> {
    match send(transport, &IndexRequest::Create { header })? {
        IndexResponse::Header(h) => Ok(h),
        other => Err(unexpected(other)),
    }
}

/// List the platefiles hosted by the service behind `transport`.
pub fn list_platefiles<T: IndexTransport + ?Sized>(transport: &T) -> IndexResult<Vec<IndexHeader>> {
    match send(transport, &IndexRequest::List)? {
        IndexResponse::Headers(h) => Ok(h),
        other => Err(unexpected(other)),
    }
}

/// [`TileIndex`] client for a platefile hosted on an index service.
pub struct RemoteIndex<T> {
    transport: T,
    platefile_id: u32,
}

impl<T: IndexTransport> RemoteIndex<T> {
    /// Attach to a hosted platefile. Fails with `InvalidPlatefile` if the
    /// service does not know the id.
    pub fn connect(transport: T, platefile_id: u32) -> IndexResult<Self> {
        let index = Self {
            transport,
            platefile_id,
        };
        let header = index.index_header()?;
        debug!(platefile = %header.name, id = platefile_id, "connected to remote index");
        Ok(index)
    }

    pub fn platefile_id(&self) -> u32 {
        self.platefile_id
    }

    fn call(&self, call: IndexCall) -> IndexResult<IndexResponse> {
        send(
            &self.transport,
            &IndexRequest::Call {
                platefile_id: self.platefile_id,
                call,
            },
        )
    }

    fn call_done(&self, call: IndexCall) -> IndexResult<()> {
        match self.call(call)? {
            IndexResponse::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn call_tid(&self, call: IndexCall) -> IndexResult<TransactionId> {
        match self.call(call)? {
            IndexResponse::TransactionId(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }
}

impl<T: IndexTransport> TileIndex for RemoteIndex<T> {
    fn index_header(&self) -> IndexResult<IndexHeader> {
        match self.call(IndexCall::IndexHeader)? {
            IndexResponse::Header(h) => Ok(h),
            other => Err(unexpected(other)),
        }
    }

    fn read_request(&self, cell: TileCell, version: TileVersion) -> IndexResult<IndexRecord> {
        match self.call(IndexCall::ReadRequest { cell, version })? {
            IndexResponse::Record(r) => Ok(r),
            other => Err(unexpected(other)),
        }
    }

    fn write_request(&self, size_hint: u64) -> IndexResult<BlobId> {
        match self.call(IndexCall::WriteRequest { size_hint })? {
            IndexResponse::BlobId(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    fn write_complete(&self, header: &TileHeader, record: IndexRecord) -> IndexResult<()> {
        self.call_done(IndexCall::WriteComplete {
            header: header.clone(),
            record,
        })
    }

    fn write_cancel(&self, blob_id: BlobId) -> IndexResult<()> {
        self.call_done(IndexCall::WriteCancel { blob_id })
    }

    fn transaction_request(&self, description: &str, headers: &[TileHeader]) -> IndexResult<TransactionId> {
        self.call_tid(IndexCall::TransactionRequest {
            description: description.to_string(),
            headers: headers.to_vec(),
        })
    }

    fn root_complete(&self, id: TransactionId, headers: &[TileHeader]) -> IndexResult<()> {
        self.call_done(IndexCall::RootComplete {
            id,
            headers: headers.to_vec(),
        })
    }

    fn transaction_complete(&self, id: TransactionId) -> IndexResult<()> {
        self.call_done(IndexCall::TransactionComplete { id })
    }

    fn transaction_cursor(&self) -> IndexResult<TransactionId> {
        self.call_tid(IndexCall::TransactionCursor)
    }

    fn transaction(&self, id: TransactionId) -> IndexResult<Option<Transaction>> {
        match self.call(IndexCall::Transaction { id })? {
            IndexResponse::Transaction(t) => Ok(t),
            other => Err(unexpected(other)),
        }
    }

    fn open_transactions(&self) -> IndexResult<Vec<Transaction>> {
        match self.call(IndexCall::OpenTransactions)? {
            IndexResponse::Transactions(t) => Ok(t),
            other => Err(unexpected(other)),
        }
    }

    fn search_by_location(
        &self,
        cell: TileCell,
        start: TransactionId,
        end: TransactionId,
        include_one_prior: bool,
    ) -> IndexResult<Vec<TileHeader>> {
        match self.call(IndexCall::SearchByLocation {
            cell,
            start,
            end,
            include_one_prior,
        })? {
            IndexResponse::TileHeaders(h) => Ok(h),
            other => Err(unexpected(other)),
        }
    }

    fn for_each_record(&self, visitor: &mut dyn FnMut(&TileHeader, &IndexRecord)) -> IndexResult<()> {
        match self.call(IndexCall::AllRecords)? {
            IndexResponse::Records(records) => {
                for (header, record) in &records {
                    visitor(header, record);
                }
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    fn log(&self, message: &str) -> IndexResult<()> {
        self.call_done(IndexCall::Log {
            message: message.to_string(),
        })
    }
}
