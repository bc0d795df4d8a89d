use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use plate_blob::{BlobStore, FileBlobStore, InMemoryBlobStore};
use plate_index::{IndexError, IndexHeader, LocalIndex, TileIndex};
use plate_tile::{CodecRegistry, PixelFormat, Tile};
use plate_types::{
    IndexRecord, TileCell, TileHeader, TileVersion, Transaction, TransactionId, TypeError,
};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::PlateConfig;
use crate::error::{PlateError, PlateResult};

/// A versioned quad-tree of tiles: one tile index plus the blobs holding
/// tile bytes.
///
/// Writes follow stage -> append -> index: the payload is staged to a local
/// file, appended to a blob reserved through the index, and only then
/// published. A record is never visible before its bytes are stored.
pub struct PlateFile {
    index: Arc<dyn TileIndex>,
    blobs: Arc<dyn BlobStore>,
    codecs: CodecRegistry,
    header: IndexHeader,
    staging_dir: Option<PathBuf>,
}

impl PlateFile {
    /// Create a new platefile directory.
    pub fn create(dir: &Path, header: IndexHeader, config: &PlateConfig) -> PlateResult<Self> {
        header.validate()?;
        let index = LocalIndex::create(dir, header, &config.index)?;
        let blobs = FileBlobStore::open(dir)?.with_sync_writes(config.index.sync_journal);
        Self::from_parts(Arc::new(index), Arc::new(blobs), CodecRegistry::with_defaults(), config)
    }

    /// Open an existing platefile directory.
    pub fn open(dir: &Path, config: &PlateConfig) -> PlateResult<Self> {
        let index = LocalIndex::open(dir, &config.index)?;
        let blobs = FileBlobStore::open(dir)?.with_sync_writes(config.index.sync_journal);
        Self::from_parts(Arc::new(index), Arc::new(blobs), CodecRegistry::with_defaults(), config)
    }

    /// A platefile that lives entirely in memory.
    pub fn in_memory(header: IndexHeader) -> PlateResult<Self> {
        header.validate()?;
        let config = PlateConfig::default();
        let index = LocalIndex::in_memory(header, &config.index);
        Self::from_parts(
            Arc::new(index),
            Arc::new(InMemoryBlobStore::new()),
            CodecRegistry::with_defaults(),
            &config,
        )
    }

    /// Assemble a platefile from an arbitrary index backend and blob store.
    pub fn from_parts(
        index: Arc<dyn TileIndex>,
        blobs: Arc<dyn BlobStore>,
        codecs: CodecRegistry,
        config: &PlateConfig,
    ) -> PlateResult<Self> {
        let header = index.index_header()?;
        header
            .validate()
            .map_err(|e| IndexError::InvalidPlatefile(e.to_string()))?;
        Ok(Self {
            index,
            blobs,
            codecs,
            header,
            staging_dir: config.staging_dir.clone(),
        })
    }

    /// Replace the codec registry.
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    // ---- Metadata ----

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn platefile_id(&self) -> u32 {
        self.header.platefile_id
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn default_file_type(&self) -> &str {
        &self.header.file_type
    }

    pub fn default_tile_size(&self) -> u32 {
        self.header.tile_size
    }

    pub fn num_levels(&self) -> u8 {
        self.header.num_levels
    }

    pub fn pixel_format(&self) -> PlateResult<PixelFormat> {
        Ok(self.header.pixel_format.parse()?)
    }

    pub fn index(&self) -> &Arc<dyn TileIndex> {
        &self.index
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// A fully transparent tile of this platefile's size and format.
    pub fn blank_tile(&self) -> PlateResult<Tile> {
        let size = self.default_tile_size();
        Ok(Tile::new(size, size, self.pixel_format()?))
    }

    fn check_cell(&self, cell: TileCell) -> PlateResult<()> {
        cell.validate()?;
        if cell.level >= self.header.num_levels {
            return Err(TypeError::LevelOutOfRange {
                level: cell.level,
                max: self.header.num_levels.saturating_sub(1),
            }
            .into());
        }
        Ok(())
    }

    // ---- Reads ----

    /// The index record a read would resolve to. May be `Empty`.
    pub fn read_record(&self, cell: TileCell, version: TileVersion) -> PlateResult<IndexRecord> {
        Ok(self.index.read_request(cell, version)?)
    }

    fn valid_record(&self, cell: TileCell, version: TileVersion) -> PlateResult<IndexRecord> {
        let record = self.read_record(cell, version)?;
        if record.is_empty() {
            return Err(IndexError::TileNotFound { cell, version }.into());
        }
        Ok(record)
    }

    /// Header and payload of the version of `cell` selected by `version`.
    ///
    /// Fails with `TileNotFound` if the cell reads as empty.
    pub fn read(&self, cell: TileCell, version: TileVersion) -> PlateResult<(TileHeader, Vec<u8>)> {
        let record = self.valid_record(cell, version)?;
        Ok(self.blobs.read(record.location)?)
    }

    /// Only the stored header of the selected version.
    pub fn read_header(&self, cell: TileCell, version: TileVersion) -> PlateResult<TileHeader> {
        let record = self.valid_record(cell, version)?;
        Ok(self.blobs.read_header(record.location)?)
    }

    /// Copy the selected payload to `<base_name>.<payload_type>`.
    /// Returns the path written.
    pub fn read_to_file(&self, cell: TileCell, version: TileVersion, base_name: &Path) -> PlateResult<PathBuf> {
        let record = self.valid_record(cell, version)?;
        let header = self.blobs.read_header(record.location)?;
        let path = base_name.with_extension(&header.payload_type);
        self.blobs.read_to_file(record.location, &path)?;
        Ok(path)
    }

    /// Read and decode the selected version through the codec registry.
    pub fn read_tile(&self, cell: TileCell, version: TileVersion) -> PlateResult<(TileHeader, Tile)> {
        let (header, payload) = self.read(cell, version)?;
        let tile = self.codecs.get(&header.payload_type)?.decode(&payload)?;
        Ok((header, tile))
    }

    // ---- Writes ----

    /// Store `payload` as the version of `cell` written by `transaction_id`,
    /// tagged with the platefile's default payload type.
    pub fn write(&self, cell: TileCell, transaction_id: TransactionId, payload: &[u8]) -> PlateResult<TileHeader> {
        let header = TileHeader::new(cell, transaction_id, self.header.file_type.clone());
        self.store(header, payload, "write")
    }

    /// Like [`write`](Self::write) with an explicit payload type.
    pub fn write_as(
        &self,
        cell: TileCell,
        transaction_id: TransactionId,
        payload_type: &str,
        payload: &[u8],
    ) -> PlateResult<TileHeader> {
        let header = TileHeader::new(cell, transaction_id, payload_type);
        self.store(header, payload, "write")
    }

    /// Store a derived tile produced by compaction under the compaction's
    /// own transaction id.
    pub fn write_update(&self, cell: TileCell, transaction_id: TransactionId, payload: &[u8]) -> PlateResult<TileHeader> {
        let header = TileHeader::new(cell, transaction_id, self.header.file_type.clone());
        self.store(header, payload, "update")
    }

    /// Encode `tile` with the default codec and [`write`](Self::write) it.
    pub fn write_tile(&self, cell: TileCell, transaction_id: TransactionId, tile: &Tile) -> PlateResult<TileHeader> {
        let payload = self.codecs.get(&self.header.file_type)?.encode(tile)?;
        self.write(cell, transaction_id, &payload)
    }

    /// Encode `tile` with the default codec and
    /// [`write_update`](Self::write_update) it.
    pub fn write_update_tile(&self, cell: TileCell, transaction_id: TransactionId, tile: &Tile) -> PlateResult<TileHeader> {
        let payload = self.codecs.get(&self.header.file_type)?.encode(tile)?;
        self.write_update(cell, transaction_id, &payload)
    }

    fn stage(&self, payload: &[u8]) -> PlateResult<NamedTempFile> {
        let mut staged = match &self.staging_dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        staged.write_all(payload)?;
        staged.flush()?;
        Ok(staged)
    }

    fn store(&self, header: TileHeader, payload: &[u8], kind: &'static str) -> PlateResult<TileHeader> {
        self.check_cell(header.cell)?;
        let staged = self.stage(payload)?;

        let frame = plate_blob::record_len(&header, payload.len() as u64)?;
        let blob_id = self.index.write_request(frame)?;
        let location = match self.blobs.write_from_file(blob_id, &header, staged.path()) {
            Ok(location) => location,
            Err(e) => {
                if let Err(cancel) = self.index.write_cancel(blob_id) {
                    warn!(blob = %blob_id, error = %cancel, "failed to release blob reservation");
                }
                return Err(e.into());
            }
        };

        self.index.write_complete(&header, IndexRecord::valid(location))?;
        debug!(
            kind,
            cell = %header.cell,
            transaction = %header.transaction_id,
            location = %location,
            len = payload.len(),
            "tile stored"
        );
        Ok(header)
    }

    // ---- Transactions ----

    pub fn transaction_request(&self, description: &str, headers: &[TileHeader]) -> PlateResult<TransactionId> {
        Ok(self.index.transaction_request(description, headers)?)
    }

    pub fn root_complete(&self, id: TransactionId, headers: &[TileHeader]) -> PlateResult<()> {
        Ok(self.index.root_complete(id, headers)?)
    }

    pub fn transaction_complete(&self, id: TransactionId) -> PlateResult<()> {
        Ok(self.index.transaction_complete(id)?)
    }

    pub fn transaction_cursor(&self) -> PlateResult<TransactionId> {
        Ok(self.index.transaction_cursor()?)
    }

    pub fn transaction(&self, id: TransactionId) -> PlateResult<Option<Transaction>> {
        Ok(self.index.transaction(id)?)
    }

    pub fn open_transactions(&self) -> PlateResult<Vec<Transaction>> {
        Ok(self.index.open_transactions()?)
    }

    // ---- History ----

    pub fn search_by_location(
        &self,
        cell: TileCell,
        start: TransactionId,
        end: TransactionId,
        include_one_prior: bool,
    ) -> PlateResult<Vec<TileHeader>> {
        Ok(self.index.search_by_location(cell, start, end, include_one_prior)?)
    }

    pub fn for_each_record(&self, visitor: &mut dyn FnMut(&TileHeader, &IndexRecord)) -> PlateResult<()> {
        Ok(self.index.for_each_record(visitor)?)
    }

    pub fn log(&self, message: &str) -> PlateResult<()> {
        Ok(self.index.log(message)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plate_blob::{BlobError, BlobResult};
    use plate_index::IndexConfig;
    use plate_types::{BlobId, BlobLocation};

    fn header() -> IndexHeader {
        IndexHeader::new("test", 4, "raw", "rgba8", 5)
    }

    fn plate() -> PlateFile {
        PlateFile::in_memory(header()).unwrap()
    }

    #[test]
    fn write_then_read_at_cursor() {
        let plate = plate();
        let t = plate.transaction_request("ingest", &[]).unwrap();
        let cells = [TileCell::new(0, 0, 2), TileCell::new(1, 0, 2), TileCell::new(3, 3, 2)];
        let mut headers = Vec::new();
        for (i, cell) in cells.iter().enumerate() {
            headers.push(plate.write(*cell, t, &[i as u8; 16]).unwrap());
        }
        plate.root_complete(t, &headers).unwrap();
        plate.transaction_complete(t).unwrap();

        let cursor = plate.transaction_cursor().unwrap();
        assert_eq!(cursor, t);
        for (i, cell) in cells.iter().enumerate() {
            let (h, payload) = plate.read(*cell, TileVersion::AtOrBefore(cursor)).unwrap();
            assert_eq!(h, headers[i]);
            assert_eq!(payload, vec![i as u8; 16]);
        }
        let err = plate
            .read(TileCell::new(2, 2, 2), TileVersion::AtOrBefore(cursor))
            .unwrap_err();
        assert!(err.is_tile_not_found());
        assert!(plate
            .read_record(TileCell::new(2, 2, 2), TileVersion::AtOrBefore(cursor))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn older_versions_stay_readable() {
        let plate = plate();
        let cell = TileCell::new(1, 1, 1);
        let t1 = plate.transaction_request("v1", &[]).unwrap();
        plate.write(cell, t1, b"one").unwrap();
        plate.transaction_complete(t1).unwrap();
        let t2 = plate.transaction_request("v2", &[]).unwrap();
        plate.write(cell, t2, b"two").unwrap();
        plate.transaction_complete(t2).unwrap();

        assert_eq!(plate.read(cell, TileVersion::AtOrBefore(t1)).unwrap().1, b"one");
        assert_eq!(plate.read(cell, TileVersion::Latest).unwrap().1, b"two");
        assert_eq!(plate.read(cell, TileVersion::Exact(t1)).unwrap().1, b"one");
        assert!(plate
            .read(cell, TileVersion::Exact(t2.next()))
            .unwrap_err()
            .is_tile_not_found());
    }

    #[test]
    fn cells_outside_the_pyramid_are_rejected() {
        let plate = plate();
        let t = plate.transaction_request("w", &[]).unwrap();
        assert!(matches!(
            plate.write(TileCell::new(0, 0, 5), t, b"x"),
            Err(PlateError::Cell(TypeError::LevelOutOfRange { .. }))
        ));
        assert!(matches!(
            plate.write(TileCell::new(4, 0, 2), t, b"x"),
            Err(PlateError::Cell(TypeError::CellOutOfRange { .. }))
        ));
    }

    #[test]
    fn blob_limit_counts_whole_records() {
        let sample = TileHeader::new(TileCell::new(0, 0, 2), TransactionId::new(1), "raw");
        let record = plate_blob::record_len(&sample, 10).unwrap();
        let config = IndexConfig { max_blob_size: record * 2, ..IndexConfig::default() };
        let plate = PlateFile::from_parts(
            Arc::new(LocalIndex::in_memory(header(), &config)),
            Arc::new(InMemoryBlobStore::new()),
            CodecRegistry::with_defaults(),
            &PlateConfig::default(),
        )
        .unwrap();

        let t = plate.transaction_request("fill", &[]).unwrap();
        let cells = [TileCell::new(0, 0, 2), TileCell::new(1, 0, 2), TileCell::new(2, 0, 2)];
        for cell in cells {
            plate.write(cell, t, &[7u8; 10]).unwrap();
        }
        plate.transaction_complete(t).unwrap();

        let blob_of = |cell| plate.read_record(cell, TileVersion::Latest).unwrap().location.blob_id;
        assert_eq!(blob_of(cells[0]), BlobId::new(0));
        assert_eq!(blob_of(cells[1]), BlobId::new(0));
        assert_eq!(blob_of(cells[2]), BlobId::new(1));
    }

    #[test]
    fn pyramid_depth_is_bounded() {
        let deep = IndexHeader::new("deep", 4, "raw", "rgba8", 70);
        let err = PlateFile::in_memory(deep.clone()).err().unwrap();
        assert!(matches!(err, PlateError::Index(IndexError::PlatefileCreation(_))));

        let dir = tempfile::tempdir().unwrap();
        let flat = IndexHeader::new("flat", 4, "raw", "rgba8", 0);
        let err = PlateFile::create(&dir.path().join("flat.plate"), flat, &PlateConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, PlateError::Index(IndexError::PlatefileCreation(_))));

        // A backend may hand over metadata that was never validated.
        let index = Arc::new(LocalIndex::in_memory(deep, &IndexConfig::default()));
        let err = PlateFile::from_parts(
            index,
            Arc::new(InMemoryBlobStore::new()),
            CodecRegistry::with_defaults(),
            &PlateConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PlateError::Index(IndexError::InvalidPlatefile(_))));
    }

    #[test]
    fn tiles_roundtrip_through_codec() {
        let plate = plate();
        let t = plate.transaction_request("w", &[]).unwrap();
        let mut tile = plate.blank_tile().unwrap();
        tile.set_pixel(2, 1, &[1, 2, 3, 255]);
        plate.write_tile(TileCell::ROOT, t, &tile).unwrap();
        let (header, back) = plate.read_tile(TileCell::ROOT, TileVersion::Latest).unwrap();
        assert_eq!(header.payload_type, "raw");
        assert_eq!(back, tile);
    }

    #[test]
    fn unknown_payload_type_cannot_be_decoded() {
        let plate = plate();
        let t = plate.transaction_request("w", &[]).unwrap();
        plate.write_as(TileCell::ROOT, t, "png", b"not really a png").unwrap();
        let err = plate.read_tile(TileCell::ROOT, TileVersion::Latest).unwrap_err();
        assert!(matches!(err, PlateError::Tile(_)));
    }

    #[test]
    fn read_to_file_uses_payload_type_extension() {
        let dir = tempfile::tempdir().unwrap();
        let plate = plate();
        let t = plate.transaction_request("w", &[]).unwrap();
        plate.write(TileCell::ROOT, t, b"bytes").unwrap();
        let path = plate
            .read_to_file(TileCell::ROOT, TileVersion::Latest, &dir.path().join("root"))
            .unwrap();
        assert_eq!(path, dir.path().join("root.raw"));
        assert_eq!(std::fs::read(path).unwrap(), b"bytes");
    }

    #[test]
    fn platefile_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mars.plate");
        let config = PlateConfig::default();
        {
            let plate = PlateFile::create(&path, header(), &config).unwrap();
            let t = plate.transaction_request("w", &[]).unwrap();
            plate.write(TileCell::new(1, 0, 1), t, b"persisted").unwrap();
            plate.transaction_complete(t).unwrap();
        }
        let plate = PlateFile::open(&path, &config).unwrap();
        assert_eq!(plate.name(), "test");
        let cursor = plate.transaction_cursor().unwrap();
        let (_, payload) = plate.read(TileCell::new(1, 0, 1), TileVersion::AtOrBefore(cursor)).unwrap();
        assert_eq!(payload, b"persisted");
        assert!(path.join("plate_0.blob").exists());
    }

    #[test]
    fn blob_limit_leaves_no_record_behind() {
        let mut config = PlateConfig::default();
        config.index = IndexConfig {
            max_blobs: 2,
            max_blob_size: 100,
            sync_journal: false,
        };
        let index = Arc::new(LocalIndex::in_memory(header(), &config.index));
        let plate = PlateFile::from_parts(
            index,
            Arc::new(InMemoryBlobStore::new()),
            CodecRegistry::with_defaults(),
            &config,
        )
        .unwrap();

        let t = plate.transaction_request("fill", &[]).unwrap();
        plate.write(TileCell::new(0, 0, 1), t, &[0; 80]).unwrap();
        plate.write(TileCell::new(1, 0, 1), t, &[0; 80]).unwrap();
        let err = plate.write(TileCell::new(0, 1, 1), t, &[0; 80]).unwrap_err();
        assert!(err.is_blob_limit());
        assert!(plate
            .read_record(TileCell::new(0, 1, 1), TileVersion::Latest)
            .unwrap()
            .is_empty());
    }

    struct FailingStore;

    impl BlobStore for FailingStore {
        fn write(&self, blob_id: BlobId, _header: &TileHeader, _payload: &[u8]) -> BlobResult<BlobLocation> {
            Err(BlobError::Io {
                blob_id,
                source: std::io::Error::other("disk full"),
            })
        }
        fn read_header(&self, location: BlobLocation) -> BlobResult<TileHeader> {
            Err(BlobError::UnknownBlob(location.blob_id))
        }
        fn read(&self, location: BlobLocation) -> BlobResult<(TileHeader, Vec<u8>)> {
            Err(BlobError::UnknownBlob(location.blob_id))
        }
        fn blob_size(&self, _blob_id: BlobId) -> BlobResult<Option<u64>> {
            Ok(None)
        }
        fn blob_ids(&self) -> BlobResult<Vec<BlobId>> {
            Ok(vec![])
        }
    }

    #[test]
    fn failed_append_releases_reservation() {
        let config = PlateConfig {
            index: IndexConfig {
                max_blobs: 1,
                ..IndexConfig::default()
            },
            ..PlateConfig::default()
        };
        let index: Arc<dyn TileIndex> = Arc::new(LocalIndex::in_memory(header(), &config.index));
        let plate = PlateFile::from_parts(
            Arc::clone(&index),
            Arc::new(FailingStore),
            CodecRegistry::with_defaults(),
            &config,
        )
        .unwrap();
        let t = plate.transaction_request("w", &[]).unwrap();
        let err = plate.write(TileCell::ROOT, t, b"x").unwrap_err();
        assert!(err.is_blob_io());
        // The only blob is free again, so this does not block.
        assert_eq!(index.write_request(1).unwrap(), BlobId::new(0));
        assert!(index.read_request(TileCell::ROOT, TileVersion::Latest).unwrap().is_empty());
    }

    #[test]
    fn metadata_accessors() {
        let plate = plate();
        assert_eq!(plate.default_tile_size(), 4);
        assert_eq!(plate.default_file_type(), "raw");
        assert_eq!(plate.num_levels(), 5);
        assert_eq!(plate.pixel_format().unwrap(), PixelFormat::Rgba8);
        plate.log("hello").unwrap();
    }
}
