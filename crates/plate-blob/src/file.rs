use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use plate_types::{BlobId, BlobLocation, TileHeader};
use tracing::{debug, warn};

use crate::error::{BlobError, BlobResult};
use crate::frame;
use crate::traits::BlobStore;

/// Append handle for one blob file.
struct BlobAppender {
    file: File,
    /// Current end of the blob.
    offset: u64,
}

/// Blob store backed by one `plate_<id>.blob` file per blob.
///
/// Each blob has its own append mutex, so writers targeting different blobs
/// never contend. Readers open their own handle and never take a lock.
pub struct FileBlobStore {
    root: PathBuf,
    sync_writes: bool,
    appenders: RwLock<HashMap<BlobId, Arc<Mutex<BlobAppender>>>>,
}

impl FileBlobStore {
    /// Open (or create) a blob store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| BlobError::io(BlobId::default(), e))?;
        Ok(Self {
            root,
            sync_writes: false,
            appenders: RwLock::new(HashMap::new()),
        })
    }

    /// `fsync` each blob after every append.
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `blob_id`.
    pub fn blob_path(&self, blob_id: BlobId) -> PathBuf {
        self.root.join(blob_id.file_name())
    }

    fn appender(&self, blob_id: BlobId) -> BlobResult<Arc<Mutex<BlobAppender>>> {
        if let Some(appender) = self.appenders.read().expect("lock poisoned").get(&blob_id) {
            return Ok(Arc::clone(appender));
        }

        let mut appenders = self.appenders.write().expect("lock poisoned");
        if let Some(appender) = appenders.get(&blob_id) {
            return Ok(Arc::clone(appender));
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.blob_path(blob_id))
            .map_err(|e| BlobError::io(blob_id, e))?;
        let offset = file.metadata().map_err(|e| BlobError::io(blob_id, e))?.len();
        debug!(blob = %blob_id, offset, "opened blob for append");

        let appender = Arc::new(Mutex::new(BlobAppender { file, offset }));
        appenders.insert(blob_id, Arc::clone(&appender));
        Ok(appender)
    }

    fn open_reader(&self, location: BlobLocation) -> BlobResult<BufReader<File>> {
        let mut file = match File::open(self.blob_path(location.blob_id)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BlobError::UnknownBlob(location.blob_id));
            }
            Err(e) => return Err(BlobError::io(location.blob_id, e)),
        };
        let len = file
            .metadata()
            .map_err(|e| BlobError::io(location.blob_id, e))?
            .len();
        if location.offset >= len {
            return Err(BlobError::corrupt(location, "offset past end of blob"));
        }
        file.seek(SeekFrom::Start(location.offset))
            .map_err(|e| BlobError::io(location.blob_id, e))?;
        Ok(BufReader::new(file))
    }
}

impl BlobStore for FileBlobStore {
    fn write(&self, blob_id: BlobId, header: &TileHeader, payload: &[u8]) -> BlobResult<BlobLocation> {
        let record = frame::encode_frame(header, payload)?;
        let appender = self.appender(blob_id)?;
        let mut a = appender.lock().expect("blob mutex poisoned");
        let location = BlobLocation::new(blob_id, a.offset);

        let result = a
            .file
            .write_all(&record)
            .and_then(|()| a.file.flush())
            .and_then(|()| if self.sync_writes { a.file.sync_data() } else { Ok(()) });

        if let Err(e) = result {
            // A torn append may have left bytes behind; resynchronize so the
            // next record starts at the real end of the file.
            match a.file.metadata() {
                Ok(meta) => a.offset = meta.len(),
                Err(meta_err) => warn!(blob = %blob_id, error = %meta_err, "cannot resync blob offset"),
            }
            return Err(BlobError::io(blob_id, e));
        }

        a.offset += record.len() as u64;
        debug!(blob = %blob_id, offset = location.offset, len = record.len(), "blob append");
        Ok(location)
    }

    fn read_header(&self, location: BlobLocation) -> BlobResult<TileHeader> {
        let mut reader = self.open_reader(location)?;
        frame::read_header(&mut reader, location)
    }

    fn read(&self, location: BlobLocation) -> BlobResult<(TileHeader, Vec<u8>)> {
        let mut reader = self.open_reader(location)?;
        let header = frame::read_header(&mut reader, location)?;
        let payload = frame::read_payload(&mut reader, location)?;
        Ok((header, payload))
    }

    fn read_to_file(&self, location: BlobLocation, path: &Path) -> BlobResult<u64> {
        let mut reader = self.open_reader(location)?;
        frame::read_header(&mut reader, location)?;

        let out = File::create(path).map_err(|e| BlobError::io(location.blob_id, e))?;
        let mut writer = BufWriter::new(out);
        let copied = match frame::copy_payload(&mut reader, &mut writer, location) {
            Ok(n) => n,
            Err(e) => {
                drop(writer);
                let _ = fs::remove_file(path);
                return Err(e);
            }
        };
        writer
            .flush()
            .map_err(|e| BlobError::io(location.blob_id, e))?;
        Ok(copied)
    }

    fn blob_size(&self, blob_id: BlobId) -> BlobResult<Option<u64>> {
        match fs::metadata(self.blob_path(blob_id)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BlobError::io(blob_id, e)),
        }
    }

    fn blob_ids(&self) -> BlobResult<Vec<BlobId>> {
        let entries = fs::read_dir(&self.root).map_err(|e| BlobError::io(BlobId::default(), e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BlobError::io(BlobId::default(), e))?;
            if let Some(id) = entry.file_name().to_str().and_then(BlobId::from_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plate_types::{TileCell, TransactionId};
    use std::io::Read;
    use std::thread;

    fn header(col: u32, tid: u64) -> TileHeader {
        TileHeader::new(TileCell::new(col, 0, 5), TransactionId::new(tid), "raw")
    }

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let loc = store.write(BlobId::new(0), &header(3, 1), b"tile bytes").unwrap();
        assert_eq!(loc, BlobLocation::new(BlobId::new(0), 0));

        let (h, payload) = store.read(loc).unwrap();
        assert_eq!(h, header(3, 1));
        assert_eq!(payload, b"tile bytes");
        assert!(dir.path().join("plate_0.blob").exists());
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = {
            let store = FileBlobStore::open(dir.path()).unwrap();
            let a = store.write(BlobId::new(1), &header(1, 1), b"one").unwrap();
            let b = store.write(BlobId::new(1), &header(2, 1), b"two").unwrap();
            (a, b)
        };

        let store = FileBlobStore::open(dir.path()).unwrap();
        let c = store.write(BlobId::new(1), &header(3, 2), b"three").unwrap();
        assert!(c.offset > b.offset);
        assert_eq!(store.read_payload(a).unwrap(), b"one");
        assert_eq!(store.read_payload(b).unwrap(), b"two");
        assert_eq!(store.read_payload(c).unwrap(), b"three");
        assert_eq!(store.blob_ids().unwrap(), vec![BlobId::new(1)]);
    }

    #[test]
    fn missing_blob_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let err = store.read(BlobLocation::new(BlobId::new(4), 0)).unwrap_err();
        assert!(matches!(err, BlobError::UnknownBlob(id) if id == BlobId::new(4)));
        assert_eq!(store.blob_size(BlobId::new(4)).unwrap(), None);
    }

    #[test]
    fn on_disk_corruption_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let loc = store.write(BlobId::new(0), &header(1, 1), b"payload").unwrap();

        {
            let path = store.blob_path(BlobId::new(0));
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            let len = file.metadata().unwrap().len();
            file.seek(SeekFrom::Start(len - 1)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(len - 1)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        // The header is intact; only the payload checksum fails.
        assert_eq!(store.read_header(loc).unwrap(), header(1, 1));
        let err = store.read(loc).unwrap_err();
        assert!(matches!(err, BlobError::Corrupt { .. }));
    }

    #[test]
    fn read_to_file_copies_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path().join("blobs")).unwrap();
        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 7) as u8).collect();
        let loc = store.write(BlobId::new(0), &header(1, 1), &payload).unwrap();

        let out = dir.path().join("tile.out");
        let n = store.read_to_file(loc, &out).unwrap();
        assert_eq!(n, payload.len() as u64);
        assert_eq!(fs::read(&out).unwrap(), payload);
    }

    #[test]
    fn write_from_file_reads_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let src = dir.path().join("staged.tile");
        fs::write(&src, b"staged").unwrap();
        let loc = store.write_from_file(BlobId::new(2), &header(1, 1), &src).unwrap();
        assert_eq!(store.read_payload(loc).unwrap(), b"staged");
    }

    #[test]
    fn concurrent_appends_to_one_blob_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileBlobStore::open(dir.path()).unwrap());

        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..25u32)
                        .map(|i| {
                            let payload = vec![t as u8; (i as usize % 5) * 100 + 1];
                            let loc = store.write(BlobId::new(0), &header(t * 100 + i, 1), &payload).unwrap();
                            (loc, payload)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for (loc, payload) in handle.join().unwrap() {
                assert_eq!(store.read_payload(loc).unwrap(), payload);
            }
        }
    }
}
