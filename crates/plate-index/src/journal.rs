//! Append-only journal of index mutations.
//!
//! On-disk format (one frame per entry):
//! ```text
//! [4 bytes: entry length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized JournalEntry)]
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use plate_types::{IndexRecord, TileCell, TileHeader, Transaction, TransactionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IndexError, IndexResult};

/// Conventional journal file name inside a platefile directory.
pub const JOURNAL_FILE: &str = "index.journal";

/// Frame prefix: 4 bytes length + 4 bytes CRC.
const FRAME_PREFIX_LEN: u64 = 8;

/// One durable index mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEntry {
    TransactionRequested { transaction: Transaction },
    RootComplete { id: TransactionId, cells: Vec<TileCell> },
    TransactionCommitted { id: TransactionId },
    RecordWritten { header: TileHeader, record: IndexRecord },
}

/// Writer side of the index journal.
///
/// Not internally synchronized: the owning index serializes appends with
/// its own state lock so journal order matches publish order.
pub struct IndexJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    offset: u64,
    sync: bool,
}

impl IndexJournal {
    /// Open (or create) the journal and replay its valid prefix.
    ///
    /// A torn or corrupt tail is logged and cut off so that new entries
    /// follow the last good one.
    pub fn open(path: &Path, sync: bool) -> IndexResult<(Self, Vec<JournalEntry>)> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let file_len = file.metadata()?.len();

        let (entries, good_len) = replay(path, file_len)?;
        if good_len < file_len {
            warn!(
                path = %path.display(),
                good_len,
                file_len,
                "discarding damaged journal tail"
            );
            file.set_len(good_len)?;
        }
        debug!(path = %path.display(), entries = entries.len(), "journal replayed");

        Ok((
            Self {
                path: path.to_path_buf(),
                writer: BufWriter::new(file),
                offset: good_len,
                sync,
            },
            entries,
        ))
    }

    /// Append one entry. Returns its byte offset.
    pub fn append(&mut self, entry: &JournalEntry) -> IndexResult<u64> {
        let payload = bincode::serialize(entry).map_err(|e| IndexError::Serialization(e.to_string()))?;
        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);
        let entry_offset = self.offset;

        let mut frame = Vec::with_capacity(FRAME_PREFIX_LEN as usize + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&payload);

        let written = self
            .writer
            .write_all(&frame)
            .and_then(|()| self.writer.flush())
            .and_then(|()| {
                if self.sync {
                    self.writer.get_ref().sync_data()
                } else {
                    Ok(())
                }
            });
        if let Err(e) = written {
            return Err(IndexError::Journal {
                offset: entry_offset,
                reason: e.to_string(),
            });
        }

        self.offset += frame.len() as u64;
        Ok(entry_offset)
    }

    /// Current end of the journal.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read entries front to back, stopping at the first damaged frame.
/// Returns the entries and the length of the valid prefix.
fn replay(path: &Path, file_len: u64) -> IndexResult<(Vec<JournalEntry>, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    let mut offset = 0u64;

    while offset + FRAME_PREFIX_LEN <= file_len {
        let mut prefix = [0u8; FRAME_PREFIX_LEN as usize];
        match reader.read_exact(&mut prefix) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let length = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        let expected_crc = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);

        if length == 0 || offset + FRAME_PREFIX_LEN + u64::from(length) > file_len {
            warn!(offset, length, file_len, "invalid journal entry length; stopping replay");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "truncated journal entry; stopping replay");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(offset, expected = expected_crc, actual = actual_crc, "journal CRC mismatch; stopping replay");
            break;
        }

        match bincode::deserialize::<JournalEntry>(&payload) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(offset, error = %e, "undecodable journal entry; stopping replay");
                break;
            }
        }
        offset += FRAME_PREFIX_LEN + u64::from(length);
    }

    Ok((entries, offset))
}
