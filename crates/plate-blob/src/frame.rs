//! On-disk record framing.
//!
//! Every tile is stored as one self-delimiting record:
//!
//! ```text
//! [4 bytes: header length (little-endian u32)]
//! [4 bytes: CRC32 of header bytes (little-endian u32)]
//! [N bytes: header (bincode-serialized TileHeader)]
//! [8 bytes: payload length (little-endian u64)]
//! [4 bytes: CRC32 of payload bytes (little-endian u32)]
//! [M bytes: payload]
//! ```
//!
//! A record's [`BlobLocation`] is the offset of its first byte.

use std::io::{self, Read, Write};

use plate_types::{BlobLocation, TileHeader};

use crate::error::{BlobError, BlobResult};

/// Header prefix size: 4 bytes length + 4 bytes CRC.
pub const HEADER_PREFIX_LEN: usize = 8;

/// Payload prefix size: 8 bytes length + 4 bytes CRC.
pub const PAYLOAD_PREFIX_LEN: usize = 12;

/// Encoded headers larger than this are treated as framing damage.
const MAX_HEADER_LEN: u32 = 64 * 1024;

/// Serialize one record into a single buffer, ready to append.
pub fn encode_frame(header: &TileHeader, payload: &[u8]) -> BlobResult<Vec<u8>> {
    let header_bytes =
        bincode::serialize(header).map_err(|e| BlobError::Serialization(e.to_string()))?;
    if header_bytes.len() as u64 > u64::from(MAX_HEADER_LEN) {
        return Err(BlobError::Serialization(format!(
            "tile header is {} bytes, limit is {MAX_HEADER_LEN}",
            header_bytes.len()
        )));
    }

    let mut buf = Vec::with_capacity(frame_len(header_bytes.len(), payload.len()) as usize);
    buf.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(&header_bytes).to_le_bytes());
    buf.extend_from_slice(&header_bytes);
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Total on-disk size of a record with the given header and payload sizes.
pub fn frame_len(header_len: usize, payload_len: usize) -> u64 {
    (HEADER_PREFIX_LEN + header_len + PAYLOAD_PREFIX_LEN) as u64 + payload_len as u64
}

/// On-disk size of the record `encode_frame` would produce for `header`
/// and a payload of `payload_len` bytes.
pub fn record_len(header: &TileHeader, payload_len: u64) -> BlobResult<u64> {
    let header_len =
        bincode::serialized_size(header).map_err(|e| BlobError::Serialization(e.to_string()))?;
    Ok(frame_len(header_len as usize, 0) + payload_len)
}

/// Map a read error to the blob error family. A short read means the
/// record runs past the end of the blob.
fn read_err(location: BlobLocation, e: io::Error) -> BlobError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        BlobError::corrupt(location, "record truncated")
    } else {
        BlobError::io(location.blob_id, e)
    }
}

/// Read and validate the header of the record the reader is positioned at.
///
/// Leaves the reader positioned at the payload prefix.
pub(crate) fn read_header<R: Read>(reader: &mut R, location: BlobLocation) -> BlobResult<TileHeader> {
    let mut prefix = [0u8; HEADER_PREFIX_LEN];
    reader
        .read_exact(&mut prefix)
        .map_err(|e| read_err(location, e))?;

    let length = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    let expected_crc = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    if length == 0 || length > MAX_HEADER_LEN {
        return Err(BlobError::corrupt(
            location,
            format!("invalid header length {length}"),
        ));
    }

    let mut bytes = vec![0u8; length as usize];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| read_err(location, e))?;

    let actual_crc = crc32fast::hash(&bytes);
    if actual_crc != expected_crc {
        return Err(BlobError::corrupt(
            location,
            format!("header CRC mismatch (expected {expected_crc:#010x}, got {actual_crc:#010x})"),
        ));
    }

    bincode::deserialize(&bytes)
        .map_err(|e| BlobError::corrupt(location, format!("undecodable header: {e}")))
}

fn read_payload_prefix<R: Read>(reader: &mut R, location: BlobLocation) -> BlobResult<(u64, u32)> {
    let mut prefix = [0u8; PAYLOAD_PREFIX_LEN];
    reader
        .read_exact(&mut prefix)
        .map_err(|e| read_err(location, e))?;
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&prefix[..8]);
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&prefix[8..]);
    Ok((u64::from_le_bytes(len_bytes), u32::from_le_bytes(crc_bytes)))
}

/// Read and validate the payload. The reader must be positioned just after
/// the header, as left by [`read_header`].
pub(crate) fn read_payload<R: Read>(reader: &mut R, location: BlobLocation) -> BlobResult<Vec<u8>> {
    let (length, expected_crc) = read_payload_prefix(reader, location)?;
    let length = usize::try_from(length)
        .map_err(|_| BlobError::corrupt(location, format!("payload length {length} overflows")))?;

    let mut payload = Vec::new();
    reader
        .take(length as u64)
        .read_to_end(&mut payload)
        .map_err(|e| read_err(location, e))?;
    if payload.len() != length {
        return Err(BlobError::corrupt(location, "record truncated"));
    }

    let actual_crc = crc32fast::hash(&payload);
    if actual_crc != expected_crc {
        return Err(BlobError::corrupt(
            location,
            format!("payload CRC mismatch (expected {expected_crc:#010x}, got {actual_crc:#010x})"),
        ));
    }
    Ok(payload)
}

/// Stream the payload into `writer`, verifying the checksum on the way.
/// Returns the number of payload bytes copied.
///
/// On a checksum failure the bytes already written are not retracted; the
/// caller owns cleanup of the destination.
pub(crate) fn copy_payload<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    location: BlobLocation,
) -> BlobResult<u64> {
    let (length, expected_crc) = read_payload_prefix(reader, location)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut remaining = length;
    let mut chunk = [0u8; 64 * 1024];

    while remaining > 0 {
        let want = remaining.min(chunk.len() as u64) as usize;
        reader
            .read_exact(&mut chunk[..want])
            .map_err(|e| read_err(location, e))?;
        hasher.update(&chunk[..want]);
        writer
            .write_all(&chunk[..want])
            .map_err(|e| BlobError::io(location.blob_id, e))?;
        remaining -= want as u64;
    }

    let actual_crc = hasher.finalize();
    if actual_crc != expected_crc {
        return Err(BlobError::corrupt(
            location,
            format!("payload CRC mismatch (expected {expected_crc:#010x}, got {actual_crc:#010x})"),
        ));
    }
    Ok(length)
}
