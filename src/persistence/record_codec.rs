//! Framed cache records: a fixed header followed by a CRC32-checked bincode body

use serde::{Deserialize, Serialize};

use crate::persistence::error::{corrupted_data, version_mismatch};
use crate::persistence::records::{AssetKey, AssetRecord};
use crate::persistence::{PersistenceError, PersistenceResult};

/// Version of the record format
pub const RECORD_FORMAT_VERSION: u32 = 2;

/// Magic bytes to identify cache records
pub const RECORD_MAGIC: &[u8; 4] = b"RLAC";

/// magic + version + table + payload length + checksum
pub const RECORD_HEADER_SIZE: usize = 4 + 4 + 1 + 4 + 4;

#[derive(Serialize)]
struct StoredRecordRef<'a> {
    key: &'a AssetKey,
    record: &'a AssetRecord,
}

#[derive(Deserialize)]
struct StoredRecord {
    key: AssetKey,
    record: AssetRecord,
}

/// Frames cache records for the file store
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordCodec;

impl RecordCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encode a record together with its key
    pub fn encode(&self, key: &AssetKey, record: &AssetRecord) -> PersistenceResult<Vec<u8>> {
        let payload = bincode::serialize(&StoredRecordRef { key, record })?;
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            PersistenceError::SerializationError(format!(
                "record {} is too large ({} bytes)",
                key,
                payload.len()
            ))
        })?;

        let mut out = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        out.extend_from_slice(RECORD_MAGIC);
        out.extend_from_slice(&RECORD_FORMAT_VERSION.to_le_bytes());
        out.push(record.table() as u8);
        out.extend_from_slice(&payload_len.to_le_bytes());
        out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode a record and check it was stored under `expected`
    pub fn decode(&self, expected: &AssetKey, data: &[u8]) -> PersistenceResult<AssetRecord> {
        if data.len() < RECORD_HEADER_SIZE {
            return Err(corrupted_data("data too small to contain a record header"));
        }
        if &data[0..4] != RECORD_MAGIC {
            return Err(corrupted_data("invalid record magic"));
        }

        let word = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let version = word(4);
        if version != RECORD_FORMAT_VERSION {
            return Err(version_mismatch(RECORD_FORMAT_VERSION, version));
        }
        let table = data[8];
        let payload_len = word(9) as usize;
        let checksum = word(13);

        let payload = &data[RECORD_HEADER_SIZE..];
        if payload.len() != payload_len {
            return Err(corrupted_data(format!(
                "payload length {} does not match header {}",
                payload.len(),
                payload_len
            )));
        }
        if crc32fast::hash(payload) != checksum {
            return Err(corrupted_data("record checksum mismatch"));
        }

        let stored: StoredRecord = bincode::deserialize(payload)
            .map_err(|e| PersistenceError::DeserializationError(e.to_string()))?;
        if stored.record.table() as u8 != table {
            return Err(corrupted_data("record table does not match header"));
        }
        if &stored.key != expected {
            return Err(PersistenceError::KeyMismatch {
                expected: expected.to_string(),
                found: stored.key.to_string(),
            });
        }
        Ok(stored.record)
    }
}
