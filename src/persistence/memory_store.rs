//! In-memory asset store for tests and cache-less sessions

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::persistence::asset_cache::AssetCache;
use crate::persistence::records::{AssetKey, AssetRecord, CacheTable};
use crate::persistence::{PersistenceError, PersistenceResult};

/// In-process asset store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    records: RwLock<BTreeMap<AssetKey, AssetRecord>>,
    reject_writes: AtomicBool,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of records in one logical table
    pub fn table_len(&self, table: CacheTable) -> usize {
        self.records
            .read()
            .keys()
            .filter(|key| key.table() == table)
            .count()
    }

    pub fn contains(&self, key: &AssetKey) -> bool {
        self.records.read().contains_key(key)
    }

    pub fn remove(&self, key: &AssetKey) -> Option<AssetRecord> {
        self.records.write().remove(key)
    }

    /// Make every following `put` fail, as a full or read-only disk would
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

impl AssetCache for MemoryAssetStore {
    async fn get(&self, key: &AssetKey) -> PersistenceResult<Option<AssetRecord>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn put(&self, key: &AssetKey, record: AssetRecord) -> PersistenceResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("store is read-only, cannot write {}", key),
            )));
        }
        record.check_key(key)?;
        self.records.write().insert(key.clone(), record);
        Ok(())
    }
}
