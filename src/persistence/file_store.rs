//! Directory-backed asset store
//!
//! Layout: `<root>/<table>/<hex name>` with one framed record per file.
//! Record names are hex encoded so any server path is a safe file name; long
//! names are split into nested directories to stay under file name limits.
//! Unreadable records are treated as cache misses and removed, so the next
//! handshake downloads them again.

use std::path::{Path, PathBuf};

use crate::persistence::asset_cache::AssetCache;
use crate::persistence::error::{atomic_write, PersistenceErrorContext};
use crate::persistence::record_codec::RecordCodec;
use crate::persistence::records::{AssetKey, AssetRecord, CacheTable};
use crate::persistence::PersistenceResult;

/// Hex characters per path segment
const SEGMENT_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct FileAssetStore {
    root: PathBuf,
    codec: RecordCodec,
}

fn hex_encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len() * 2);
    for byte in name.bytes() {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

impl FileAssetStore {
    /// Open a store rooted at `root`, creating the table directories
    pub async fn open(root: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let root = root.into();
        for table in CacheTable::ALL {
            tokio::fs::create_dir_all(root.join(table.name()))
                .await
                .persistence_context("create table directory")?;
        }
        log::info!("[FileAssetStore::open] Asset cache at {}", root.display());
        Ok(Self {
            root,
            codec: RecordCodec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File that holds `key`
    pub fn record_path(&self, key: &AssetKey) -> PathBuf {
        let mut path = self.root.join(key.table().name());
        let encoded = hex_encode(&key.record_name());
        if encoded.is_empty() {
            return path.join("_");
        }
        let bytes = encoded.as_bytes();
        let mut segments = bytes.chunks(SEGMENT_LEN).peekable();
        while let Some(segment) = segments.next() {
            // hex output is ASCII
            let segment = String::from_utf8_lossy(segment);
            if segments.peek().is_some() {
                path.push(format!("{}.d", segment));
            } else {
                path.push(segment.as_ref());
            }
        }
        path
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            log::warn!(
                "[FileAssetStore::discard] Could not remove {}: {}",
                path.display(),
                e
            );
        }
    }
}

impl AssetCache for FileAssetStore {
    async fn get(&self, key: &AssetKey) -> PersistenceResult<Option<AssetRecord>> {
        let path = self.record_path(key);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match self.codec.decode(key, &data) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_corruption() => {
                log::warn!(
                    "[FileAssetStore::get] Dropping unreadable record {}: {}",
                    key,
                    e
                );
                self.discard(&path).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn put(&self, key: &AssetKey, record: AssetRecord) -> PersistenceResult<()> {
        record.check_key(key)?;
        let data = self.codec.encode(key, &record)?;
        atomic_write(&self.record_path(key), &data).await?;
        log::trace!("[FileAssetStore::put] Stored {} ({} bytes)", key, data.len());
        Ok(())
    }
}
